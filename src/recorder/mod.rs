pub mod allocator;
pub mod error;
pub mod metadata;
pub mod pipeline;
pub mod pool;
pub mod session;
pub mod signaling;
pub mod verification;
#[cfg(test)]
pub(crate) mod tests;

pub use allocator::EndpointAllocator;
pub use error::SetupError;
pub use pipeline::{ReNegotiationHandler, SessionPipeline, TeardownHandler};
pub use pool::{Backend, BackendPool};
pub use session::{CallSession, Leg, Party, SessionStage};
pub use signaling::{ActiveDialog, InboundInvite, ModifyRequest, PayloadCodec, RecordingPayload};
pub use verification::{VerificationDecision, VerificationGate};
