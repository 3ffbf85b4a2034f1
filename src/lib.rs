pub mod app;
pub mod config;
pub mod preflight;
pub mod recorder;
pub mod rtpengine;
pub mod verifier;
pub mod version;
