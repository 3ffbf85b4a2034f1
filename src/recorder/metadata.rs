use super::session::{non_empty, CallSession, Leg};

/// Builds the `key:value|key:value` descriptor the relay attaches to a leg's
/// recording. Tokens keep a fixed order and absent fields are left out.
/// Values are not escaped, so they must not contain `|` or `:`.
pub fn build_metadata(session: &CallSession, leg: Leg) -> String {
    let tokens = [
        ("orig_call_id", non_empty(&session.original_call_id)),
        ("session", non_empty(&session.recording_session_id)),
        ("caller", non_empty(&session.caller.aor)),
        ("caller_name", non_empty(&session.caller.name)),
        ("callee", non_empty(&session.callee.aor)),
        ("callee_name", non_empty(&session.callee.name)),
        ("call_leg", Some(leg.as_str())),
    ];
    tokens
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| format!("{}:{}", key, v)))
        .collect::<Vec<_>>()
        .join("|")
}
