use chrono::DateTime;

const REVISION: &str = env!("RUSTSIPREC_REVISION");
const BUILT_AT: &str = env!("RUSTSIPREC_BUILT_AT");

/// `rustsiprec <version> (<git revision>, built <UTC time>)`
pub fn version() -> String {
    let built_at = BUILT_AT
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "rustsiprec {} ({}, built {})",
        env!("CARGO_PKG_VERSION"),
        REVISION,
        built_at
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_names_release_and_revision() {
        let v = version();
        assert!(v.starts_with(&format!("rustsiprec {} (", env!("CARGO_PKG_VERSION"))));
        assert!(v.contains(REVISION));
        assert!(v.ends_with(" UTC)"));
    }
}
