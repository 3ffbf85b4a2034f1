use anyhow::Error;
use clap::Parser;
use serde::Deserialize;

pub const DEFAULT_RTPENGINE: &str = "127.0.0.1:22222";

#[derive(Parser, Debug)]
#[command(version)]
pub struct Cli {
    #[clap(long, default_value = "rustsiprec.toml")]
    pub conf: Option<String>,
    /// Ping every configured rtpengine and exit
    #[clap(long)]
    pub check: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub log_level: Option<String>,
    pub log_file: Option<String>,
    pub verification: Option<VerificationConfig>,
    #[serde(default)]
    pub rtpengine: OneOrMany<RtpEngineConfig>,
}

/// Accepts either a single table or an array of tables.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: Clone> OneOrMany<T> {
    pub fn to_vec(&self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item.clone()],
            OneOrMany::Many(items) => items.clone(),
        }
    }
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RtpEngineConfig {
    /// `host:port` of the NG control socket
    pub remote: String,
    pub local_port: Option<u16>,
    /// Whether this rtpengine understands `start forwarding`
    pub forwarding: Option<bool>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct VerificationConfig {
    pub endpoint: Option<String>,
    #[serde(alias = "recordByDefault")]
    pub record_by_default: Option<bool>,
}

impl VerificationConfig {
    pub fn record_by_default(&self) -> bool {
        self.record_by_default.unwrap_or(true)
    }
}

impl Default for RtpEngineConfig {
    fn default() -> Self {
        Self {
            remote: DEFAULT_RTPENGINE.to_string(),
            local_port: None,
            forwarding: Some(true),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            log_file: None,
            verification: None,
            rtpengine: OneOrMany::One(RtpEngineConfig::default()),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self, Error> {
        let config = toml::from_str(
            &std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("{}: {}", e, path))?,
        )?;
        Ok(config)
    }

    pub fn rtpengines(&self) -> Vec<RtpEngineConfig> {
        self.rtpengine.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn load_str(content: &str) -> Config {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        Config::load(file.path().to_str().unwrap()).unwrap()
    }

    #[test]
    fn test_single_rtpengine_table() {
        let config = load_str(
            r#"
log_level = "debug"

[rtpengine]
remote = "10.0.0.5:22222"
local_port = 5000
"#,
        );
        let engines = config.rtpengines();
        assert_eq!(engines.len(), 1);
        assert_eq!(engines[0].remote, "10.0.0.5:22222");
        assert_eq!(engines[0].local_port, Some(5000));
        assert!(config.verification.is_none());
    }

    #[test]
    fn test_rtpengine_array_and_verification() {
        let config = load_str(
            r#"
[verification]
endpoint = "http://127.0.0.1:3000/verify"
recordByDefault = false

[[rtpengine]]
remote = "10.0.0.5:22222"

[[rtpengine]]
remote = "10.0.0.6:22222"
forwarding = false
"#,
        );
        let engines = config.rtpengines();
        assert_eq!(engines.len(), 2);
        assert_eq!(engines[1].remote, "10.0.0.6:22222");
        assert_eq!(engines[1].forwarding, Some(false));
        let verification = config.verification.unwrap();
        assert_eq!(
            verification.endpoint.as_deref(),
            Some("http://127.0.0.1:3000/verify")
        );
        assert!(!verification.record_by_default());
    }

    #[test]
    fn test_record_by_default_defaults_to_true() {
        assert!(VerificationConfig::default().record_by_default());
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = Config::load("/nonexistent/rustsiprec.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/rustsiprec.toml"));
    }
}
