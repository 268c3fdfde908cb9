use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_CODES_FILE: &str = "codes.json";
pub const DEFAULT_PROTECTED_DIR: &str = "paid/img_paid";
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 5 * 60;
pub const DEFAULT_MAX_TOKENS: usize = 10_000;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_SEED_CODES: [&str; 2] = ["CINDY-0001", "CINDY-0002"];

/// Everything the gateway needs to run.
/// Built from the CLI in `main`, or directly by tests.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: IpAddr,
    pub port: u16,
    pub codes_file: PathBuf,
    pub protected_dir: PathBuf,
    pub token_ttl: Duration,
    pub max_tokens: usize,
    // None disables the background sweep
    pub sweep_interval: Option<Duration>,
    // Empty means any origin
    pub cors_origins: Vec<String>,
    pub seed_codes: Vec<String>,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            codes_file: PathBuf::from(DEFAULT_CODES_FILE),
            protected_dir: PathBuf::from(DEFAULT_PROTECTED_DIR),
            token_ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_SECS),
            max_tokens: DEFAULT_MAX_TOKENS,
            sweep_interval: Some(Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS)),
            cors_origins: Vec::new(),
            seed_codes: DEFAULT_SEED_CODES.iter().map(|c| c.to_string()).collect(),
        }
    }
}

// Human readable TTL for response messages, "5 minutes" / "90 seconds"
pub fn describe_ttl(ttl: Duration) -> String {
    let secs = ttl.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        let mins = secs / 60;
        if mins == 1 {
            "1 minute".to_string()
        } else {
            format!("{} minutes", mins)
        }
    } else if secs == 1 {
        "1 second".to_string()
    } else {
        format!("{} seconds", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_ttl() {
        assert_eq!(describe_ttl(Duration::from_secs(300)), "5 minutes");
        assert_eq!(describe_ttl(Duration::from_secs(60)), "1 minute");
        assert_eq!(describe_ttl(Duration::from_secs(90)), "90 seconds");
        assert_eq!(describe_ttl(Duration::from_secs(1)), "1 second");
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.token_ttl, Duration::from_secs(300));
        assert_eq!(config.seed_codes, vec!["CINDY-0001", "CINDY-0002"]);
        assert!(config.cors_origins.is_empty());
    }
}
