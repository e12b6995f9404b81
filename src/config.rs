use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Launch the browser without a window. Recording wants a window;
    /// headless is for CI and unattended replay.
    pub headless: bool,
    /// Script database override; platform data dir when unset.
    pub script_db: Option<PathBuf>,
    /// Verification-code lookup service; checkpoints fall back to manual
    /// waits when unset.
    pub otp_lookup_url: Option<String>,
    pub otp_lookup_timeout: Duration,
    /// Fixed search terms for code lookups. Empty means derive them from
    /// the checkpoint prompt and the script's host.
    pub otp_search_terms: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8790),
            headless: env::var("HEADLESS")
                .ok()
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            script_db: env::var("SCRIPT_DB").ok().map(PathBuf::from),
            otp_lookup_url: env::var("OTP_LOOKUP_URL").ok().filter(|v| !v.is_empty()),
            otp_lookup_timeout: env::var("OTP_LOOKUP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(120)),
            otp_search_terms: env::var("OTP_SEARCH_TERMS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8790,
            headless: false,
            script_db: None,
            otp_lookup_url: None,
            otp_lookup_timeout: Duration::from_secs(120),
            otp_search_terms: Vec::new(),
        }
    }
}
