use std::env;
use std::time::Duration;

/// Delay before an auto-resume connect, giving the console time to finish
/// loading the session's supporting state.
pub const DEFAULT_RESUME_GRACE: Duration = Duration::from_millis(1500);

/// How long a websocket handshake may take before the client reports a
/// definite failure instead of hanging in Connecting.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Knobs picked up from the environment rather than flags.
#[derive(Debug, Clone)]
pub struct Config {
    /// Environment-specific routing segment in front of the terminal
    /// websocket path.
    pub deploy_prefix: Option<String>,
    pub resume_grace: Duration,
    pub connect_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let deploy_prefix = env::var("GANGWAY_DEPLOY_PREFIX")
            .ok()
            .map(|value| value.trim().trim_matches('/').to_string())
            .filter(|value| !value.is_empty());
        let resume_grace = env_u64("GANGWAY_RESUME_GRACE_MS")
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_RESUME_GRACE);
        let connect_timeout = env_u64("GANGWAY_CONNECT_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        Self {
            deploy_prefix,
            resume_grace,
            connect_timeout,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            deploy_prefix: None,
            resume_grace: DEFAULT_RESUME_GRACE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok()?.trim().parse().ok()
}
