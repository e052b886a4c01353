//! Bot configuration
//!
//! Every setting can be given as a command-line flag or through the
//! environment. Paths and the guard port default to values scoped by the
//! operator identity so that several operators can run the bot on the same
//! login node without stepping on each other.

use clap::Parser;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::time::Duration;

/// First port of the range guard ports are derived into
const GUARD_PORT_BASE: u16 = 49152;

/// Width of the guard port range
const GUARD_PORT_SPAN: u64 = 1000;

/// Command-line interface
#[derive(Parser, Debug, Clone)]
#[command(name = "green-boy")]
#[command(about = "Chat front end for Slurm with job completion notifications", long_about = None)]
pub struct Cli {
    /// Bot token issued by the chat gateway
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub bot_token: String,

    /// Comma-separated user ids allowed to use the bot (empty: everyone)
    #[arg(long, env = "GREENBOY_AUTH_USERS", default_value = "")]
    pub auth_users: String,

    /// Local account the bot runs as; scopes lock, port and registry
    #[arg(long, env = "USER", default_value = "unknown")]
    pub operator: String,

    /// Lock file path (default: /tmp/greenboy-<operator>.lock)
    #[arg(long, env = "GREENBOY_LOCK_FILE")]
    pub lock_file: Option<PathBuf>,

    /// Monitored jobs file (default: monitored_jobs-<operator>.json)
    #[arg(long, env = "GREENBOY_REGISTRY_FILE")]
    pub registry_file: Option<PathBuf>,

    /// Loopback port held while running (default: derived from operator)
    #[arg(long, env = "GREENBOY_GUARD_PORT")]
    pub guard_port: Option<u16>,

    /// Seconds between monitor ticks
    #[arg(long, env = "GREENBOY_MONITOR_INTERVAL", default_value_t = 60)]
    pub monitor_interval: u64,

    /// Seconds before the first monitor tick
    #[arg(long, env = "GREENBOY_MONITOR_DELAY", default_value_t = 10)]
    pub monitor_initial_delay: u64,

    /// Seconds a scheduler command may run before it is killed
    #[arg(long, env = "GREENBOY_COMMAND_TIMEOUT", default_value_t = 60)]
    pub command_timeout: u64,

    /// Seconds an HTTP call to the gateway may take
    #[arg(long, env = "GREENBOY_HTTP_TIMEOUT", default_value_t = 30)]
    pub http_timeout: u64,

    /// Long-poll timeout passed to getUpdates, in seconds
    #[arg(long, env = "GREENBOY_POLL_TIMEOUT", default_value_t = 30)]
    pub poll_timeout: u64,

    /// Startup attempts before giving up
    #[arg(long, env = "GREENBOY_MAX_STARTUP_ATTEMPTS", default_value_t = 5)]
    pub max_startup_attempts: u32,

    /// Seconds to wait after webhook cleanup before polling
    #[arg(long, env = "GREENBOY_WEBHOOK_SETTLE", default_value_t = 30)]
    pub webhook_settle: u64,

    /// Consecutive notification failures before a job is logged as an error
    #[arg(long, env = "GREENBOY_NOTIFY_FAILURE_THRESHOLD", default_value_t = 5)]
    pub notify_failure_threshold: u32,

    /// Chat gateway base URL
    #[arg(long, env = "GREENBOY_API_URL", default_value = "https://api.telegram.org")]
    pub api_url: String,
}

/// Resolved bot configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub authorized_users: Vec<i64>,
    pub operator: String,
    pub lock_file: PathBuf,
    pub registry_file: PathBuf,
    pub guard_port: u16,
    pub monitor_interval: Duration,
    pub monitor_initial_delay: Duration,
    pub command_timeout: Duration,
    pub http_timeout: Duration,
    pub poll_timeout: Duration,
    pub max_startup_attempts: u32,
    pub webhook_settle: Duration,
    pub notify_failure_threshold: u32,
    pub api_url: String,
}

impl Config {
    /// Creates a configuration with defaults for everything but the token
    pub fn new(bot_token: String, operator: String) -> Self {
        Self {
            bot_token,
            authorized_users: Vec::new(),
            lock_file: default_lock_file(&operator),
            registry_file: default_registry_file(&operator),
            guard_port: operator_port(&operator),
            operator,
            monitor_interval: Duration::from_secs(60),
            monitor_initial_delay: Duration::from_secs(10),
            command_timeout: Duration::from_secs(60),
            http_timeout: Duration::from_secs(30),
            poll_timeout: Duration::from_secs(30),
            max_startup_attempts: 5,
            webhook_settle: Duration::from_secs(30),
            notify_failure_threshold: 5,
            api_url: "https://api.telegram.org".to_string(),
        }
    }

    /// Resolves parsed flags into a configuration
    pub fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        let authorized_users = parse_auth_users(&cli.auth_users)?;
        let mut config = Self::new(cli.bot_token, cli.operator);

        config.authorized_users = authorized_users;
        if let Some(lock_file) = cli.lock_file {
            config.lock_file = lock_file;
        }
        if let Some(registry_file) = cli.registry_file {
            config.registry_file = registry_file;
        }
        if let Some(port) = cli.guard_port {
            config.guard_port = port;
        }
        config.monitor_interval = Duration::from_secs(cli.monitor_interval);
        config.monitor_initial_delay = Duration::from_secs(cli.monitor_initial_delay);
        config.command_timeout = Duration::from_secs(cli.command_timeout);
        config.http_timeout = Duration::from_secs(cli.http_timeout);
        config.poll_timeout = Duration::from_secs(cli.poll_timeout);
        config.max_startup_attempts = cli.max_startup_attempts;
        config.webhook_settle = Duration::from_secs(cli.webhook_settle);
        config.notify_failure_threshold = cli.notify_failure_threshold;
        config.api_url = cli.api_url;

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bot_token.trim().len() < 20 {
            anyhow::bail!("bot token is missing or too short; set TELEGRAM_BOT_TOKEN");
        }

        if self.operator.is_empty() {
            anyhow::bail!("operator cannot be empty");
        }

        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            anyhow::bail!("api_url must start with http:// or https://");
        }

        if self.monitor_interval.is_zero() {
            anyhow::bail!("monitor_interval must be greater than 0");
        }

        if self.command_timeout.is_zero() {
            anyhow::bail!("command_timeout must be greater than 0");
        }

        if self.http_timeout.is_zero() {
            anyhow::bail!("http_timeout must be greater than 0");
        }

        if self.max_startup_attempts == 0 {
            anyhow::bail!("max_startup_attempts must be greater than 0");
        }

        if self.notify_failure_threshold == 0 {
            anyhow::bail!("notify_failure_threshold must be greater than 0");
        }

        if self.guard_port < 1024 {
            anyhow::bail!("guard_port must not be a privileged port");
        }

        Ok(())
    }
}

/// Parses a comma-separated list of numeric user ids
///
/// Blank items are ignored, so an empty string yields an empty list.
pub fn parse_auth_users(raw: &str) -> anyhow::Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<i64>()
                .map_err(|_| anyhow::anyhow!("invalid user id in GREENBOY_AUTH_USERS: {}", item))
        })
        .collect()
}

/// Derives the guard port for an operator
///
/// Stable across runs and builds for the same operator, spread over a fixed
/// range so that different operators rarely collide. The first eight bytes
/// of the SHA-256 digest of the name pick the offset.
pub fn operator_port(operator: &str) -> u16 {
    let digest = Sha256::digest(operator.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    GUARD_PORT_BASE + (u64::from_be_bytes(prefix) % GUARD_PORT_SPAN) as u16
}

fn default_lock_file(operator: &str) -> PathBuf {
    PathBuf::from(format!("/tmp/greenboy-{}.lock", operator))
}

fn default_registry_file(operator: &str) -> PathBuf {
    PathBuf::from(format!("monitored_jobs-{}.json", operator))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "123456789:AAAAAAAAAAAAAAAAAAAAAAAA";

    #[test]
    fn test_default_config() {
        let config = Config::new(TOKEN.to_string(), "alice".to_string());
        assert_eq!(config.monitor_interval, Duration::from_secs(60));
        assert_eq!(config.monitor_initial_delay, Duration::from_secs(10));
        assert_eq!(config.lock_file, PathBuf::from("/tmp/greenboy-alice.lock"));
        assert_eq!(
            config.registry_file,
            PathBuf::from("monitored_jobs-alice.json")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::new(TOKEN.to_string(), "alice".to_string());

        // Short token should fail
        config.bot_token = "short".to_string();
        assert!(config.validate().is_err());

        config.bot_token = TOKEN.to_string();

        // Invalid URL should fail
        config.api_url = "api.telegram.org".to_string();
        assert!(config.validate().is_err());

        config.api_url = "https://api.telegram.org".to_string();
        config.monitor_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        config.monitor_interval = Duration::from_secs(60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_operator_port_is_stable_and_in_range() {
        let port = operator_port("alice");
        assert_eq!(port, operator_port("alice"));
        assert!((49152..50152).contains(&port));
    }

    #[test]
    fn test_operator_port_does_not_depend_on_toolchain() {
        // Fixed digests; any build must derive the same ports
        assert_eq!(operator_port("alice"), 49359);
        assert_eq!(operator_port("bob"), 49802);
    }

    #[test]
    fn test_parse_auth_users() {
        assert_eq!(parse_auth_users("").unwrap(), Vec::<i64>::new());
        assert_eq!(parse_auth_users(" 1, 2 ,,3").unwrap(), vec![1, 2, 3]);
        assert!(parse_auth_users("1,bob").is_err());
    }

    #[test]
    fn test_from_cli_overrides() {
        let cli = Cli::parse_from([
            "green-boy",
            "--bot-token",
            TOKEN,
            "--operator",
            "bob",
            "--auth-users",
            "7,8",
            "--guard-port",
            "50000",
            "--monitor-interval",
            "5",
        ]);
        let config = Config::from_cli(cli).unwrap();

        assert_eq!(config.authorized_users, vec![7, 8]);
        assert_eq!(config.guard_port, 50000);
        assert_eq!(config.monitor_interval, Duration::from_secs(5));
        assert_eq!(config.lock_file, PathBuf::from("/tmp/greenboy-bob.lock"));
    }
}
