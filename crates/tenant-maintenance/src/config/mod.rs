use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use chrono::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub workflow: WorkflowConfig,
    pub mail: Option<MailConfig>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(&var_or("APP_ENV", "development"));

        let host = var_or("APP_HOST", "127.0.0.1");
        let port = var_or("APP_PORT", "3001")
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = var_or("APP_LOG_LEVEL", "info");
        let log_format = LogFormat::parse(&var_or("APP_LOG_FORMAT", "compact"))?;

        let workflow = WorkflowConfig {
            mode: WorkflowMode::parse(&var_or("WORKFLOW_MODE", "automatic"))?,
            auto_schedule: parse_flag(
                "WORKFLOW_AUTO_SCHEDULE",
                &var_or("WORKFLOW_AUTO_SCHEDULE", "true"),
            )?,
            token_ttl_hours: var_or("WORKFLOW_TOKEN_TTL_HOURS", "168")
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidTokenTtl)?,
            public_url: var_or("APP_PUBLIC_URL", "http://localhost:3000")
                .trim_end_matches('/')
                .to_string(),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                format: log_format,
                ansi: environment == AppEnvironment::Development,
            },
            workflow,
            mail: MailConfig::from_env()?,
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag { key }),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
    pub ansi: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
}

impl LogFormat {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            other => Err(ConfigError::InvalidLogFormat(other.to_string())),
        }
    }
}

/// How a freshly created request reaches the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowMode {
    /// Owner is notified on creation and a contractor is matched by category straight away.
    Automatic,
    /// Request waits in `pending` until the broker notifies the owner, who selects a contractor
    /// through an emailed link.
    Staged,
}

impl WorkflowMode {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "automatic" | "auto" => Ok(Self::Automatic),
            "staged" | "manual" => Ok(Self::Staged),
            other => Err(ConfigError::InvalidWorkflowMode(other.to_string())),
        }
    }
}

/// Knobs for the maintenance workflow engine.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub mode: WorkflowMode,
    pub auto_schedule: bool,
    pub token_ttl_hours: u32,
    pub public_url: String,
}

impl WorkflowConfig {
    pub fn automatic() -> Self {
        Self {
            mode: WorkflowMode::Automatic,
            auto_schedule: true,
            token_ttl_hours: 168,
            public_url: "http://localhost:3000".to_string(),
        }
    }

    pub fn staged() -> Self {
        Self {
            mode: WorkflowMode::Staged,
            ..Self::automatic()
        }
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::hours(i64::from(self.token_ttl_hours))
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self::automatic()
    }
}

/// Outbound SMTP relay settings. Absent when no host or sender address is configured.
#[derive(Clone)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

impl MailConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let (host, from) = match (env::var("SMTP_HOST"), env::var("SMTP_FROM")) {
            (Ok(host), Ok(from)) if !host.trim().is_empty() && !from.trim().is_empty() => {
                (host, from)
            }
            _ => return Ok(None),
        };

        let port = var_or("SMTP_PORT", "587")
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidSmtpPort)?;

        Ok(Some(Self {
            host,
            port,
            username: env::var("SMTP_USERNAME").ok(),
            password: env::var("SMTP_PASSWORD").ok(),
            from,
        }))
    }
}

impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("from", &self.from)
            .finish()
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidLogFormat(String),
    InvalidWorkflowMode(String),
    InvalidFlag { key: &'static str },
    InvalidTokenTtl,
    InvalidSmtpPort,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidLogFormat(value) => {
                write!(f, "APP_LOG_FORMAT must be 'compact' or 'pretty', got '{value}'")
            }
            ConfigError::InvalidWorkflowMode(value) => {
                write!(f, "WORKFLOW_MODE must be 'automatic' or 'staged', got '{value}'")
            }
            ConfigError::InvalidFlag { key } => write!(f, "{key} must be a boolean flag"),
            ConfigError::InvalidTokenTtl => {
                write!(f, "WORKFLOW_TOKEN_TTL_HOURS must be a positive integer")
            }
            ConfigError::InvalidSmtpPort => write!(f, "SMTP_PORT must be a valid u16"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APP_LOG_FORMAT",
            "APP_PUBLIC_URL",
            "WORKFLOW_MODE",
            "WORKFLOW_AUTO_SCHEDULE",
            "WORKFLOW_TOKEN_TTL_HOURS",
            "SMTP_HOST",
            "SMTP_PORT",
            "SMTP_USERNAME",
            "SMTP_PASSWORD",
            "SMTP_FROM",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.telemetry.format, LogFormat::Compact);
        assert_eq!(config.workflow.mode, WorkflowMode::Automatic);
        assert!(config.workflow.auto_schedule);
        assert_eq!(config.workflow.token_ttl_hours, 168);
        assert!(config.mail.is_none());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3001));
    }

    #[test]
    fn staged_mode_and_flags_are_parsed() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("WORKFLOW_MODE", "staged");
        env::set_var("WORKFLOW_AUTO_SCHEDULE", "off");
        env::set_var("APP_PUBLIC_URL", "https://portal.example.com/");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.workflow.mode, WorkflowMode::Staged);
        assert!(!config.workflow.auto_schedule);
        assert_eq!(config.workflow.public_url, "https://portal.example.com");
        reset_env();
    }

    #[test]
    fn rejects_unknown_workflow_mode() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("WORKFLOW_MODE", "eventually");
        match AppConfig::load() {
            Err(ConfigError::InvalidWorkflowMode(value)) => assert_eq!(value, "eventually"),
            other => panic!("expected invalid workflow mode, got {other:?}"),
        }
        reset_env();
    }

    #[test]
    fn mail_requires_host_and_sender() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("SMTP_HOST", "smtp.example.com");
        let config = AppConfig::load().expect("config loads");
        assert!(config.mail.is_none(), "sender address is required");

        env::set_var("SMTP_FROM", "Maintenance <noreply@example.com>");
        env::set_var("SMTP_PASSWORD", "hunter2");
        let config = AppConfig::load().expect("config loads");
        let mail = config.mail.expect("mail configured");
        assert_eq!(mail.port, 587);
        assert!(!format!("{mail:?}").contains("hunter2"));
        reset_env();
    }
}
