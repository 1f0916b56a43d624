use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Deployment stage the service believes it is running in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration, assembled once at startup from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub tracker: TrackerConfig,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::parse(&env_or("APP_ENV", "development"));

        let server = ServerConfig {
            host: env_or("APP_HOST", "127.0.0.1"),
            port: env_or("APP_PORT", "3000")
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort)?,
        };

        let telemetry = TelemetryConfig {
            log_level: env_or("APP_LOG_LEVEL", "info"),
        };

        let tracker = TrackerConfig {
            base_url: env_or("TRACKER_BASE_URL", "http://127.0.0.1:8080"),
            program: env::var("TRACKER_PROGRAM").unwrap_or_default(),
            program_stage: env::var("TRACKER_PROGRAM_STAGE").unwrap_or_default(),
            tracked_entity_type: env::var("TRACKER_ENTITY_TYPE").unwrap_or_default(),
            org_unit: env::var("TRACKER_ORG_UNIT").unwrap_or_default(),
            locale: env_or("TRACKER_LOCALE", "en"),
        };
        if tracker.base_url.trim().is_empty() {
            return Err(ConfigError::MissingTrackerUrl);
        }

        Ok(Self {
            environment,
            server,
            telemetry,
            tracker,
        })
    }
}

/// Bind address for the HTTP surface.
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

/// Logging controls handed to `telemetry::init`.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Connection settings for the external tracker platform.
///
/// Program, stage, and entity-type identifiers differ per deployment, so
/// empty values are tolerated here; a save attempted without a resolved
/// schema reports the gap at that point.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub base_url: String,
    pub program: String,
    pub program_stage: String,
    pub tracked_entity_type: String,
    pub org_unit: String,
    pub locale: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    MissingTrackerUrl,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::MissingTrackerUrl => {
                write!(f, "TRACKER_BASE_URL must not be empty")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::MissingTrackerUrl => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
