use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

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
    pub pipeline: PipelineSettings,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_var("APP_PORT", 3000)?;
        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            pipeline: PipelineSettings::load()?,
        })
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

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Knobs governing the pipeline run itself: how long the payment gate holds,
/// the scrape poller cadence, where the durable customer counter and the
/// analysis store live on disk, and the grade-label thresholds applied to
/// final scores.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub payment_wait: Duration,
    pub poll_base_interval: Duration,
    pub poll_max_interval: Duration,
    pub poll_max_windows: u32,
    pub counter_path: PathBuf,
    pub store_path: PathBuf,
    pub grade: GradePolicy,
}

impl PipelineSettings {
    fn load() -> Result<Self, ConfigError> {
        let payment_wait = Duration::from_secs(parse_var("APP_PAYMENT_WAIT_SECS", 900u64)?);
        let poll_base_interval = Duration::from_secs(parse_var("APP_POLL_BASE_SECS", 10u64)?);
        let poll_max_interval = Duration::from_secs(parse_var("APP_POLL_MAX_SECS", 80u64)?);
        let poll_max_windows = parse_var("APP_POLL_MAX_WINDOWS", 30u32)?;
        let counter_path = PathBuf::from(
            env::var("APP_COUNTER_PATH").unwrap_or_else(|_| "data/customer_seq.json".to_string()),
        );
        let store_path = PathBuf::from(
            env::var("APP_STORE_PATH").unwrap_or_else(|_| "data/analysis_store.json".to_string()),
        );
        let grade = GradePolicy {
            excellent: parse_var("APP_GRADE_EXCELLENT", 80u8)?,
            good: parse_var("APP_GRADE_GOOD", 60u8)?,
            average: parse_var("APP_GRADE_AVERAGE", 40u8)?,
        };

        Ok(Self {
            payment_wait,
            poll_base_interval,
            poll_max_interval,
            poll_max_windows,
            counter_path,
            store_path,
            grade,
        })
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            payment_wait: Duration::from_secs(900),
            poll_base_interval: Duration::from_secs(10),
            poll_max_interval: Duration::from_secs(80),
            poll_max_windows: 30,
            counter_path: PathBuf::from("data/customer_seq.json"),
            store_path: PathBuf::from("data/analysis_store.json"),
            grade: GradePolicy::default(),
        }
    }
}

/// Score thresholds for grade labels. Bands are inclusive lower bounds; a
/// final score below `average` reads "Needs Work".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradePolicy {
    pub excellent: u8,
    pub good: u8,
    pub average: u8,
}

impl GradePolicy {
    pub fn label(&self, final_score: u8) -> &'static str {
        if final_score >= self.excellent {
            "Excellent"
        } else if final_score >= self.good {
            "Good"
        } else if final_score >= self.average {
            "Average"
        } else {
            "Needs Work"
        }
    }
}

impl Default for GradePolicy {
    fn default() -> Self {
        Self {
            excellent: 80,
            good: 60,
            average: 40,
        }
    }
}

fn parse_var<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidNumber { key: &'static str },
    InvalidHost { source: std::net::AddrParseError },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidNumber { key } => {
                write!(f, "{key} must be a valid non-negative number")
            }
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
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
            "APP_PAYMENT_WAIT_SECS",
            "APP_POLL_BASE_SECS",
            "APP_POLL_MAX_SECS",
            "APP_POLL_MAX_WINDOWS",
            "APP_COUNTER_PATH",
            "APP_STORE_PATH",
            "APP_GRADE_EXCELLENT",
            "APP_GRADE_GOOD",
            "APP_GRADE_AVERAGE",
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
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.pipeline.poll_base_interval, Duration::from_secs(10));
        assert_eq!(config.pipeline.poll_max_windows, 30);
        assert_eq!(config.pipeline.grade, GradePolicy::default());
    }

    #[test]
    fn pipeline_knobs_come_from_env() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_POLL_BASE_SECS", "2");
        env::set_var("APP_POLL_MAX_WINDOWS", "5");
        env::set_var("APP_GRADE_EXCELLENT", "90");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.pipeline.poll_base_interval, Duration::from_secs(2));
        assert_eq!(config.pipeline.poll_max_windows, 5);
        assert_eq!(config.pipeline.grade.label(90), "Excellent");
        assert_eq!(config.pipeline.grade.label(89), "Good");
        reset_env();
    }

    #[test]
    fn rejects_non_numeric_poll_interval() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_POLL_BASE_SECS", "soon");
        let err = AppConfig::load().expect_err("invalid number rejected");
        assert!(matches!(
            err,
            ConfigError::InvalidNumber {
                key: "APP_POLL_BASE_SECS"
            }
        ));
        reset_env();
    }
}
