use crate::calc::DEFAULT_PS_FACTOR;
use std::env;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub workspace: Option<PathBuf>,
    pub telemetry: TelemetryConfig,
    pub defaults: CalcDefaults,
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Values the sidecar fills in when a request leaves them out.
#[derive(Debug, Clone, Copy)]
pub struct CalcDefaults {
    pub ps_factor: f64,
}

impl Default for CalcDefaults {
    fn default() -> Self {
        Self {
            ps_factor: DEFAULT_PS_FACTOR,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let workspace = lookup("MARKSD_WORKSPACE")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let log_level = lookup("MARKSD_LOG")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "info".to_string());

        let ps_factor = match lookup("MARKSD_PS_FACTOR") {
            None => DEFAULT_PS_FACTOR,
            Some(raw) => parse_ps_factor(&raw)?,
        };

        Ok(Self {
            workspace,
            telemetry: TelemetryConfig { log_level },
            defaults: CalcDefaults { ps_factor },
        })
    }
}

pub fn parse_ps_factor(raw: &str) -> Result<f64, ConfigError> {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(ConfigError::InvalidPsFactor {
            value: raw.to_string(),
        }),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPsFactor { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPsFactor { value } => write!(
                f,
                "MARKSD_PS_FACTOR must be a non-negative number, got '{}'",
                value
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
