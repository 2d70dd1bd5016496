//! # Observability Configuration
//!
//! Log format, log level and trace export settings read from the environment.

use std::env;
use std::fmt;

/// Deployment the process runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Deployment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Deployment {
    fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Deployment::Development),
            "staging" => Ok(Deployment::Staging),
            "production" | "prod" => Ok(Deployment::Production),
            other => Err(format!("Unknown ENVIRONMENT: {}", other)),
        }
    }
}

impl fmt::Display for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Deployment::Development => "development",
            Deployment::Staging => "staging",
            Deployment::Production => "production",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line output
    Pretty,
    /// One JSON object per event, for log shippers
    Json,
}

#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub environment: Deployment,
    /// Directive applied to this crate's targets, e.g. "info" or "debug"
    pub log_level: String,
    /// Explicit `LOG_FORMAT`; otherwise pretty in development and JSON elsewhere
    pub log_format: Option<LogFormat>,
    /// Collector receiving spans over gRPC; no export when unset
    pub otlp_endpoint: Option<String>,
    /// Fraction of traces kept; `None` keeps every trace
    pub trace_sampling_ratio: Option<f64>,
    /// Problems found while reading the environment, reported by `validate`
    problems: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            environment: Deployment::Development,
            log_level: "info".to_string(),
            log_format: None,
            otlp_endpoint: None,
            trace_sampling_ratio: None,
            problems: Vec::new(),
        }
    }
}

impl ObservabilityConfig {
    /// Read `ENVIRONMENT`, `LOG_FORMAT`, `OBSERVABILITY_LOG_LEVEL`, `OTLP_ENDPOINT`,
    /// `ENABLE_TRACE_SAMPLING` and `TRACE_SAMPLING_RATIO`
    pub fn from_env() -> Self {
        let var = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(raw) = var("ENVIRONMENT") {
            match Deployment::parse(&raw) {
                Ok(environment) => config.environment = environment,
                Err(problem) => config.problems.push(problem),
            }
        }
        if let Some(level) = var("OBSERVABILITY_LOG_LEVEL") {
            config.log_level = level.trim().to_lowercase();
        }
        if let Some(raw) = var("LOG_FORMAT") {
            match raw.trim().to_lowercase().as_str() {
                "pretty" => config.log_format = Some(LogFormat::Pretty),
                "json" => config.log_format = Some(LogFormat::Json),
                other => config.problems.push(format!("Invalid log format: {}", other)),
            }
        }
        config.otlp_endpoint = var("OTLP_ENDPOINT").map(|e| e.trim().to_string());

        let sampling = var("ENABLE_TRACE_SAMPLING").is_some_and(|v| v.trim() == "true");
        if sampling {
            let raw = var("TRACE_SAMPLING_RATIO").unwrap_or_else(|| "1.0".to_string());
            match raw.trim().parse::<f64>() {
                Ok(ratio) => config.trace_sampling_ratio = Some(ratio),
                Err(_) => config
                    .problems
                    .push(format!("Invalid trace sampling ratio: {}", raw)),
            }
        }

        config
    }

    pub fn is_production(&self) -> bool {
        self.environment == Deployment::Production
    }

    /// Format actually used by the log subscriber
    pub fn effective_log_format(&self) -> LogFormat {
        match (self.log_format, self.environment) {
            (Some(format), _) => format,
            (None, Deployment::Development) => LogFormat::Pretty,
            (None, _) => LogFormat::Json,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(problem) = self.problems.first() {
            return Err(problem.clone());
        }

        if let Some(endpoint) = &self.otlp_endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(format!("Invalid OTLP endpoint format: {}", endpoint));
            }
        }

        if let Some(ratio) = self.trace_sampling_ratio {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(format!("Invalid trace sampling ratio: {}", ratio));
            }
        }

        if self.log_level.parse::<tracing::Level>().is_err() {
            return Err(format!("Invalid log level: {}", self.log_level));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid_and_pretty() {
        let config = ObservabilityConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.effective_log_format(), LogFormat::Pretty);
        assert!(!config.is_production());
    }

    #[test]
    fn test_production_logs_json_unless_overridden() {
        let mut config = ObservabilityConfig {
            environment: Deployment::Production,
            ..Default::default()
        };
        assert_eq!(config.effective_log_format(), LogFormat::Json);

        config.log_format = Some(LogFormat::Pretty);
        assert_eq!(config.effective_log_format(), LogFormat::Pretty);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let config = ObservabilityConfig {
            otlp_endpoint: Some("collector:4317".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ObservabilityConfig {
            trace_sampling_ratio: Some(1.5),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ObservabilityConfig {
            log_level: "loud".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_environment_names() {
        assert_eq!(Deployment::parse("prod"), Ok(Deployment::Production));
        assert_eq!(Deployment::parse(" Staging "), Ok(Deployment::Staging));
        assert!(Deployment::parse("qa").is_err());
        assert_eq!(Deployment::Production.to_string(), "production");
    }
}
