use chrono::{DateTime, Utc};
use serde_json::json;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: {}. Must be one of: text, json", s)),
        }
    }
}

pub fn validate_level(s: &str) -> Result<(), String> {
    match s.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(format!("Invalid log level: {}. Must be one of: trace, debug, info, warn, error", s)),
    }
}

fn json_line(record: &log::Record) -> String {
    let timestamp: DateTime<Utc> = Utc::now();
    let log_entry = json!({
        "timestamp": timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        "level": record.level().to_string().to_lowercase(),
        "target": record.target(),
        "message": record.args().to_string(),
    });
    log_entry.to_string()
}

/// Installs env_logger; `RUST_LOG` wins over `level` when set.
pub fn init(level: &str, format: LogFormat) -> Result<(), log::SetLoggerError> {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));

    if format == LogFormat::Json {
        builder.format(|buf, record| writeln!(buf, "{}", json_line(record)));
    }

    builder.try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_format() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("TEXT".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_validate_level() {
        assert!(validate_level("debug").is_ok());
        assert!(validate_level("WARN").is_ok());
        assert!(validate_level("verbose").is_err());
    }

    #[test]
    fn test_json_line_shape() {
        let line = json_line(
            &log::Record::builder()
                .args(format_args!("Unknown example.org"))
                .level(log::Level::Warn)
                .target("hostgate::router")
                .build(),
        );
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["level"], "warn");
        assert_eq!(value["target"], "hostgate::router");
        assert_eq!(value["message"], "Unknown example.org");
    }
}
