//! Tracing subscriber setup

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use tracing::{Level, debug, info};

/// Map a configured level name to a tracing level; unknown names mean INFO
pub fn parse_level(level: Option<&str>) -> Level {
    let Some(s) = level else {
        return Level::INFO;
    };
    match s.trim().to_uppercase().as_str() {
        "TRACE" => Level::TRACE,
        "DEBUG" => Level::DEBUG,
        "INFO" => Level::INFO,
        "WARN" | "WARNING" => Level::WARN,
        "ERROR" => Level::ERROR,
        _ => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
            Level::INFO
        }
    }
}

/// Default log directory under the platform data dir
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("heatexchange")
        .join("logs")
}

/// Install a file-backed fmt subscriber
///
/// `RUST_LOG` directives are honored on top of `level`. Returns the log file
/// path. Fails if a global subscriber is already installed.
pub fn init(level: Option<&str>, log_dir: Option<&Path>) -> Result<PathBuf> {
    let log_dir = log_dir.map(Path::to_path_buf).unwrap_or_else(default_log_dir);
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let level = parse_level(level);
    let log_path = log_dir.join("heatexchange.log");
    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to install tracing subscriber: {}", e))?;

    info!("Logging initialized (level: {:?})", level);
    debug!(?log_path, "logging::init: writing to file");
    Ok(log_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level(None), Level::INFO);
        assert_eq!(parse_level(Some("trace")), Level::TRACE);
        assert_eq!(parse_level(Some("Debug")), Level::DEBUG);
        assert_eq!(parse_level(Some("WARNING")), Level::WARN);
        assert_eq!(parse_level(Some(" warn ")), Level::WARN);
        assert_eq!(parse_level(Some("error")), Level::ERROR);
        assert_eq!(parse_level(Some("loud")), Level::INFO);
    }

    #[test]
    fn test_default_log_dir_is_namespaced() {
        assert!(default_log_dir().ends_with("heatexchange/logs"));
    }
}
