// src/config.rs
// =============================================================================
// Configuration: an optional TOML file, merged with defaults and a couple of
// command-line overrides.
//
// Two layers:
// - FileConfig: exactly what the TOML says, every key optional
// - AppConfig: fully resolved and validated values the app runs with
//
// Example file:
//
//   db_path = "links.db"
//
//   [checker]
//   timeout_secs = 10
//   batch_size = 10
//   max_consecutive_failures = 3
//   proxy_endpoint = "socks5h://127.0.0.1:9050"
//   sweep_interval_hours = 24
//   recheck_after_hours = 24
//   batch_delay_ms = 1000
// =============================================================================

use crate::checker::{CheckerSettings, ProbeOptions, DEFAULT_PROXY_ENDPOINT, DEFAULT_USER_AGENT};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const DEFAULT_DB_PATH: &str = "links.db";
const HOUR: u64 = 60 * 60;

/// The config file as written on disk.
#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub db_path: Option<String>,
    pub checker: Option<CheckerFileConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct CheckerFileConfig {
    pub timeout_secs: Option<u64>,
    pub batch_size: Option<usize>,
    pub max_consecutive_failures: Option<u32>,
    pub proxy_endpoint: Option<String>,
    pub sweep_interval_hours: Option<u64>,
    pub recheck_after_hours: Option<u64>,
    pub batch_delay_ms: Option<u64>,
    pub user_agent: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub checker: CheckerConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckerConfig {
    pub timeout: Duration,
    pub batch_size: usize,
    pub max_consecutive_failures: u32,
    pub proxy_endpoint: String,
    pub sweep_interval: Duration,
    pub recheck_after: Duration,
    pub batch_delay: Duration,
    pub user_agent: String,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            batch_size: 10,
            max_consecutive_failures: 3,
            proxy_endpoint: DEFAULT_PROXY_ENDPOINT.to_string(),
            sweep_interval: Duration::from_secs(24 * HOUR),
            recheck_after: Duration::from_secs(24 * HOUR),
            batch_delay: Duration::from_millis(1000),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl AppConfig {
    /// Merge the file (if any) over the defaults. `cli_db` wins over `db_path`.
    pub fn resolve(cli_db: Option<PathBuf>, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();
        let db_path = cli_db
            .or_else(|| file.db_path.map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));

        let defaults = CheckerConfig::default();
        let c = file.checker.unwrap_or_default();

        let timeout_secs = c.timeout_secs.unwrap_or(defaults.timeout.as_secs());
        if timeout_secs == 0 {
            bail!("checker.timeout_secs must be at least 1");
        }
        let batch_size = c.batch_size.unwrap_or(defaults.batch_size);
        if batch_size == 0 {
            bail!("checker.batch_size must be at least 1");
        }
        let max_consecutive_failures = c
            .max_consecutive_failures
            .unwrap_or(defaults.max_consecutive_failures);
        if max_consecutive_failures == 0 {
            bail!("checker.max_consecutive_failures must be at least 1");
        }
        let sweep_interval = match c.sweep_interval_hours {
            Some(0) => bail!("checker.sweep_interval_hours must be at least 1"),
            Some(hours) => Duration::from_secs(hours.saturating_mul(HOUR)),
            None => defaults.sweep_interval,
        };
        let recheck_after = c
            .recheck_after_hours
            .map(|hours| Duration::from_secs(hours.saturating_mul(HOUR)))
            .unwrap_or(defaults.recheck_after);
        let batch_delay = c
            .batch_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.batch_delay);

        let proxy_endpoint = c.proxy_endpoint.unwrap_or(defaults.proxy_endpoint);
        validate_proxy_endpoint(&proxy_endpoint)?;

        Ok(Self {
            db_path,
            checker: CheckerConfig {
                timeout: Duration::from_secs(timeout_secs),
                batch_size,
                max_consecutive_failures,
                proxy_endpoint,
                sweep_interval,
                recheck_after,
                batch_delay,
                user_agent: c.user_agent.unwrap_or(defaults.user_agent),
            },
        })
    }
}

impl CheckerConfig {
    pub fn probe_options(&self) -> ProbeOptions {
        ProbeOptions {
            timeout: self.timeout,
            proxy_endpoint: self.proxy_endpoint.clone(),
            user_agent: self.user_agent.clone(),
        }
    }

    pub fn checker_settings(&self) -> CheckerSettings {
        CheckerSettings {
            batch_size: self.batch_size,
            max_consecutive_failures: self.max_consecutive_failures,
            recheck_after: self.recheck_after,
            batch_delay: self.batch_delay,
        }
    }
}

fn validate_proxy_endpoint(endpoint: &str) -> Result<()> {
    let url = Url::parse(endpoint)
        .with_context(|| format!("checker.proxy_endpoint is not a valid URL: {}", endpoint))?;
    match url.scheme() {
        "socks5" | "socks5h" => Ok(()),
        other => bail!(
            "checker.proxy_endpoint must use socks5 or socks5h, got {}",
            other
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn parse(toml_text: &str) -> FileConfig {
        toml::from_str(toml_text).unwrap()
    }

    #[test]
    fn test_defaults_without_file() {
        let config = AppConfig::resolve(None, None).unwrap();
        assert_eq!(config.db_path, PathBuf::from("links.db"));
        assert_eq!(config.checker, CheckerConfig::default());
        assert_eq!(config.checker.checker_settings(), CheckerSettings::default());
        assert_eq!(config.checker.probe_options(), ProbeOptions::default());
    }

    #[test]
    fn test_file_values_override_defaults() {
        let file = parse(
            r#"
            db_path = "/var/lib/links.db"

            [checker]
            timeout_secs = 5
            batch_size = 25
            max_consecutive_failures = 5
            proxy_endpoint = "socks5://10.0.0.1:1080"
            sweep_interval_hours = 6
            recheck_after_hours = 12
            batch_delay_ms = 250
            user_agent = "probe/1"
            "#,
        );
        let config = AppConfig::resolve(None, Some(file)).unwrap();

        assert_eq!(config.db_path, PathBuf::from("/var/lib/links.db"));
        let c = &config.checker;
        assert_eq!(c.timeout, Duration::from_secs(5));
        assert_eq!(c.batch_size, 25);
        assert_eq!(c.max_consecutive_failures, 5);
        assert_eq!(c.proxy_endpoint, "socks5://10.0.0.1:1080");
        assert_eq!(c.sweep_interval, Duration::from_secs(6 * HOUR));
        assert_eq!(c.recheck_after, Duration::from_secs(12 * HOUR));
        assert_eq!(c.batch_delay, Duration::from_millis(250));
        assert_eq!(c.user_agent, "probe/1");
    }

    #[test]
    fn test_cli_db_wins_over_file() {
        let file = parse(r#"db_path = "from-file.db""#);
        let config = AppConfig::resolve(Some(PathBuf::from("from-cli.db")), Some(file)).unwrap();
        assert_eq!(config.db_path, PathBuf::from("from-cli.db"));
    }

    #[test]
    fn test_partial_checker_section_keeps_other_defaults() {
        let file = parse("[checker]\nbatch_size = 3\n");
        let config = AppConfig::resolve(None, Some(file)).unwrap();
        assert_eq!(config.checker.batch_size, 3);
        assert_eq!(config.checker.max_consecutive_failures, 3);
        assert_eq!(config.checker.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_zero_values_are_rejected() {
        for key in [
            "timeout_secs",
            "batch_size",
            "max_consecutive_failures",
            "sweep_interval_hours",
        ] {
            let file = parse(&format!("[checker]\n{} = 0\n", key));
            let err = AppConfig::resolve(None, Some(file)).unwrap_err();
            assert!(err.to_string().contains(key), "{}: {}", key, err);
        }
    }

    #[test]
    fn test_proxy_scheme_must_be_socks() {
        let file = parse("[checker]\nproxy_endpoint = \"http://127.0.0.1:8080\"\n");
        let err = AppConfig::resolve(None, Some(file)).unwrap_err();
        assert!(err.to_string().contains("socks5"));

        let file = parse("[checker]\nproxy_endpoint = \"not a url\"\n");
        assert!(AppConfig::resolve(None, Some(file)).is_err());
    }

    #[test]
    fn test_load_from_disk() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "db_path = \"disk.db\"\n[checker]\nbatch_size = 7").unwrap();

        let loaded = FileConfig::load(file.path()).unwrap();
        assert_eq!(loaded.db_path.as_deref(), Some("disk.db"));
        assert_eq!(loaded.checker.unwrap().batch_size, Some(7));
    }

    #[test]
    fn test_load_reports_bad_files() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[checker]\nbatch_size = \"lots\"").unwrap();
        assert!(FileConfig::load(file.path()).is_err());

        assert!(FileConfig::load(Path::new("/definitely/not/here.toml")).is_err());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(toml::from_str::<FileConfig>("[checker]\nbatch_sise = 3\n").is_err());
    }
}
