use std::time::Duration;
use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read config {}: {source}", path.display())]
    ReadFailed { path: path::PathBuf, source: std::io::Error },

    #[error("failed to write config {}: {source}", path.display())]
    WriteFailed { path: path::PathBuf, source: std::io::Error },

    #[error("failed to parse config {}: {message}", path.display())]
    ParseFailed { path: path::PathBuf, message: String },

    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("no config path available (set XDG_CONFIG_HOME or HOME)")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
    pub notifications: NotificationConfig,
    pub retention: RetentionConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: path::PathBuf,
    pub max_connections: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_concurrent_probes: usize,
    pub probe_timeout_seconds: u64,
    /// Shortest interval a user may configure
    pub min_interval_seconds: u64,
    pub shutdown_timeout_seconds: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub webhook_timeout_seconds: u64,
    pub webhook_retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smtp: Option<SmtpConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default = "default_smtp_from")]
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Probe results older than this are deleted
    pub result_days: u32,
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_from() -> String {
    "noreply@uptime.local".into()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "uptime.db".into(), max_connections: 8 }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_probes: 64,
            probe_timeout_seconds: 5,
            min_interval_seconds: 10,
            shutdown_timeout_seconds: 10,
            user_agent: concat!("uptime-service/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { webhook_timeout_seconds: 10, webhook_retries: 3, smtp: None }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { result_days: 30, sweep_interval_seconds: 3600 }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0".into(), port: 8080 }
    }
}

impl EngineConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_seconds)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

impl NotificationConfig {
    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_seconds)
    }
}

impl RetentionConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/uptime/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("uptime/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path.display())?;
        write_1(f, "Max Connections", &self.database.max_connections)?;

        write_title_1(f, "Engine")?;
        write_1(f, "Max Concurrent Probes", &self.engine.max_concurrent_probes)?;
        write_1(f, "Probe Timeout (s)", &self.engine.probe_timeout_seconds)?;
        write_1(f, "Minimum Interval (s)", &self.engine.min_interval_seconds)?;
        write_1(f, "Shutdown Timeout (s)", &self.engine.shutdown_timeout_seconds)?;
        write_1(f, "User Agent", &self.engine.user_agent)?;

        write_title_1(f, "Notifications")?;
        write_1(f, "Webhook Timeout (s)", &self.notifications.webhook_timeout_seconds)?;
        write_1(f, "Webhook Retries", &self.notifications.webhook_retries)?;
        match &self.notifications.smtp {
            Some(smtp) => write_1(f, "SMTP", &format_args!("{}:{} as {}", smtp.host, smtp.port, smtp.from))?,
            None => write_1(f, "SMTP", &"disabled")?,
        }

        write_title_1(f, "Retention")?;
        write_1(f, "Result Days", &self.retention.result_days)?;
        write_1(f, "Sweep Interval (s)", &self.retention.sweep_interval_seconds)?;

        write_title_1(f, "Server")?;
        write_1(f, "Bind Address", &self.server.bind)?;
        write_1(f, "Port", &self.server.port)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/uptime/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```no_run
    /// use std::path;
    /// use uptime_service::config;
    ///
    /// let cfg = config::Config::from_config(None::<&path::Path>)?;
    /// println!("{}", cfg);
    /// # Ok::<(), config::Error>(())
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| Error::ReadFailed { path: config_path.clone(), source })?;
            toml::from_str(raw_string.as_str())
                .map_err(|err| Error::ParseFailed { path: config_path, message: err.to_string() })
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &std::path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| Error::WriteFailed { path: path.to_path_buf(), source })?;
        }

        std::fs::write(path, config_str)
            .map_err(|source| Error::WriteFailed { path: path.to_path_buf(), source })
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), Error> {
        let engine = &self.engine;
        if engine.max_concurrent_probes == 0 {
            return Err(Error::Invalid("engine.max_concurrent_probes must be at least 1".into()));
        }
        if engine.probe_timeout_seconds == 0 {
            return Err(Error::Invalid("engine.probe_timeout_seconds must be at least 1".into()));
        }
        // a probe has to finish before the next one of the same target is due
        if engine.probe_timeout_seconds >= engine.min_interval_seconds {
            return Err(Error::Invalid(format!(
                "engine.probe_timeout_seconds ({}) must be shorter than engine.min_interval_seconds ({})",
                engine.probe_timeout_seconds, engine.min_interval_seconds
            )));
        }
        if self.database.max_connections == 0 {
            return Err(Error::Invalid("database.max_connections must be at least 1".into()));
        }
        if self.retention.result_days == 0 {
            return Err(Error::Invalid("retention.result_days must be at least 1".into()));
        }
        if self.retention.sweep_interval_seconds == 0 {
            return Err(Error::Invalid("retention.sweep_interval_seconds must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf/uptime");

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("conf/uptime.toml").exists());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[engine]\nmax_concurrent_probes = 4\n\n[notifications.smtp]\nhost = \"smtp.example.com\"\n",
        )
        .unwrap();

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config.engine.max_concurrent_probes, 4);
        assert_eq!(config.engine.probe_timeout_seconds, 5);
        let smtp = config.notifications.smtp.unwrap();
        assert_eq!(smtp.port, 587);
        assert_eq!(smtp.from, "noreply@uptime.local");
    }

    #[test]
    fn written_config_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.server.port = 9090;
        config.notifications.smtp = Some(SmtpConfig {
            host: "mail.example.com".into(),
            port: 25,
            from: "alerts@example.com".into(),
            user: None,
            password: None,
        });

        config.write_config(&path).unwrap();
        assert_eq!(Config::from_config(Some(&path)).unwrap(), config);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[engine\n").unwrap();

        assert!(matches!(Config::from_config(Some(&path)), Err(Error::ParseFailed { .. })));
    }

    #[test]
    fn timeout_must_undercut_min_interval() {
        let mut config = Config::default();
        config.engine.probe_timeout_seconds = 10;
        config.engine.min_interval_seconds = 10;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must be shorter than"));
    }

    #[test]
    fn display_lists_every_section() {
        let rendered = Config::default().to_string();
        for section in ["Database", "Engine", "Notifications", "Retention", "Server"] {
            assert!(rendered.contains(section), "missing {section}");
        }
        assert!(rendered.contains("SMTP: disabled"));
    }
}
