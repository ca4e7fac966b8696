//! Configuration types.
//!
//! Loaded from a TOML file (every section optional), then overridden from
//! environment variables, then validated.

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;

/// Config file read when `--config` is not given and the file exists.
pub const DEFAULT_CONFIG_PATH: &str = "config/agent.toml";

/// Complete application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub email: EmailConfig,
    pub classifier: ClassifierConfig,
    pub browser: BrowserConfig,
    pub pipeline: PipelineConfig,
}

/// Mail service access: IMAP for listing and read marks, SMTP for sending.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    /// Defaults to `imap_host` with "imap" replaced by "smtp".
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    /// Defaults to `username`.
    pub from_address: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            imap_host: String::new(),
            imap_port: 993,
            smtp_host: String::new(),
            smtp_port: 587,
            username: String::new(),
            password: SecretString::from(""),
            from_address: String::new(),
        }
    }
}

/// Paths to the trained model artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/giveaway_model.json"),
            tokenizer_path: PathBuf::from("models/tokenizer.json"),
        }
    }
}

/// Browser session options for the form actor.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// When false the form actor starts inert.
    pub enabled: bool,
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    /// Delay after navigation before touching the form.
    pub settle_ms: u64,
    /// CDP request timeout.
    pub request_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            headless: false,
            chrome_executable: None,
            settle_ms: 1500,
            request_timeout_secs: 30,
        }
    }
}

/// What to mark as read once a message has been handled in a cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkReadPolicy {
    /// Leave every message unread; unread messages are seen again next cycle.
    #[default]
    Never,
    /// Mark every message that did not fail.
    Processed,
    /// Mark only messages whose participation succeeded.
    Acted,
}

/// Cycle settings for the orchestrator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Mailbox / label the batch is fetched from.
    pub label: String,
    pub unread_only: bool,
    /// Batch cap per cycle.
    pub max_results: usize,
    pub mark_read: MarkReadPolicy,
    /// Recipient of a cycle report when anything was acted upon.
    pub report_to: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            label: "Giveaway".to_string(),
            unread_only: true,
            max_results: 10,
            mark_read: MarkReadPolicy::Never,
            report_to: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from `path` (or [`DEFAULT_CONFIG_PATH`] when it
    /// exists), apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.fill_derived();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file without overrides or validation.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Apply overrides from a key lookup (the process environment in
    /// production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("EMAIL_IMAP_HOST") {
            self.email.imap_host = v;
        }
        if let Some(v) = lookup("EMAIL_IMAP_PORT") {
            self.email.imap_port = parse_value("EMAIL_IMAP_PORT", &v)?;
        }
        if let Some(v) = lookup("EMAIL_SMTP_HOST") {
            self.email.smtp_host = v;
        }
        if let Some(v) = lookup("EMAIL_SMTP_PORT") {
            self.email.smtp_port = parse_value("EMAIL_SMTP_PORT", &v)?;
        }
        if let Some(v) = lookup("EMAIL_USERNAME") {
            self.email.username = v;
        }
        if let Some(v) = lookup("EMAIL_PASSWORD") {
            self.email.password = SecretString::from(v);
        }
        if let Some(v) = lookup("EMAIL_FROM_ADDRESS") {
            self.email.from_address = v;
        }
        if let Some(v) = lookup("CLASSIFIER_MODEL_PATH") {
            self.classifier.model_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("CLASSIFIER_TOKENIZER_PATH") {
            self.classifier.tokenizer_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("BROWSER_HEADLESS") {
            self.browser.headless = parse_value("BROWSER_HEADLESS", &v)?;
        }
        if let Some(v) = lookup("BROWSER_EXECUTABLE") {
            self.browser.chrome_executable = Some(PathBuf::from(v));
        }
        Ok(())
    }

    /// Fill settings that default to other settings.
    pub fn fill_derived(&mut self) {
        if self.email.smtp_host.is_empty() {
            self.email.smtp_host = self.email.imap_host.replace("imap", "smtp");
        }
        if self.email.from_address.is_empty() {
            self.email.from_address = self.email.username.clone();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.email.imap_host.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "email.imap_host".to_string(),
                hint: "Set it in the config file or via EMAIL_IMAP_HOST.".to_string(),
            });
        }
        if self.email.imap_port == 0 {
            return Err(invalid("email.imap_port", "must be non-zero"));
        }
        if self.email.smtp_port == 0 {
            return Err(invalid("email.smtp_port", "must be non-zero"));
        }
        if self.pipeline.label.trim().is_empty() {
            return Err(invalid("pipeline.label", "cannot be empty"));
        }
        if self.pipeline.max_results == 0 {
            return Err(invalid("pipeline.max_results", "must be at least 1"));
        }
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("'{value}': {e}"),
    })
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_cycle_settings() {
        let config = AppConfig::default();
        assert_eq!(config.pipeline.label, "Giveaway");
        assert!(config.pipeline.unread_only);
        assert_eq!(config.pipeline.max_results, 10);
        assert_eq!(config.pipeline.mark_read, MarkReadPolicy::Never);
        assert!(config.pipeline.report_to.is_none());
        assert_eq!(config.email.imap_port, 993);
        assert!(config.browser.enabled);
    }

    #[test]
    fn parses_partial_toml() {
        let config = AppConfig::from_toml(
            r#"
            [email]
            imap_host = "imap.example.com"
            username = "me@example.com"
            password = "hunter2"

            [pipeline]
            max_results = 25
            mark_read = "acted"
            "#,
        )
        .unwrap();

        assert_eq!(config.email.imap_host, "imap.example.com");
        assert_eq!(config.email.password.expose_secret(), "hunter2");
        assert_eq!(config.pipeline.max_results, 25);
        assert_eq!(config.pipeline.mark_read, MarkReadPolicy::Acted);
        assert_eq!(config.pipeline.label, "Giveaway");
        assert_eq!(config.classifier, ClassifierConfig::default());
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = AppConfig::from_toml("[email\nimap_host = 1").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn rejects_unknown_read_policy() {
        let err = AppConfig::from_toml("[pipeline]\nmark_read = \"always\"").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn env_overrides_take_precedence() {
        let mut config = AppConfig::from_toml("[email]\nimap_host = \"imap.file.com\"").unwrap();
        config
            .apply_overrides(lookup_from(&[
                ("EMAIL_IMAP_HOST", "imap.env.com"),
                ("EMAIL_IMAP_PORT", "1993"),
                ("EMAIL_PASSWORD", "secret"),
                ("BROWSER_HEADLESS", "true"),
            ]))
            .unwrap();

        assert_eq!(config.email.imap_host, "imap.env.com");
        assert_eq!(config.email.imap_port, 1993);
        assert_eq!(config.email.password.expose_secret(), "secret");
        assert!(config.browser.headless);
    }

    #[test]
    fn bad_override_is_invalid_value() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(lookup_from(&[("EMAIL_IMAP_PORT", "not-a-port")]))
            .unwrap_err();
        match err {
            ConfigError::InvalidValue { key, .. } => assert_eq!(key, "EMAIL_IMAP_PORT"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn derived_fields_follow_imap_and_username() {
        let mut config = AppConfig::default();
        config.email.imap_host = "imap.gmail.com".into();
        config.email.username = "me@gmail.com".into();
        config.fill_derived();
        assert_eq!(config.email.smtp_host, "smtp.gmail.com");
        assert_eq!(config.email.from_address, "me@gmail.com");
    }

    #[test]
    fn validate_requires_imap_host() {
        let err = AppConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));
    }

    #[test]
    fn validate_rejects_zero_batch() {
        let mut config = AppConfig::default();
        config.email.imap_host = "imap.example.com".into();
        config.pipeline.max_results = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(
            &path,
            "[email]\nimap_host = \"imap.example.com\"\nusername = \"me@example.com\"\n",
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.email.smtp_host, "smtp.example.com");
        assert_eq!(config.email.from_address, "me@example.com");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/agent.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
