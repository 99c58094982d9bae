//! Configuration file and environment overrides.
//!
//! Settings come from a TOML file (default `<config dir>/emprops/config.toml`)
//! and are then overridden by `EMPROPS_*` environment variables, which may
//! also be supplied through a `.env` file.
//!
//! # Example Configuration
//!
//! ```toml
//! [session]
//! emcli = "emcli"
//! oms_url = "https://em.example.com:7802/em"
//! trust_all = true
//! username = "sysman"
//! password_file = "/home/oracle/.secret"
//!
//! [filter]
//! type = "oracle_database"
//! sort = ["TARGET_TYPE", "TARGET_NAME"]
//!
//! [apply]
//! policy = "fail-fast"
//!
//! [properties]
//! orcl_gtp_location = "DC1"
//!
//! [logging]
//! audit_log = "/var/log/emprops/audit.log"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::applier::{ApplyPolicy, DEFAULT_SEPARATOR};
use crate::fleet::EmcliSettings;
use crate::model::{FilterSpec, MATCH_ANY, PropertyMapping, SortKey};

/// Errors that can occur when loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to parse properties file {path}: {message}")]
    ParseProperties { path: PathBuf, message: String },

    #[error("Failed to read password file {path}: {source}")]
    PasswordFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub apply: ApplyConfig,

    /// Properties applied in addition to any given on the command line.
    #[serde(default)]
    pub properties: PropertyMapping,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How to reach the management server through emcli.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// emcli command line; may include arguments, split shell-style.
    #[serde(default = "default_emcli")]
    pub emcli: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oms_url: Option<String>,

    /// Accept any server certificate.
    #[serde(default)]
    pub trust_all: bool,

    /// Log in as this user before the first call. Without it, an existing
    /// emcli session is assumed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// File holding the login password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_file: Option<PathBuf>,

    /// Only ever set from `EMPROPS_PASSWORD`; never read from or written to the file.
    #[serde(skip)]
    pub password: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            emcli: default_emcli(),
            oms_url: None,
            trust_all: false,
            username: None,
            password_file: None,
            password: None,
        }
    }
}

/// Default filter, used for any filter flag not given on the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    #[serde(default = "default_pattern")]
    pub agent: String,

    #[serde(rename = "type", default = "default_pattern")]
    pub target_type: String,

    #[serde(default = "default_pattern")]
    pub name: String,

    #[serde(default = "default_sort")]
    pub sort: Vec<SortKey>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            agent: default_pattern(),
            target_type: default_pattern(),
            name: default_pattern(),
            sort: default_sort(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplyConfig {
    #[serde(default)]
    pub policy: ApplyPolicy,

    /// Record field separator declared to emcli.
    #[serde(default = "default_separator")]
    pub separator: String,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            policy: ApplyPolicy::default(),
            separator: default_separator(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Append a plain-text copy of all log events to this file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_log: Option<PathBuf>,
}

fn default_emcli() -> String {
    "emcli".to_string()
}
fn default_pattern() -> String {
    MATCH_ANY.to_string()
}
fn default_sort() -> Vec<SortKey> {
    vec![SortKey::Type, SortKey::Name]
}
fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

/// Platform config file location.
pub fn default_config_path() -> PathBuf {
    directories::ProjectDirs::from("com", "emprops", "emprops").map_or_else(
        || PathBuf::from("emprops.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

impl AppConfig {
    /// Load the config file, then apply environment overrides.
    ///
    /// An explicit path must exist. The default path is optional: when it is
    /// missing, defaults are used.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = default_config_path();
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Apply `EMPROPS_*` environment variables on top of file values.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = dotenvy::var("EMPROPS_EMCLI") {
            self.session.emcli = val;
        }
        if let Ok(val) = dotenvy::var("EMPROPS_OMS_URL") {
            self.session.oms_url = Some(val);
        }
        if let Ok(val) = dotenvy::var("EMPROPS_TRUST_ALL") {
            self.session.trust_all = parse_bool(&val).ok_or_else(|| {
                ConfigError::Validation(format!("EMPROPS_TRUST_ALL: '{val}' is not a boolean"))
            })?;
        }
        if let Ok(val) = dotenvy::var("EMPROPS_USERNAME") {
            self.session.username = Some(val);
        }
        if let Ok(val) = dotenvy::var("EMPROPS_PASSWORD_FILE") {
            self.session.password_file = Some(PathBuf::from(val));
        }
        if let Ok(val) = dotenvy::var("EMPROPS_PASSWORD") {
            self.session.password = Some(val);
        }
        if let Ok(val) = dotenvy::var("EMPROPS_POLICY") {
            self.apply.policy = val
                .parse()
                .map_err(|e: String| ConfigError::Validation(format!("EMPROPS_POLICY: {e}")))?;
        }
        if let Ok(val) = dotenvy::var("EMPROPS_SEPARATOR") {
            self.apply.separator = val;
        }
        if let Ok(val) = dotenvy::var("EMPROPS_AUDIT_LOG") {
            self.logging.audit_log = Some(PathBuf::from(val));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.apply.separator.is_empty() {
            return Err(ConfigError::Validation(
                "apply.separator must not be empty".to_string(),
            ));
        }
        let command = shell_words::split(&self.session.emcli).map_err(|e| {
            ConfigError::Validation(format!("session.emcli '{}': {e}", self.session.emcli))
        })?;
        if command.is_empty() {
            return Err(ConfigError::Validation(
                "session.emcli must name a command".to_string(),
            ));
        }
        if let Some((name, _)) = self.properties.iter().find(|(name, _)| name.is_empty()) {
            return Err(ConfigError::Validation(format!(
                "properties: empty property name '{name}'"
            )));
        }
        Ok(())
    }

    /// Resolve the session into emcli client settings, reading the password file
    /// when a username is configured and no password was given directly.
    pub fn emcli_settings(&self) -> Result<EmcliSettings, ConfigError> {
        let command = shell_words::split(&self.session.emcli)
            .map_err(|e| ConfigError::Validation(format!("session.emcli: {e}")))?;
        let password = match (&self.session.password, &self.session.password_file) {
            (Some(password), _) => Some(password.clone()),
            (None, Some(path)) if self.session.username.is_some() => {
                let content = std::fs::read_to_string(path).map_err(|source| {
                    ConfigError::PasswordFile {
                        path: path.clone(),
                        source,
                    }
                })?;
                Some(content.trim_end_matches(['\r', '\n']).to_string())
            }
            _ => None,
        };
        Ok(EmcliSettings {
            command,
            oms_url: self.session.oms_url.clone(),
            trust_all: self.session.trust_all,
            username: self.session.username.clone(),
            password,
        })
    }

    /// Filter defaults from the file, as a [`FilterSpec`].
    pub fn filter_spec(&self) -> FilterSpec {
        FilterSpec {
            agent: self.filter.agent.clone(),
            target_type: self.filter.target_type.clone(),
            name: self.filter.name.clone(),
            sort: self.filter.sort.clone(),
        }
    }
}

fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Load a property mapping from a TOML or JSON file of `name = value` pairs.
///
/// Files ending in `.json` are read as a JSON object; anything else as TOML.
/// TOML files may hold the pairs at top level or under a `[properties]` table.
pub fn load_properties_file(path: &Path) -> Result<PropertyMapping, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_err = |message: String| ConfigError::ParseProperties {
        path: path.to_path_buf(),
        message,
    };
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        return serde_json::from_str(&content).map_err(|e| parse_err(e.to_string()));
    }

    let mut table: toml::Table = toml::from_str(&content).map_err(|e| parse_err(e.to_string()))?;
    if let Some(toml::Value::Table(nested)) = table.remove("properties") {
        table = nested;
    }
    table
        .into_iter()
        .map(|(name, value)| match value {
            toml::Value::String(s) => Ok((name, s)),
            other => Err(parse_err(format!(
                "value of '{name}' must be a string, got {}",
                other.type_str()
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    struct EnvGuard {
        key: &'static str,
        prev: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &'static str, val: &str) -> Self {
            let prev = std::env::var(key).ok();
            unsafe { std::env::set_var(key, val) };
            Self { key, prev }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.prev {
                Some(v) => unsafe { std::env::set_var(self.key, v) },
                None => unsafe { std::env::remove_var(self.key) },
            }
        }
    }

    #[test]
    fn parse_empty_config_uses_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.session.emcli, "emcli");
        assert_eq!(config.apply.separator, DEFAULT_SEPARATOR);
        assert_eq!(config.apply.policy, ApplyPolicy::FailFast);
        assert_eq!(config.filter_spec(), FilterSpec::default());
        assert!(config.properties.is_empty());
    }

    #[test]
    fn parse_full_config() {
        let config = AppConfig::from_toml_str(
            r#"
            [session]
            emcli = "java -jar '/opt/em cli/emcliKit.jar'"
            oms_url = "https://em.example.com:7802/em"
            trust_all = true
            username = "sysman"
            password_file = "/home/oracle/.secret"

            [filter]
            agent = "agent1"
            type = "oracle_database"
            sort = ["TARGET_NAME"]

            [apply]
            policy = "best-effort"
            separator = "~~"

            [properties]
            orcl_gtp_location = "DC1"
            "#,
        )
        .unwrap();
        assert!(config.session.trust_all);
        assert_eq!(config.filter.target_type, "oracle_database");
        assert_eq!(config.filter.name, MATCH_ANY);
        assert_eq!(config.filter.sort, vec![SortKey::Name]);
        assert_eq!(config.apply.policy, ApplyPolicy::BestEffort);
        assert_eq!(config.properties.get("orcl_gtp_location"), Some("DC1"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(AppConfig::from_toml_str("[session]\nurl = \"x\"").is_err());
    }

    #[test]
    fn validate_empty_separator() {
        let mut config = AppConfig::default();
        config.apply.separator.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_unbalanced_emcli_quotes() {
        let mut config = AppConfig::default();
        config.session.emcli = "java -jar 'emcliKit.jar".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn emcli_command_is_split_shell_style() {
        let mut config = AppConfig::default();
        config.session.emcli = "java -jar '/opt/em cli/emcliKit.jar'".to_string();
        let settings = config.emcli_settings().unwrap();
        assert_eq!(
            settings.command,
            vec!["java", "-jar", "/opt/em cli/emcliKit.jar"]
        );
        assert_eq!(settings.password, None);
    }

    #[test]
    fn password_file_is_read_for_login() {
        let dir = tempfile::TempDir::new().unwrap();
        let secret = dir.path().join(".secret");
        std::fs::write(&secret, "welcome1\n").unwrap();

        let mut config = AppConfig::default();
        config.session.username = Some("sysman".to_string());
        config.session.password_file = Some(secret);
        let settings = config.emcli_settings().unwrap();
        assert_eq!(settings.password.as_deref(), Some("welcome1"));
    }

    #[test]
    fn missing_password_file_is_an_error() {
        let mut config = AppConfig::default();
        config.session.username = Some("sysman".to_string());
        config.session.password_file = Some(PathBuf::from("/nonexistent/.secret"));
        assert!(matches!(
            config.emcli_settings(),
            Err(ConfigError::PasswordFile { .. })
        ));
    }

    #[test]
    #[serial]
    fn env_overrides_file_values() {
        let _url = EnvGuard::set("EMPROPS_OMS_URL", "https://other:7802/em");
        let _trust = EnvGuard::set("EMPROPS_TRUST_ALL", "yes");
        let _policy = EnvGuard::set("EMPROPS_POLICY", "best_effort");

        let mut config = AppConfig::from_toml_str("[session]\noms_url = \"https://em:7802/em\"")
            .unwrap();
        config.apply_env_overrides().unwrap();
        assert_eq!(config.session.oms_url.as_deref(), Some("https://other:7802/em"));
        assert!(config.session.trust_all);
        assert_eq!(config.apply.policy, ApplyPolicy::BestEffort);
    }

    #[test]
    #[serial]
    fn invalid_env_policy_is_rejected() {
        let _policy = EnvGuard::set("EMPROPS_POLICY", "sometimes");
        let mut config = AppConfig::default();
        assert!(matches!(
            config.apply_env_overrides(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        assert!(matches!(
            AppConfig::from_file(Path::new("/nonexistent/emprops.toml")),
            Err(ConfigError::ReadFile { .. })
        ));
    }

    #[test]
    fn properties_file_toml_and_json() {
        let dir = tempfile::TempDir::new().unwrap();

        let toml_path = dir.path().join("props.toml");
        std::fs::write(&toml_path, "[properties]\norcl_gtp_location = \"DC1\"\n").unwrap();
        let mapping = load_properties_file(&toml_path).unwrap();
        assert_eq!(mapping.get("orcl_gtp_location"), Some("DC1"));

        let flat_path = dir.path().join("flat.toml");
        std::fs::write(&flat_path, "env = \"prod\"\nsite = \"dc1\"\n").unwrap();
        assert_eq!(load_properties_file(&flat_path).unwrap().len(), 2);

        let json_path = dir.path().join("props.json");
        std::fs::write(&json_path, r#"{"env": "prod"}"#).unwrap();
        assert_eq!(load_properties_file(&json_path).unwrap().get("env"), Some("prod"));
    }

    #[test]
    fn properties_file_rejects_non_string_values() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("props.toml");
        std::fs::write(&path, "cost_center = 42\n").unwrap();
        let err = load_properties_file(&path).unwrap_err();
        assert!(err.to_string().contains("must be a string"));
    }
}
