use std::{fs, path::PathBuf, time::Duration};

use log::{debug, trace};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use validator::{Validate, ValidationError};

use crate::{
    config_error,
    core::{ClientResult, ErrorContext},
    request::DEFAULT_PUBLIC_PATHS,
};

static API_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(/[A-Za-z0-9._~-]+)*$").expect("valid api prefix regex"));

static HEADER_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9-]+$").expect("valid header name regex"));

#[derive(Default, Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    #[serde(default)]
    pub client: Client,
    #[validate(nested)]
    #[serde(default)]
    pub session: Session,
    #[validate(nested)]
    #[serde(default)]
    pub retry: Retry,
    #[validate(nested)]
    #[serde(default)]
    pub coalescing: Coalescing,
    #[validate(nested)]
    #[serde(default)]
    pub lookups: Lookups,
    #[serde(default)]
    pub log: Log,
}

// Config file load and validation
impl Config {
    pub fn load_from_yaml<P>(path: P) -> ClientResult<Self>
    where
        P: AsRef<std::path::Path> + std::fmt::Display,
    {
        let conf_str = fs::read_to_string(&path)
            .map_err(|e| config_error!("Unable to read conf file from {}: {}", path, e))?;
        debug!("Conf file read from {path}");
        Self::from_yaml(&conf_str)
    }

    pub fn from_yaml(conf_str: &str) -> ClientResult<Self> {
        trace!("Read conf file: {conf_str}");
        // an empty document means "all defaults"
        let conf: Config = if conf_str.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(conf_str)?
        };

        trace!("Loaded conf: {conf:?}");

        conf.validate()?;

        Ok(conf)
    }

    pub fn to_yaml(&self) -> ClientResult<String> {
        serde_yaml::to_string(self).with_context("failed to serialize config")
    }
}

#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "Client::validate_client"))]
#[serde(default)]
pub struct Client {
    #[validate(url)]
    pub base_url: String,
    pub api_prefix: String,
    pub tenant_header: String,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "timeout_ms")]
    pub timeout: Duration,
    #[validate(length(min = 1))]
    pub public_paths: Vec<String>,
}

impl Default for Client {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            api_prefix: "/api/v1".to_string(),
            tenant_header: "X-Tenant-ID".to_string(),
            timeout: Duration::from_secs(30),
            public_paths: DEFAULT_PUBLIC_PATHS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl Client {
    fn validate_client(&self) -> Result<(), ValidationError> {
        if !API_PREFIX_RE.is_match(&self.api_prefix) {
            let mut err = ValidationError::new("invalid_api_prefix");
            err.add_param("api_prefix".into(), &self.api_prefix);
            return Err(err);
        }

        if !HEADER_NAME_RE.is_match(&self.tenant_header) {
            let mut err = ValidationError::new("invalid_tenant_header");
            err.add_param("tenant_header".into(), &self.tenant_header);
            return Err(err);
        }

        if self.timeout.is_zero() {
            return Err(ValidationError::new("timeout_must_be_positive"));
        }

        if self.public_paths.iter().any(|p| !p.starts_with('/')) {
            return Err(ValidationError::new("public_path_must_be_absolute"));
        }

        Ok(())
    }
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Memory,
    #[default]
    File,
}

#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "Session::validate_storage"))]
#[serde(default)]
pub struct Session {
    pub storage: StorageKind,
    pub path: PathBuf,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "activity_throttle_ms")]
    pub activity_throttle: Duration,
    #[validate(length(min = 1))]
    pub login_path: String,
    #[validate(length(min = 1))]
    pub platform_login_path: String,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            storage: StorageKind::File,
            path: PathBuf::from(".riveredge/session.json"),
            activity_throttle: Duration::from_secs(1),
            login_path: "/login".to_string(),
            platform_login_path: "/infra/login".to_string(),
        }
    }
}

impl Session {
    fn validate_storage(&self) -> Result<(), ValidationError> {
        if self.storage == StorageKind::File && self.path.as_os_str().is_empty() {
            return Err(ValidationError::new("path_required_for_file_storage"));
        }
        Ok(())
    }
}

#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "Retry::validate_base_delay"))]
#[serde(default)]
pub struct Retry {
    pub max_retries: u32,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "base_delay_ms")]
    pub base_delay: Duration,
    pub exponential: bool,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            exponential: true,
        }
    }
}

impl Retry {
    fn validate_base_delay(&self) -> Result<(), ValidationError> {
        if self.base_delay.is_zero() {
            return Err(ValidationError::new("base_delay_must_be_positive"));
        }
        Ok(())
    }
}

/// How a coalescing registry's debounce timer reacts to new keys
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebounceMode {
    /// One flush point per window; later keys join the pending flush.
    #[default]
    Fixed,
    /// Every new key restarts the window.
    Sliding,
}

#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Coalescing {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "window_ms")]
    pub window: Duration,
    pub mode: DebounceMode,
}

impl Default for Coalescing {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(50),
            mode: DebounceMode::Fixed,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Lookups {
    #[validate(length(min = 1))]
    pub quantity_batch: String,
    #[validate(length(min = 1))]
    pub configured_batch: String,
    /// Single-key quantity endpoint; the key is appended as the last segment.
    #[validate(length(min = 1))]
    pub quantity_single: String,
    #[validate(length(min = 1))]
    pub configured_single: String,
}

impl Default for Lookups {
    fn default() -> Self {
        Self {
            quantity_batch: "/apps/kuaizhizao/inventory/available-quantities".to_string(),
            configured_batch: "/apps/master-data/materials/bom-exists".to_string(),
            quantity_single: "/apps/kuaizhizao/inventory/available-quantity".to_string(),
            configured_single: "/apps/master-data/materials/bom-exists".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Log {
    pub level: String,
    pub path: Option<String>,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ClientError;

    fn init_log() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn assert_invalid(conf_str: &str) {
        match Config::from_yaml(conf_str) {
            Ok(_) => panic!("Expected error, but got a valid config"),
            Err(e) => {
                eprintln!("Error: {:?}", e);
                assert!(matches!(e, ClientError::Configuration(_)));
            }
        }
    }

    #[test]
    fn not_a_test_i_cannot_write_yaml_by_hand() {
        init_log();
        let conf = Config::default();
        // cargo test -- --nocapture not_a_test_i_cannot_write_yaml_by_hand
        println!("{}", conf.to_yaml().unwrap());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        init_log();
        let conf = Config::from_yaml("").unwrap();
        assert_eq!(conf.client.api_prefix, "/api/v1");
        assert_eq!(conf.client.tenant_header, "X-Tenant-ID");
        assert_eq!(conf.retry.max_retries, 3);
        assert_eq!(conf.retry.base_delay, Duration::from_millis(1000));
        assert_eq!(conf.coalescing.window, Duration::from_millis(50));
        assert_eq!(conf.coalescing.mode, DebounceMode::Fixed);
        assert_eq!(conf.session.storage, StorageKind::File);
        assert!(conf.client.public_paths.contains(&"/auth/login".to_string()));
    }

    #[test]
    fn test_load_file() {
        init_log();
        let conf_str = r#"
---
client:
  base_url: "https://erp.example.com"
  api_prefix: /api/v2
  tenant_header: X-Org-ID
  timeout_ms: 5000

session:
  storage: memory
  activity_throttle_ms: 2000

retry:
  max_retries: 5
  base_delay_ms: 200
  exponential: false

coalescing:
  window_ms: 100
  mode: sliding

log:
  level: debug
        "#;
        let conf = Config::from_yaml(conf_str).unwrap();
        assert_eq!(conf.client.base_url, "https://erp.example.com");
        assert_eq!(conf.client.api_prefix, "/api/v2");
        assert_eq!(conf.client.timeout, Duration::from_secs(5));
        assert_eq!(conf.session.storage, StorageKind::Memory);
        assert_eq!(conf.session.activity_throttle, Duration::from_secs(2));
        assert_eq!(conf.retry.max_retries, 5);
        assert!(!conf.retry.exponential);
        assert_eq!(conf.coalescing.mode, DebounceMode::Sliding);
        assert_eq!(conf.log.level, "debug");
        // untouched sections keep their defaults
        assert_eq!(conf.lookups.configured_batch, "/apps/master-data/materials/bom-exists");
    }

    #[test]
    fn test_load_from_yaml_file() {
        init_log();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.yaml");
        fs::write(&path, "retry:\n  max_retries: 0\n").unwrap();

        let conf = Config::load_from_yaml(path.display().to_string()).unwrap();
        assert_eq!(conf.retry.max_retries, 0);

        let missing = dir.path().join("missing.yaml");
        assert!(Config::load_from_yaml(missing.display().to_string()).is_err());
    }

    #[test]
    fn test_valid_base_url() {
        init_log();
        assert_invalid(
            r#"
client:
  base_url: "not a url"
        "#,
        );
    }

    #[test]
    fn test_valid_api_prefix() {
        init_log();
        assert_invalid(
            r#"
client:
  api_prefix: "api/v1"
        "#,
        );
    }

    #[test]
    fn test_valid_tenant_header() {
        init_log();
        assert_invalid(
            r#"
client:
  tenant_header: "X Tenant"
        "#,
        );
    }

    #[test]
    fn test_valid_public_paths_length() {
        init_log();
        assert_invalid(
            r#"
client:
  public_paths: []
        "#,
        );
    }

    #[test]
    fn test_valid_retry_base_delay() {
        init_log();
        assert_invalid(
            r#"
retry:
  base_delay_ms: 0
        "#,
        );
    }

    #[test]
    fn test_unknown_mode_rejected() {
        init_log();
        assert_invalid(
            r#"
coalescing:
  mode: eager
        "#,
        );
    }
}
