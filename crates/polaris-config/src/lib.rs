//! Settings for the polaris CLI
//!
//! Settings are read from a YAML file found by [`find_settings_file`]:
//!
//! ```yaml
//! endpoint: https://acme.my.polaris.com/api/graphql
//! access_token: eyJhbGciOi...
//! stack_poll_interval_secs: 10
//! job_poll_interval_secs: 10
//! poll_jitter_millis: 500
//! timeout_secs: 3600
//! ```

pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the settings file directly
pub const CONFIG_PATH_ENV: &str = "POLARIS_CONFIG_PATH";

/// Environment variable overriding `access_token`
pub const ACCESS_TOKEN_ENV: &str = "POLARIS_ACCESS_TOKEN";

const CANDIDATES: [&str; 2] = ["polaris.local.yaml", "polaris.yaml"];

fn default_poll_interval_secs() -> u64 {
    10
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Control plane GraphQL endpoint
    pub endpoint: String,

    #[serde(default)]
    pub access_token: String,

    #[serde(default = "default_poll_interval_secs")]
    pub stack_poll_interval_secs: u64,

    #[serde(default = "default_poll_interval_secs")]
    pub job_poll_interval_secs: u64,

    #[serde(default)]
    pub poll_jitter_millis: u64,

    /// Deadline for one saga run; unbounded when absent
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Settings {
    pub fn stack_poll_interval(&self) -> Duration {
        Duration::from_secs(self.stack_poll_interval_secs)
    }

    pub fn job_poll_interval(&self) -> Duration {
        Duration::from_secs(self.job_poll_interval_secs)
    }

    pub fn poll_jitter(&self) -> Duration {
        Duration::from_millis(self.poll_jitter_millis)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Poll intervals must be at least one second.
    fn validate(&self, path: &Path) -> Result<()> {
        for (key, value) in [
            ("stack_poll_interval_secs", self.stack_poll_interval_secs),
            ("job_poll_interval_secs", self.job_poll_interval_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    path: path.to_path_buf(),
                    message: format!("{key} must be at least 1"),
                });
            }
        }
        Ok(())
    }
}

/// Global settings file (`~/.config/polaris/polaris.yaml`)
pub fn global_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("polaris").join("polaris.yaml"))
}

/// Locate the settings file.
///
/// Search order:
/// 1. `POLARIS_CONFIG_PATH`
/// 2. current directory: `polaris.local.yaml`, `polaris.yaml`
/// 3. `~/.config/polaris/polaris.yaml`
pub fn find_settings_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!(path = %path.display(), "{CONFIG_PATH_ENV} points to a missing file");
    }

    let current_dir = std::env::current_dir()?;
    for filename in CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    if let Some(global) = global_settings_path()
        && global.exists()
    {
        return Ok(global);
    }

    Err(ConfigError::SettingsNotFound)
}

/// Find and load the settings file.
pub fn load_settings() -> Result<Settings> {
    let path = find_settings_file()?;
    load_settings_from(&path)
}

/// Load settings from `path`, applying `POLARIS_ACCESS_TOKEN` on top.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    tracing::debug!(path = %path.display(), "Loading settings");
    let content = std::fs::read_to_string(path)?;
    let mut settings: Settings =
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    settings.validate(path)?;

    if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV)
        && !token.is_empty()
    {
        settings.access_token = token;
    }
    if settings.access_token.is_empty() {
        return Err(ConfigError::MissingAccessToken(path.to_path_buf()));
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    const SETTINGS: &str = "endpoint: https://acme.my.polaris.com/api/graphql\naccess_token: from-file\n";

    /// Run `f` with `dir` as the working directory and no settings in the
    /// environment.
    fn in_dir<F: FnOnce()>(dir: &Path, f: F) {
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir).unwrap();
        temp_env::with_vars(
            [
                (CONFIG_PATH_ENV, None::<&str>),
                (ACCESS_TOKEN_ENV, None),
                ("XDG_CONFIG_HOME", Some(dir.join("xdg").to_str().unwrap())),
            ],
            f,
        );
        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    fn test_defaults() {
        let settings: Settings = serde_yaml::from_str(SETTINGS).unwrap();
        assert_eq!(settings.stack_poll_interval(), Duration::from_secs(10));
        assert_eq!(settings.job_poll_interval(), Duration::from_secs(10));
        assert_eq!(settings.poll_jitter(), Duration::ZERO);
        assert_eq!(settings.timeout(), None);
    }

    #[test]
    #[serial]
    fn test_find_settings_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("polaris.yaml"), SETTINGS).unwrap();

        in_dir(temp_dir.path(), || {
            let path = find_settings_file().unwrap();
            assert!(path.ends_with("polaris.yaml"));
        });
    }

    #[test]
    #[serial]
    fn test_local_file_has_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("polaris.yaml"), SETTINGS).unwrap();
        fs::write(temp_dir.path().join("polaris.local.yaml"), SETTINGS).unwrap();

        in_dir(temp_dir.path(), || {
            let path = find_settings_file().unwrap();
            assert!(path.ends_with("polaris.local.yaml"));
        });
    }

    #[test]
    #[serial]
    fn test_env_var_has_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let custom = temp_dir.path().join("custom.yaml");
        fs::write(&custom, SETTINGS).unwrap();
        fs::write(temp_dir.path().join("polaris.yaml"), SETTINGS).unwrap();

        in_dir(temp_dir.path(), || {
            temp_env::with_var(CONFIG_PATH_ENV, Some(custom.to_str().unwrap()), || {
                assert_eq!(find_settings_file().unwrap(), custom);
            });
        });
    }

    #[cfg(target_os = "linux")]
    #[test]
    #[serial]
    fn test_global_settings() {
        let temp_dir = tempfile::tempdir().unwrap();
        let global_dir = temp_dir.path().join("xdg").join("polaris");
        fs::create_dir_all(&global_dir).unwrap();
        fs::write(global_dir.join("polaris.yaml"), SETTINGS).unwrap();

        in_dir(temp_dir.path(), || {
            assert_eq!(
                find_settings_file().unwrap(),
                global_dir.join("polaris.yaml")
            );
        });
    }

    #[test]
    #[serial]
    fn test_settings_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();

        in_dir(temp_dir.path(), || {
            assert!(matches!(
                find_settings_file(),
                Err(ConfigError::SettingsNotFound)
            ));
        });
    }

    #[test]
    #[serial]
    fn test_access_token_override() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("polaris.yaml");
        fs::write(&path, SETTINGS).unwrap();

        temp_env::with_var(ACCESS_TOKEN_ENV, Some("from-env"), || {
            let settings = load_settings_from(&path).unwrap();
            assert_eq!(settings.access_token, "from-env");
        });
        temp_env::with_var_unset(ACCESS_TOKEN_ENV, || {
            let settings = load_settings_from(&path).unwrap();
            assert_eq!(settings.access_token, "from-file");
        });
    }

    #[test]
    #[serial]
    fn test_missing_access_token() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("polaris.yaml");
        fs::write(&path, "endpoint: https://acme.my.polaris.com/api/graphql\n").unwrap();

        temp_env::with_var_unset(ACCESS_TOKEN_ENV, || {
            assert!(matches!(
                load_settings_from(&path),
                Err(ConfigError::MissingAccessToken(_))
            ));
        });
    }

    #[test]
    fn test_zero_poll_interval() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("polaris.yaml");
        fs::write(&path, format!("{SETTINGS}job_poll_interval_secs: 0\n")).unwrap();

        let err = load_settings_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(err.to_string().contains("job_poll_interval_secs must be at least 1"));
    }

    #[test]
    fn test_malformed_settings() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("polaris.yaml");
        fs::write(&path, "endpoint: [unterminated\n").unwrap();

        let err = load_settings_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("polaris.yaml"));
    }
}
