use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use anyhow::{bail, Context, Result};
use crate::global::utils::{get_global_config_dir, get_global_data_dir, get_home_dir};

/// Keys of [`DefaultConfig`] that name directories which must exist before
/// any tool is installed.
pub const DIRECTORY_KEYS: &[&str] = &["tools-dir", "gopath", "goroot"];

/// Represents the contents of the `config.toml` file.
///
/// Every field is optional; a missing file is the same as an empty one.
#[derive(Deserialize, Debug, Default)]
pub struct ConfigFile {
    /// Directory holding one YAML definition per tool.
    pub definitions_dir: Option<PathBuf>,
    /// Settings for orchestration runs.
    #[serde(default)]
    pub runner: RunnerSection,
    /// Overrides for the built-in [`DefaultConfig`] values.
    #[serde(default)]
    pub defaults: BTreeMap<String, toml::Value>,
}

/// The `[runner]` table of `config.toml`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct RunnerSection {
    /// Maximum number of sibling tools processed at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-command timeout in seconds, `0` disables it.
    #[serde(default)]
    pub command_timeout_secs: u64,
}

fn default_concurrency() -> usize {
    1
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            command_timeout_secs: 0,
        }
    }
}

impl RunnerSection {
    pub fn command_timeout(&self) -> Option<Duration> {
        match self.command_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl ConfigFile {
    /// Loads a `ConfigFile` from a file path.
    ///
    /// # Errors
    /// Returns an error if the file can't be read or deserialized.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ConfigFile> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Loads the file if it exists, otherwise returns the empty configuration.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<ConfigFile> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(ConfigFile::default())
        }
    }

    /// The definitions directory, falling back to `<config dir>/definitions`.
    pub fn definitions_dir(&self) -> Result<PathBuf> {
        match &self.definitions_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(get_global_config_dir()?.join("definitions")),
        }
    }

    /// Builds the [`DefaultConfig`]: built-in values overlaid with the `[defaults]` table.
    pub fn default_config(&self) -> Result<DefaultConfig> {
        let mut config = DefaultConfig::builtin()?;
        for (key, value) in &self.defaults {
            config.insert(key, scalar_to_string(key, value)?);
        }
        Ok(config)
    }
}

fn scalar_to_string(key: &str, value: &toml::Value) -> Result<String> {
    Ok(match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Integer(i) => i.to_string(),
        toml::Value::Float(f) => f.to_string(),
        toml::Value::Boolean(b) => b.to_string(),
        toml::Value::Datetime(d) => d.to_string(),
        toml::Value::Array(_) | toml::Value::Table(_) => {
            bail!("Default `{}` must be a scalar value", key)
        }
    })
}

/// Process-wide configuration values referenced by `!get_default`.
///
/// Built once at startup and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultConfig {
    values: BTreeMap<String, String>,
}

impl DefaultConfig {
    /// An empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in defaults, rooted in the per-user data directory.
    pub fn builtin() -> Result<Self> {
        let data_dir = get_global_data_dir()?;
        let tools_dir = data_dir.join("tools");
        let mut config = DefaultConfig::new();
        config.insert("home", get_home_dir()?.to_string_lossy());
        config.insert("tools-dir", tools_dir.to_string_lossy());
        config.insert("gopath", data_dir.join("go").to_string_lossy());
        config.insert("goroot", tools_dir.join("go").to_string_lossy());
        config.insert("threads", "10");
        config.insert("masscan-rate", "1000");
        Ok(config)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Creates every directory named by [`DIRECTORY_KEYS`] that is configured.
    pub fn ensure_directories(&self) -> Result<Vec<PathBuf>> {
        let mut created = Vec::new();
        for key in DIRECTORY_KEYS {
            if let Some(dir) = self.get(key) {
                let dir = PathBuf::from(dir);
                std::fs::create_dir_all(&dir)
                    .with_context(|| format!("Could not create {} ({})", dir.display(), key))?;
                created.push(dir);
            }
        }
        Ok(created)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DefaultConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut config = DefaultConfig::new();
        for (key, value) in iter {
            config.insert(key, value);
        }
        config
    }
}
