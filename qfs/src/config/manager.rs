//! Configuration source wrangling
// (c) 2025 qfs contributors

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use figment::{
    Figment, Provider,
    providers::{Env, Format as _, Serialized, Toml},
};
use tracing::debug;

use super::{Configuration, ConfigurationOverrides};

/// Prefix of environment variables which set configuration options
pub const ENV_PREFIX: &str = "QFS_";

/// Name of the configuration file, within the per-user configuration directory
const CONFIG_FILE: &str = "qfs/qfs.toml";

/// Fields which must not be shown in full
const REDACTED_FIELDS: &[&str] = &["token"];

/// Processes and merges all configuration sources.
///
/// In increasing order of priority:
/// 1. hard-wired defaults
/// 2. the configuration file
/// 3. environment variables
/// 4. command-line options
#[derive(Debug)]
pub struct Manager {
    data: Figment,
    files: Vec<PathBuf>,
}

impl Manager {
    fn new(apply_env: bool, config_file: Option<&Path>, use_default_file: bool) -> Self {
        let mut manager = Self {
            data: Figment::new(),
            files: Vec::new(),
        };
        manager.apply_system_default();
        let file = config_file
            .map(Path::to_path_buf)
            .or_else(|| use_default_file.then(Self::user_config_path).flatten());
        if let Some(path) = file {
            manager.add_config_file(&path);
        }
        if apply_env {
            manager.merge_provider(Env::prefixed(ENV_PREFIX));
        }
        manager
    }

    /// General constructor for production use.
    ///
    /// Reads the given configuration file, or the user's configuration file if there is none,
    /// then applies the environment.
    #[must_use]
    pub fn standard(config_file: Option<&Path>) -> Self {
        Self::new(true, config_file, true)
    }

    /// Testing constructor: system defaults only
    #[cfg(test)]
    #[must_use]
    pub(crate) fn without_files() -> Self {
        Self::new(false, None, false)
    }

    /// Testing constructor: system defaults and one file
    #[cfg(test)]
    #[must_use]
    pub(crate) fn with_file(path: &Path) -> Self {
        Self::new(false, Some(path), false)
    }

    /// The per-user configuration file, on this platform
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(CONFIG_FILE))
    }

    /// The configuration files which would be read, whether or not they exist
    #[must_use]
    pub fn config_files(config_file: Option<&Path>) -> Vec<String> {
        config_file
            .map(Path::to_path_buf)
            .or_else(Self::user_config_path)
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect()
    }

    /// The configuration files which were actually read
    #[must_use]
    pub fn files_read(&self) -> &[PathBuf] {
        &self.files
    }

    fn add_config_file(&mut self, path: &Path) {
        if !path.exists() {
            debug!("configuration file {path:?} not present");
            return;
        }
        debug!("reading configuration file {path:?}");
        self.files.push(path.to_path_buf());
        self.merge_provider(Toml::file_exact(path));
    }

    /// Merges in a data set, which takes priority over everything before it
    pub fn merge_provider<T: Provider>(&mut self, provider: T) {
        let f = std::mem::take(&mut self.data);
        // in the error case, this leaves the figment in a fused state
        self.data = f.merge(provider);
    }

    /// Applies command-line options, at the highest priority
    pub fn apply_overrides(&mut self, overrides: &ConfigurationOverrides) {
        self.merge_provider(Serialized::defaults(overrides));
    }

    /// Applies the system default settings, at a lower priority than everything else
    pub fn apply_system_default(&mut self) {
        let f = std::mem::take(&mut self.data);
        self.data = f.join(Serialized::defaults(Configuration::system_default()));
    }

    /// Extracts the working configuration, and checks it
    pub fn get(&self) -> anyhow::Result<Configuration> {
        let config: Configuration = self.data.extract().map_err(|e| {
            let mut msg = String::from("invalid configuration:");
            for err in e {
                let _ = write!(msg, "\n  {err}");
            }
            anyhow::anyhow!(msg)
        })?;
        Ok(config)
    }

    /// Extracts the working configuration without semantic checks, then renders it
    /// with the source of each value. Secrets are redacted.
    pub fn to_display_string(&self) -> anyhow::Result<String> {
        let config = self.get()?;
        let value = toml::Value::try_from(&config)?;
        let mut out = String::new();
        let Some(table) = value.as_table() else {
            anyhow::bail!("configuration did not serialize as a table");
        };
        let width = table.keys().map(String::len).max().unwrap_or(0);
        for (key, val) in table {
            let shown = if REDACTED_FIELDS.contains(&key.as_str()) {
                if val.as_str().is_some_and(str::is_empty) {
                    String::new()
                } else {
                    "<redacted>".into()
                }
            } else {
                val.to_string()
            };
            let source = self
                .data
                .find_metadata(key)
                .map_or_else(String::new, |md| {
                    md.source
                        .as_ref()
                        .map_or_else(|| md.name.to_string(), |s| format!("{} ({s})", md.name))
                });
            let _ = writeln!(out, "{key:<width$}  {shown:<24}  {source}");
        }
        Ok(out)
    }
}
