//! Config file loading.
//!
//! `--config FILE` wins; otherwise `config.toml` in the user config
//! directory is read when it exists.
//!
//! ```toml
//! [solver]
//! max_iterations = 128
//! ```

use std::path::{Path, PathBuf};

use adam_core::SolverConfig;
use anyhow::Context;
use directories::ProjectDirs;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub solver: SolverConfig,
}

impl Config {
    pub fn from_toml(content: &str) -> anyhow::Result<Config> {
        Ok(toml::from_str::<Config>(content)?)
    }

    /// Load `path`, falling back to the user config file and then to the
    /// defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
        match path {
            Some(path) => Config::load_file(path),
            None => match user_config_path().filter(|p| p.is_file()) {
                Some(path) => Config::load_file(&path),
                None => Ok(Config::default()),
            },
        }
    }

    fn load_file(path: &Path) -> anyhow::Result<Config> {
        debug!(path = %path.display(), "loading config");
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Config::from_toml(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

fn user_config_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("", "", "adam")?;
    let mut path = proj.config_dir().to_path_buf();
    path.push("config.toml");
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solver_table() {
        let config = Config::from_toml("[solver]\nmax_iterations = 128\n").unwrap();
        assert_eq!(config.solver.max_iterations, 128);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/adam.toml"))).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read /nonexistent/adam.toml"));
    }

    #[test]
    fn test_bad_value_is_an_error() {
        assert!(Config::from_toml("[solver]\nmax_iterations = \"many\"\n").is_err());
    }
}
