//! Solver configuration.

use serde::Deserialize;

pub const DEFAULT_MAX_ITERATIONS: usize = 64;

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SolverConfig {
    /// Sweeps `update` may take before giving up with `NonConvergent`.
    pub max_iterations: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_table_keeps_defaults() {
        let config: SolverConfig = toml::from_str("").unwrap();
        assert_eq!(config, SolverConfig::default());

        let config: SolverConfig = toml::from_str("max_iterations = 8").unwrap();
        assert_eq!(config.max_iterations, 8);
    }
}
