//! Run configuration.
//!
//! Resolution order: built-in defaults, then environment variables,
//! then explicit command-line overrides. Every invalid value names the
//! offending key in its diagnostic.

use clap::ValueEnum;

use crate::error::ConfigError;

/// Named graph layouts offered by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TopologyKind {
    /// Path graph with increasing weights.
    Linear,
    /// Complete graph with weights in lexicographic edge order.
    Complete,
    /// Four-neighborhood grid with seeded random distinct weights.
    Grid,
}

/// How the finished tree is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One edge per line plus the total weight.
    Text,
    /// The tree serialized as JSON.
    Json,
}

/// Fully resolved driver settings.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub topology: TopologyKind,
    pub nodes: u32,
    pub seed: u64,
    pub verbose: bool,
    pub format: OutputFormat,
}

/// Command-line values that take precedence over the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub topology: Option<TopologyKind>,
    pub nodes: Option<u32>,
    pub seed: Option<u64>,
    pub verbose: bool,
    pub format: Option<OutputFormat>,
}

impl RunConfig {
    pub fn resolve(overrides: Overrides) -> Result<Self, ConfigError> {
        Ok(Self {
            topology: match overrides.topology {
                Some(kind) => kind,
                None => optional_env("MINSPAN_TOPOLOGY")?
                    .map(|s| parse_value_enum(&s, "MINSPAN_TOPOLOGY"))
                    .transpose()?
                    .unwrap_or(TopologyKind::Linear),
            },
            nodes: match overrides.nodes {
                Some(n) => n,
                None => optional_env("MINSPAN_NODES")?
                    .map(|s| {
                        s.parse().map_err(|e| ConfigError::InvalidValue {
                            key: "MINSPAN_NODES".to_string(),
                            message: format!("must be a positive integer: {e}"),
                        })
                    })
                    .transpose()?
                    .unwrap_or(8),
            },
            seed: match overrides.seed {
                Some(seed) => seed,
                None => optional_env("MINSPAN_SEED")?
                    .map(|s| {
                        s.parse().map_err(|e| ConfigError::InvalidValue {
                            key: "MINSPAN_SEED".to_string(),
                            message: format!("must be an unsigned integer: {e}"),
                        })
                    })
                    .transpose()?
                    .unwrap_or(0),
            },
            verbose: overrides.verbose
                || optional_env("MINSPAN_VERBOSE")?
                    .map(|s| {
                        s.parse().map_err(|e| ConfigError::InvalidValue {
                            key: "MINSPAN_VERBOSE".to_string(),
                            message: format!("must be 'true' or 'false': {e}"),
                        })
                    })
                    .transpose()?
                    .unwrap_or(false),
            format: match overrides.format {
                Some(format) => format,
                None => optional_env("MINSPAN_FORMAT")?
                    .map(|s| parse_value_enum(&s, "MINSPAN_FORMAT"))
                    .transpose()?
                    .unwrap_or(OutputFormat::Text),
            },
        })
    }
}

fn parse_value_enum<T: ValueEnum>(value: &str, key: &str) -> Result<T, ConfigError> {
    T::from_str(value, true).map_err(|message| ConfigError::InvalidValue {
        key: key.to_string(),
        message,
    })
}

fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) if value.is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "not valid unicode".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_overrides_or_environment() {
        let config = RunConfig::resolve(Overrides::default()).expect("resolve");
        assert_eq!(config.topology, TopologyKind::Linear);
        assert_eq!(config.nodes, 8);
        assert_eq!(config.seed, 0);
        assert!(!config.verbose);
        assert_eq!(config.format, OutputFormat::Text);
    }

    #[test]
    fn command_line_overrides_win() {
        let config = RunConfig::resolve(Overrides {
            topology: Some(TopologyKind::Grid),
            nodes: Some(16),
            seed: Some(7),
            verbose: true,
            format: Some(OutputFormat::Json),
        })
        .expect("resolve");
        assert_eq!(config.topology, TopologyKind::Grid);
        assert_eq!(config.nodes, 16);
        assert_eq!(config.seed, 7);
        assert!(config.verbose);
        assert_eq!(config.format, OutputFormat::Json);
    }

    #[test]
    fn value_enum_parsing_reports_the_key() {
        let err = parse_value_enum::<TopologyKind>("ring", "MINSPAN_TOPOLOGY").unwrap_err();
        match err {
            ConfigError::InvalidValue { key, .. } => assert_eq!(key, "MINSPAN_TOPOLOGY"),
        }
    }
}
