use serde::{Deserialize, Serialize};

/// Limits applied while parsing and rendering.
///
/// Every field has a default, so a partial TOML table such as
/// `max_steps = 100000` is a complete configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Deepest allowed nesting of `if`/`range` blocks.
    pub max_depth: usize,
    /// Ceiling on node visits plus function calls per render; unlimited
    /// when unset.
    pub max_steps: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: 128,
            max_steps: None,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_the_default() {
        assert_eq!(EngineConfig::from_toml_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = EngineConfig::from_toml_str("max_steps = 5000\n").unwrap();
        assert_eq!(config.max_steps, Some(5000));
        assert_eq!(config.max_depth, 128);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(EngineConfig::from_toml_str("max_nodes = 1\n").is_err());
    }
}
