use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
    pub version: u32,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub presets: BTreeMap<String, ChainPreset>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Defaults {
    pub preset: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainPreset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub effects: Vec<EffectStep>,
}

/// One effect invocation: a catalog name plus its positional arguments.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EffectStep {
    pub name: String,
    #[serde(default)]
    pub params: Vec<f32>,
}

impl ChainConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: ChainConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn preset(&self, name: &str) -> Option<&ChainPreset> {
        self.presets.get(name)
    }

    pub fn default_preset(&self) -> Option<&str> {
        self.defaults.preset.as_deref()
    }

    /// Picks `name` when given, else the configured default, else the only
    /// preset when there is exactly one.
    pub fn resolve(&self, name: Option<&str>) -> Result<(&str, &ChainPreset), ConfigError> {
        let wanted = match name.or(self.default_preset()) {
            Some(wanted) => wanted,
            None if self.presets.len() == 1 => self
                .presets
                .keys()
                .next()
                .map(String::as_str)
                .unwrap_or_default(),
            None => {
                return Err(ConfigError::Invalid(format!(
                    "no preset selected and no default; available: {}",
                    self.presets.keys().cloned().collect::<Vec<_>>().join(", ")
                )))
            }
        };
        self.presets
            .get_key_value(wanted)
            .map(|(key, preset)| (key.as_str(), preset))
            .ok_or_else(|| ConfigError::Invalid(format!("unknown preset '{wanted}'")))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        if self.presets.is_empty() {
            return Err(ConfigError::Invalid(
                "config must define at least one preset".into(),
            ));
        }

        for (name, preset) in &self.presets {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid("preset name may not be empty".into()));
            }

            if preset.effects.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "preset '{name}' must contain at least one effect"
                )));
            }

            for (index, step) in preset.effects.iter().enumerate() {
                if step.name.trim().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "preset '{name}' effect #{index} has an empty name"
                    )));
                }

                if let Some(value) = step.params.iter().find(|value| !value.is_finite()) {
                    return Err(ConfigError::Invalid(format!(
                        "preset '{name}' effect '{}' has a non-finite parameter {value}",
                        step.name
                    )));
                }
            }
        }

        if let Some(default_preset) = &self.defaults.preset {
            if !self.presets.contains_key(default_preset) {
                return Err(ConfigError::Invalid(format!(
                    "defaults.preset references unknown preset '{default_preset}'"
                )));
            }
        }

        Ok(())
    }
}

impl ChainPreset {
    pub fn steps(&self) -> impl Iterator<Item = (&str, &[f32])> + '_ {
        self.effects
            .iter()
            .map(|step| (step.name.trim(), step.params.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1

[defaults]
preset = "warm"

[presets.warm]
description = "Soft, slightly brighter and sepia toned"

[[presets.warm.effects]]
name = "blur"
params = [2]

[[presets.warm.effects]]
name = "brightness"
params = [0.1]

[[presets.warm.effects]]
name = "sepia"

[presets.edges]

[[presets.edges.effects]]
name = "detectEdges"
"#;

    #[test]
    fn parses_sample_config() {
        let config = ChainConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.version, 1);
        assert_eq!(config.default_preset(), Some("warm"));
        let warm = config.preset("warm").unwrap();
        let steps: Vec<_> = warm.steps().collect();
        assert_eq!(
            steps,
            vec![
                ("blur", &[2.0][..]),
                ("brightness", &[0.1][..]),
                ("sepia", &[][..]),
            ]
        );
        assert!(config.preset("edges").unwrap().description.is_none());
    }

    #[test]
    fn resolves_named_default_and_single_presets() {
        let config = ChainConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.resolve(None).unwrap().0, "warm");
        assert_eq!(config.resolve(Some("edges")).unwrap().0, "edges");
        assert!(matches!(config.resolve(Some("cold")), Err(ConfigError::Invalid(_))));

        let single = ChainConfig::from_toml_str(
            r#"
version = 1
[[presets.only.effects]]
name = "negative"
"#,
        )
        .unwrap();
        assert_eq!(single.resolve(None).unwrap().0, "only");
    }

    #[test]
    fn ambiguous_selection_is_rejected() {
        let config = ChainConfig::from_toml_str(
            r#"
version = 1
[[presets.a.effects]]
name = "negative"
[[presets.b.effects]]
name = "sepia"
"#,
        )
        .unwrap();
        let err = config.resolve(None).unwrap_err();
        assert!(err.to_string().contains("a, b"), "{err}");
    }

    #[test]
    fn rejects_unknown_default() {
        let config = r#"
version = 1

[defaults]
preset = "missing"

[[presets.main.effects]]
name = "sepia"
"#;
        let err = ChainConfig::from_toml_str(config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_empty_preset_and_names() {
        let empty = r#"
version = 1
[presets.main]
description = "nothing here"
"#;
        assert!(matches!(
            ChainConfig::from_toml_str(empty),
            Err(ConfigError::Invalid(_))
        ));

        let unnamed = r#"
version = 1
[[presets.main.effects]]
name = "  "
"#;
        assert!(matches!(
            ChainConfig::from_toml_str(unnamed),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_wrong_version_and_bad_toml() {
        let err = ChainConfig::from_toml_str(
            r#"
version = 2
[[presets.main.effects]]
name = "sepia"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("version 2"));

        let err = ChainConfig::from_toml_str("version = [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_non_finite_params() {
        let config = r#"
version = 1
[[presets.main.effects]]
name = "brightness"
params = [nan]
"#;
        let err = ChainConfig::from_toml_str(config).unwrap_err();
        assert!(err.to_string().contains("non-finite"), "{err}");
    }
}
