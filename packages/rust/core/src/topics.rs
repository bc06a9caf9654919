//! Topic bank: the YAML file that steers each week's content.

use std::path::Path;

use serde::Deserialize;

use weeklypack_shared::{Result, WeeklyPackError};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Persona {
    pub name: String,
    pub outcome: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopicConfig {
    #[serde(default)]
    pub niche: String,
    #[serde(default)]
    pub personas: Vec<Persona>,
    #[serde(default)]
    pub content_angles: Vec<String>,
    #[serde(default)]
    pub weekly_variation_rules: Vec<String>,
    #[serde(default)]
    pub long_tail_queries: Vec<String>,
}

impl TopicConfig {
    /// Parse and validate YAML text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)
            .map_err(|e| WeeklyPackError::parse(format!("topic bank: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the topic bank from disk. A missing file is a configuration error.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                WeeklyPackError::config(format!("topic bank not found at {}", path.display()))
            } else {
                WeeklyPackError::io(path, e)
            }
        })?;
        Self::from_yaml(&text)
    }

    /// Only the fields generation actually reads are checked.
    pub fn validate(&self) -> Result<()> {
        if self.niche.trim().is_empty() {
            return Err(WeeklyPackError::validation("topic bank: niche is empty"));
        }
        if self.personas.is_empty() {
            return Err(WeeklyPackError::validation(
                "topic bank: at least one persona is required",
            ));
        }
        Ok(())
    }

    /// The persona the pack is written for.
    pub fn primary_persona(&self) -> Option<&Persona> {
        self.personas.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BANK: &str = r#"
niche: Example Niche
personas:
  - name: Solo maker
    outcome: rank listings without an agency
content_angles: [speed, clarity]
weekly_variation_rules:
  - rotate one angle per week
long_tail_queries:
  - example query
"#;

    #[test]
    fn parses_full_bank() {
        let bank = TopicConfig::from_yaml(BANK).unwrap();
        assert_eq!(bank.niche, "Example Niche");
        assert_eq!(bank.primary_persona().unwrap().name, "Solo maker");
        assert_eq!(bank.content_angles, ["speed", "clarity"]);
        assert_eq!(bank.long_tail_queries, ["example query"]);
    }

    #[test]
    fn optional_lists_default_to_empty() {
        let bank = TopicConfig::from_yaml(
            "niche: N\npersonas:\n  - name: A\n    outcome: B\n",
        )
        .unwrap();
        assert!(bank.long_tail_queries.is_empty());
        assert!(bank.content_angles.is_empty());
    }

    #[test]
    fn rejects_missing_persona_or_niche() {
        let err = TopicConfig::from_yaml("niche: N\n").unwrap_err();
        assert!(err.to_string().contains("persona"));

        let err = TopicConfig::from_yaml("personas:\n  - name: A\n    outcome: B\n").unwrap_err();
        assert!(err.to_string().contains("niche"));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = TopicConfig::load(Path::new("/nonexistent/topic_bank.yaml")).unwrap_err();
        assert!(matches!(err, WeeklyPackError::Config { .. }));
    }

    #[test]
    fn shipped_bank_is_valid() {
        TopicConfig::load(Path::new("../../../data/topic_bank.yaml")).unwrap();
    }
}
