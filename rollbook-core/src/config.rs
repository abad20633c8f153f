//! Configuration for upload limits, phone normalization and header aliases

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::headers::{AliasTable, Field, Target};

const MIB: u64 = 1024 * 1024;

/// Main ingestion configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default)]
    pub scores: ScoresConfig,
    #[serde(default)]
    pub students: StudentsConfig,
    #[serde(default)]
    pub aliases: AliasConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoresConfig {
    pub max_upload_bytes: u64,
}

impl Default for ScoresConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 10 * MIB,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StudentsConfig {
    pub max_upload_bytes: u64,
    /// Digits prepended as `+<code>` to normalized parent phones
    pub phone_country_code: String,
}

impl Default for StudentsConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 20 * MIB,
            phone_country_code: "91".to_string(),
        }
    }
}

/// Extra header spellings, keyed by canonical field name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AliasConfig {
    #[serde(default)]
    pub scores: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub students: BTreeMap<String, Vec<String>>,
}

impl AliasConfig {
    fn section(&self, target: Target) -> &BTreeMap<String, Vec<String>> {
        match target {
            Target::Scores => &self.scores,
            Target::Students => &self.students,
        }
    }
}

impl IngestConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: IngestConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Reject limits, country codes and alias sections that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.scores.max_upload_bytes == 0 || self.students.max_upload_bytes == 0 {
            anyhow::bail!("Configuration error: max_upload_bytes must be greater than zero");
        }

        let code = &self.students.phone_country_code;
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
            anyhow::bail!(
                "Configuration error: phone_country_code '{}' must be digits only",
                code
            );
        }

        for target in [Target::Scores, Target::Students] {
            let mut table = AliasTable::defaults(target);
            for (canonical, spellings) in self.aliases.section(target) {
                let Some(field) = Field::from_canonical(target, canonical) else {
                    anyhow::bail!(
                        "Configuration error: Unknown field '{}' in [aliases.{}]",
                        canonical,
                        target.as_str()
                    );
                };
                for spelling in spellings {
                    if let Some(other) = table.resolve(spelling)
                        && other != field
                    {
                        anyhow::bail!(
                            "Configuration error: '{}' in [aliases.{}] already means '{}'",
                            spelling,
                            target.as_str(),
                            other
                        );
                    }
                }
                table = table.extend(field, spellings);
            }
        }

        Ok(())
    }

    /// Default aliases for a target merged with the configured extras
    pub fn alias_table(&self, target: Target) -> AliasTable {
        self.aliases
            .section(target)
            .iter()
            .filter_map(|(canonical, spellings)| {
                Field::from_canonical(target, canonical).map(|field| (field, spellings))
            })
            .fold(AliasTable::defaults(target), |table, (field, spellings)| {
                table.extend(field, spellings)
            })
    }

    pub fn max_upload_bytes(&self, target: Target) -> u64 {
        match target {
            Target::Scores => self.scores.max_upload_bytes,
            Target::Students => self.students.max_upload_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = IngestConfig::default();
        assert_eq!(config.scores.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.students.max_upload_bytes, 20 * 1024 * 1024);
        assert_eq!(config.students.phone_country_code, "91");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial_sections() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(
            file,
            r#"
[students]
phone_country_code = "44"

[aliases.scores]
roll_number = ["Admission No", "adm"]
subject = ["paper"]
"#
        )?;

        let config = IngestConfig::from_file(file.path())?;
        config.validate()?;
        assert_eq!(config.students.phone_country_code, "44");
        assert_eq!(config.students.max_upload_bytes, 20 * 1024 * 1024);
        assert_eq!(config.scores.max_upload_bytes, 10 * 1024 * 1024);

        let aliases = config.alias_table(Target::Scores);
        assert_eq!(aliases.resolve("ADM"), Some(Field::RollNumber));
        assert_eq!(aliases.resolve("admission_no"), Some(Field::RollNumber));
        assert_eq!(aliases.resolve("Paper"), Some(Field::Subject));
        // Defaults survive
        assert_eq!(aliases.resolve("roll"), Some(Field::RollNumber));
        Ok(())
    }

    #[test]
    fn test_validation() {
        // Unknown canonical field
        let mut bad_config = IngestConfig::default();
        bad_config
            .aliases
            .scores
            .insert("house".to_string(), vec!["team".to_string()]);
        assert!(bad_config.validate().is_err());

        // Spelling already taken by another field
        let mut bad_config = IngestConfig::default();
        bad_config
            .aliases
            .students
            .insert("house".to_string(), vec!["Class".to_string()]);
        assert!(bad_config.validate().is_err());

        // Country code with a plus sign
        let mut bad_config = IngestConfig::default();
        bad_config.students.phone_country_code = "+91".to_string();
        assert!(bad_config.validate().is_err());

        let mut bad_config = IngestConfig::default();
        bad_config.scores.max_upload_bytes = 0;
        assert!(bad_config.validate().is_err());

        // Re-listing a default spelling for the same field is fine
        let mut config = IngestConfig::default();
        config
            .aliases
            .students
            .insert("roll_number".to_string(), vec!["roll".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_missing() {
        assert!(IngestConfig::from_file("/nonexistent/rollbook.toml").is_err());
    }
}
