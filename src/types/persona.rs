use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Who the user is and what world the bot plays in.
///
/// Supplied once before the chat starts.  A session refuses to start until
/// every field is non-empty, and the session never hands out a mutable
/// reference afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// The user's display name.
    pub user_name: String,

    /// Named rivals of the persona, without duplicates, in first-seen order.
    #[serde(deserialize_with = "deserialize_adversaries")]
    pub adversaries: Vec<String>,

    /// The place or domain the persona belongs to.
    pub domain: String,
}

impl PersonaConfig {
    /// Create a new `PersonaConfig`.
    pub fn new(
        user_name: impl Into<String>,
        adversaries: impl IntoIterator<Item = impl Into<String>>,
        domain: impl Into<String>,
    ) -> Self {
        let adversaries = dedup(adversaries.into_iter().map(Into::into));
        Self {
            user_name: user_name.into().trim().to_string(),
            adversaries,
            domain: domain.into().trim().to_string(),
        }
    }

    /// Load a persona from a YAML file.
    ///
    /// `adversaries` may be a YAML list or one comma-separated string.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| {
            Error::io(format!("failed to read persona file {}", path.display()), err)
        })?;
        let persona: Self = serde_yaml::from_str(&content)?;
        Ok(Self::new(persona.user_name, persona.adversaries, persona.domain))
    }

    /// Check that the chat may start with this persona.
    pub fn validate(&self) -> Result<()> {
        if self.user_name.trim().is_empty() {
            return Err(Error::validation(
                "a user name is required before the chat can start",
                Some("user_name".to_string()),
            ));
        }
        if self.adversaries.is_empty() {
            return Err(Error::validation(
                "at least one adversary is required before the chat can start",
                Some("adversaries".to_string()),
            ));
        }
        if self.domain.trim().is_empty() {
            return Err(Error::validation(
                "a domain is required before the chat can start",
                Some("domain".to_string()),
            ));
        }
        Ok(())
    }

    /// Returns true if every field is filled in.
    pub fn is_complete(&self) -> bool {
        self.validate().is_ok()
    }

    /// The adversaries joined for display and prompting.
    pub fn adversary_list(&self) -> String {
        self.adversaries.join(", ")
    }
}

/// Split a comma-separated adversary list.
///
/// Entries are trimmed; empty entries and repeats are dropped.
pub fn parse_adversaries(input: &str) -> Vec<String> {
    dedup(input.split(',').map(str::to_string))
}

fn dedup(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let item = item.trim();
        if !item.is_empty() && !out.iter().any(|seen| seen == item) {
            out.push(item.to_string());
        }
    }
    out
}

fn deserialize_adversaries<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Adversaries {
        List(Vec<String>),
        Joined(String),
    }

    Ok(match Adversaries::deserialize(deserializer)? {
        Adversaries::List(list) => dedup(list.into_iter()),
        Adversaries::Joined(joined) => parse_adversaries(&joined),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_adversaries_trims_and_dedups() {
        assert_eq!(
            parse_adversaries(" Jets, Sharks,,Jets ,  "),
            vec!["Jets".to_string(), "Sharks".to_string()]
        );
        assert!(parse_adversaries(" , ,").is_empty());
    }

    #[test]
    fn complete_persona_validates() {
        let persona = PersonaConfig::new("Ada", ["Babbage"], "London");
        assert!(persona.validate().is_ok());
        assert!(persona.is_complete());
        assert_eq!(persona.adversary_list(), "Babbage");
    }

    #[test]
    fn each_missing_field_blocks_the_chat() {
        let cases = [
            (PersonaConfig::new("  ", ["x"], "d"), "user_name"),
            (PersonaConfig::new("u", Vec::<String>::new(), "d"), "adversaries"),
            (PersonaConfig::new("u", ["x"], ""), "domain"),
        ];
        for (persona, field) in cases {
            match persona.validate() {
                Err(Error::Validation { param, .. }) => {
                    assert_eq!(param.as_deref(), Some(field));
                }
                other => panic!("expected validation error for {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn yaml_accepts_list_or_joined_string() {
        let list: PersonaConfig =
            serde_yaml::from_str("user_name: Ada\nadversaries: [Jets, Sharks]\ndomain: Westside\n")
                .unwrap();
        let joined: PersonaConfig =
            serde_yaml::from_str("user_name: Ada\nadversaries: \"Jets, Sharks\"\ndomain: Westside\n")
                .unwrap();
        assert_eq!(list, joined);
        assert_eq!(list.adversaries, vec!["Jets", "Sharks"]);
    }

    #[test]
    fn from_file_trims_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "user_name: \"  Ada \"\nadversaries: Jets\ndomain: Westside").unwrap();
        let persona = PersonaConfig::from_file(file.path()).unwrap();
        assert_eq!(persona.user_name, "Ada");
        assert_eq!(persona.adversaries, vec!["Jets"]);
    }

    #[test]
    fn from_file_missing_is_io_error() {
        let err = PersonaConfig::from_file("/nonexistent/persona.yaml").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
