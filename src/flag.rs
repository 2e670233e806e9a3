use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use log::warn;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

lazy_static! {
    static ref FLAG_KEY_REGEX: Regex = Regex::new(r"^[a-z0-9][a-z0-9-]*[a-z0-9]$").unwrap();
}

/// Returns true if `key` is acceptable as the key of a newly created flag.
///
/// Keys are lowercase alphanumerics and hyphens, at least two characters long, and may not start
/// or end with a hyphen, e.g. "dark-mode".
pub fn is_valid_flag_key(key: &str) -> bool {
    FLAG_KEY_REGEX.is_match(key)
}

/// InvalidFlagKey is returned when a new flag's key does not satisfy [is_valid_flag_key].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("invalid feature flag key \"{key}\": keys are lowercase alphanumerics and hyphens, e.g. \"dark-mode\"")]
pub struct InvalidFlagKey {
    pub key: String,
}

/// FlagDefinition is the stored state of a boolean feature flag, independent of any overrides.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagDefinition {
    /// The unique, immutable identifier of the flag. It is the only identity shared by the cache,
    /// the override sets and evaluation.
    pub key: String,

    /// The value returned when no override applies to a context.
    #[serde(alias = "isEnabled")]
    pub global_enabled: bool,
}

impl FlagDefinition {
    /// Creates a definition without validating `key`.
    ///
    /// This is the constructor for definitions that already exist in storage. New flags should go
    /// through [FlagDefinition::try_new].
    pub fn new(key: impl Into<String>, global_enabled: bool) -> Self {
        Self {
            key: key.into(),
            global_enabled,
        }
    }

    /// Creates a definition for a new flag, failing if `key` does not satisfy
    /// [is_valid_flag_key].
    pub fn try_new(key: impl Into<String>, global_enabled: bool) -> Result<Self, InvalidFlagKey> {
        let key = key.into();
        if !is_valid_flag_key(&key) {
            warn!("rejecting invalid flag key {:?}", key);
            return Err(InvalidFlagKey { key });
        }
        Ok(Self::new(key, global_enabled))
    }
}

/// FlagRecord is a flag as kept in storage: its definition plus administrative metadata that
/// plays no part in evaluation.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagRecord {
    #[serde(flatten)]
    pub definition: FlagDefinition,

    /// Free-form text explaining what the flag controls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl FlagRecord {
    pub fn key(&self) -> &str {
        &self.definition.key
    }
}

/// FlagUpdate lists the fields of a [FlagRecord] an administrative update changes. Fields left
/// as None keep their stored value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagUpdate {
    #[serde(default, alias = "isEnabled")]
    pub global_enabled: Option<bool>,
    #[serde(default)]
    pub description: Option<String>,
}

impl FlagUpdate {
    pub fn global_enabled(mut self, global_enabled: bool) -> Self {
        self.global_enabled = Some(global_enabled);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Writes the fields that are set onto `record`.
    pub fn apply_to(&self, record: &mut FlagRecord) {
        if let Some(global_enabled) = self.global_enabled {
            record.definition.global_enabled = global_enabled;
        }
        if let Some(description) = &self.description {
            record.description = Some(description.clone());
        }
    }
}

#[cfg(test)]
pub(crate) mod proptest_generators {
    use proptest::prelude::*;

    prop_compose! {
        pub(crate) fn any_flag_key()(s in "[a-z0-9][a-z0-9-]{0,30}[a-z0-9]") -> String {
            s
        }
    }
}

#[cfg(test)]
mod tests {
    use super::proptest_generators::*;
    use super::*;
    use chrono::TimeZone;
    use proptest::proptest;
    use spectral::prelude::*;
    use test_case::test_case;

    #[test_case("dark-mode")]
    #[test_case("a1")]
    #[test_case("new-checkout-2")]
    #[test_case("00")]
    fn valid_flag_keys(key: &str) {
        assert!(is_valid_flag_key(key));
    }

    #[test_case(""; "empty")]
    #[test_case("a"; "single character")]
    #[test_case("-dark-mode"; "leading hyphen")]
    #[test_case("dark-mode-"; "trailing hyphen")]
    #[test_case("Dark-Mode"; "uppercase")]
    #[test_case("dark_mode"; "underscore")]
    #[test_case("dark mode"; "whitespace")]
    fn invalid_flag_keys(key: &str) {
        assert!(!is_valid_flag_key(key));
    }

    proptest! {
        #[test]
        fn all_generated_keys_are_valid(key in any_flag_key()) {
            assert!(FlagDefinition::try_new(key, true).is_ok());
        }
    }

    #[test]
    fn try_new_returns_rejected_key() {
        assert_that!(FlagDefinition::try_new("Not Valid", false)).is_err_containing(
            InvalidFlagKey {
                key: "Not Valid".to_string(),
            },
        );
    }

    #[test]
    fn invalid_key_message_names_key() {
        let err = FlagDefinition::try_new("Dark_Mode", true).unwrap_err();
        assert_that!(err.to_string()).starts_with("invalid feature flag key \"Dark_Mode\"");
    }

    fn record(description: Option<&str>) -> FlagRecord {
        FlagRecord {
            definition: FlagDefinition::new("dark-mode", false),
            description: description.map(String::from),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn update_only_touches_set_fields() {
        let mut flag = record(Some("Dark theme"));
        FlagUpdate::default().global_enabled(true).apply_to(&mut flag);
        assert_that!(flag.definition.global_enabled).is_true();
        assert_that!(flag.description.as_deref()).contains_value("Dark theme");

        FlagUpdate::default()
            .description("Dark theme for the web app")
            .apply_to(&mut flag);
        assert_that!(flag.definition.global_enabled).is_true();
        assert_that!(flag.description.as_deref()).contains_value("Dark theme for the web app");
    }

    #[test]
    fn update_deserializes_partial_payload() {
        let update: FlagUpdate = serde_json::from_str(r#"{"isEnabled": true}"#).unwrap();
        assert_that!(update).is_equal_to(FlagUpdate::default().global_enabled(true));
    }

    #[test]
    fn record_serialization_flattens_definition() {
        assert_json_diff::assert_json_eq!(
            serde_json::to_value(record(Some("Dark theme"))).unwrap(),
            serde_json::json!({
                "key": "dark-mode",
                "globalEnabled": false,
                "description": "Dark theme",
                "createdAt": "2024-01-01T00:00:00Z"
            })
        );
        assert_json_diff::assert_json_eq!(
            serde_json::to_value(record(None)).unwrap(),
            serde_json::json!({
                "key": "dark-mode",
                "globalEnabled": false,
                "createdAt": "2024-01-01T00:00:00Z"
            })
        );
    }

    #[test]
    fn deserializes_legacy_enabled_field() {
        let flag: FlagDefinition =
            serde_json::from_str(r#"{"key": "dark-mode", "isEnabled": true}"#).unwrap();
        assert_eq!(flag, FlagDefinition::new("dark-mode", true));
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let json = serde_json::to_value(FlagDefinition::new("dark-mode", false)).unwrap();
        assert_json_diff::assert_json_eq!(
            json,
            serde_json::json!({"key": "dark-mode", "globalEnabled": false})
        );
    }
}
