use serde::{Deserialize, Serialize};

/// EvaluationContext describes the caller a flag is being evaluated for.
///
/// Every field is optional. A field that is absent simply takes no part in evaluation; see
/// [crate::evaluate] for how each field is consulted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Groups the caller belongs to. The order is significant: when several groups have an
    /// override, the first one in this list decides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl EvaluationContext {
    /// Returns a context with no fields set. Evaluating it always yields the flag's global value.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub(crate) fn user_id(&self) -> Option<&str> {
        non_empty(self.user_id.as_deref())
    }

    pub(crate) fn groups(&self) -> &[String] {
        self.groups.as_deref().unwrap_or_default()
    }

    pub(crate) fn region(&self) -> Option<&str> {
        non_empty(self.region.as_deref())
    }
}

// An empty user id or region identifies nobody.
fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

/// Contains methods for building an [EvaluationContext].
///
/// If you do not set any values, the context built is equivalent to
/// [EvaluationContext::anonymous].
#[derive(Clone, Debug, Default)]
pub struct ContextBuilder {
    user_id: Option<String>,
    groups: Option<Vec<String>>,
    region: Option<String>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the id of the user being evaluated.
    pub fn user_id(&mut self, user_id: impl Into<String>) -> &mut Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Appends a group to the context's group list.
    ///
    /// Groups keep the order in which they are added. Duplicates are kept as given.
    pub fn group(&mut self, group: impl Into<String>) -> &mut Self {
        self.groups.get_or_insert_with(Vec::new).push(group.into());
        self
    }

    /// Replaces the context's group list.
    pub fn groups<I, S>(&mut self, groups: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = Some(groups.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the region the caller is in.
    pub fn region(&mut self, region: impl Into<String>) -> &mut Self {
        self.region = Some(region.into());
        self
    }

    pub fn build(&self) -> EvaluationContext {
        EvaluationContext {
            user_id: self.user_id.clone(),
            groups: self.groups.clone(),
            region: self.region.clone(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use spectral::prelude::*;
    use test_case::test_case;

    #[test]
    fn builder_defaults_to_anonymous() {
        assert_that!(ContextBuilder::new().build()).is_equal_to(EvaluationContext::anonymous());
    }

    #[test]
    fn builder_keeps_group_order_and_duplicates() {
        let context = ContextBuilder::new()
            .user_id("u1")
            .group("beta")
            .group("alpha")
            .group("beta")
            .region("eu")
            .build();

        assert_that!(context.user_id()).contains_value("u1");
        assert_that!(context.groups().to_vec()).is_equal_to(vec![
            "beta".to_string(),
            "alpha".to_string(),
            "beta".to_string(),
        ]);
        assert_that!(context.region()).contains_value("eu");
    }

    #[test]
    fn groups_replaces_previous_groups() {
        let context = ContextBuilder::new()
            .group("first")
            .groups(["second", "third"])
            .build();
        assert_that!(context.groups().to_vec())
            .is_equal_to(vec!["second".to_string(), "third".to_string()]);
    }

    #[test_case(None; "absent")]
    #[test_case(Some(""); "empty")]
    fn blank_user_id_is_ignored(user_id: Option<&str>) {
        let context = EvaluationContext {
            user_id: user_id.map(String::from),
            ..Default::default()
        };
        assert_that!(context.user_id()).is_none();
    }

    #[test]
    fn deserializes_partial_payload() {
        let context: EvaluationContext =
            serde_json::from_str(r#"{"groups": ["beta-testers", "employees"]}"#).unwrap();
        assert_that!(context.user_id).is_none();
        assert_that!(context.region).is_none();
        assert_that!(context.groups().len()).is_equal_to(2);
    }

    #[test]
    fn serialization_omits_absent_fields() {
        let context = ContextBuilder::new().region("eu").build();
        assert_json_diff::assert_json_eq!(
            serde_json::to_value(&context).unwrap(),
            serde_json::json!({"region": "eu"})
        );
    }
}
