use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// OverrideLayer identifies one of the per-identity override maps of an [OverrideSet].
///
/// The layers are listed in evaluation precedence: a user override beats a group override, which
/// beats a region override.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum OverrideLayer {
    /// Overrides keyed by user id.
    User,
    /// Overrides keyed by group name.
    Group,
    /// Overrides keyed by region.
    Region,
}

impl OverrideLayer {
    /// All layers, highest precedence first.
    pub const PRECEDENCE: [OverrideLayer; 3] =
        [OverrideLayer::User, OverrideLayer::Group, OverrideLayer::Region];

    pub fn as_str(&self) -> &'static str {
        match self {
            OverrideLayer::User => "user",
            OverrideLayer::Group => "group",
            OverrideLayer::Region => "region",
        }
    }
}

impl fmt::Display for OverrideLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OverrideSet holds every override configured for a single flag.
///
/// Each map is keyed by the identity it applies to. The absence of an entry means there is no
/// override for that identity at that layer. A serialized set may omit any of its maps, which is
/// equivalent to the map being empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideSet {
    #[serde(default)]
    pub user_overrides: HashMap<String, bool>,
    #[serde(default)]
    pub group_overrides: HashMap<String, bool>,
    #[serde(default)]
    pub region_overrides: HashMap<String, bool>,
}

impl OverrideSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the override map for `layer`.
    pub fn layer(&self, layer: OverrideLayer) -> &HashMap<String, bool> {
        match layer {
            OverrideLayer::User => &self.user_overrides,
            OverrideLayer::Group => &self.group_overrides,
            OverrideLayer::Region => &self.region_overrides,
        }
    }

    fn layer_mut(&mut self, layer: OverrideLayer) -> &mut HashMap<String, bool> {
        match layer {
            OverrideLayer::User => &mut self.user_overrides,
            OverrideLayer::Group => &mut self.group_overrides,
            OverrideLayer::Region => &mut self.region_overrides,
        }
    }

    /// Looks up the override for `identity` at `layer`. Matching is exact, with no normalization
    /// of case or whitespace.
    pub fn get(&self, layer: OverrideLayer, identity: &str) -> Option<bool> {
        self.layer(layer).get(identity).copied()
    }

    /// Inserts or replaces the override for `identity` at `layer`, returning the previous value.
    pub fn upsert(
        &mut self,
        layer: OverrideLayer,
        identity: impl Into<String>,
        enabled: bool,
    ) -> Option<bool> {
        self.layer_mut(layer).insert(identity.into(), enabled)
    }

    /// Removes the override for `identity` at `layer`, returning its value if there was one.
    pub fn remove(&mut self, layer: OverrideLayer, identity: &str) -> Option<bool> {
        self.layer_mut(layer).remove(identity)
    }

    /// Sets a user override, consuming and returning the set. Handy for building fixtures.
    pub fn with_user(mut self, user_id: impl Into<String>, enabled: bool) -> Self {
        self.upsert(OverrideLayer::User, user_id, enabled);
        self
    }

    /// Sets a group override, consuming and returning the set.
    pub fn with_group(mut self, group: impl Into<String>, enabled: bool) -> Self {
        self.upsert(OverrideLayer::Group, group, enabled);
        self
    }

    /// Sets a region override, consuming and returning the set.
    pub fn with_region(mut self, region: impl Into<String>, enabled: bool) -> Self {
        self.upsert(OverrideLayer::Region, region, enabled);
        self
    }

    /// Returns true if no layer has any override.
    pub fn is_empty(&self) -> bool {
        OverrideLayer::PRECEDENCE
            .iter()
            .all(|layer| self.layer(*layer).is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::hashmap;
    use proptest::prelude::*;
    use spectral::prelude::*;

    #[test]
    fn missing_maps_deserialize_as_empty() {
        let overrides: OverrideSet =
            serde_json::from_str(r#"{"userOverrides": {"u1": true}, "groupOverrides": {}}"#)
                .unwrap();
        assert_that!(overrides.user_overrides).is_equal_to(hashmap! {"u1".to_string() => true});
        assert_that!(overrides.region_overrides.is_empty()).is_true();

        let overrides: OverrideSet = serde_json::from_str("{}").unwrap();
        assert_that!(overrides.is_empty()).is_true();
    }

    #[test]
    fn upsert_replaces_existing_value() {
        let mut overrides = OverrideSet::new();
        assert_that!(overrides.upsert(OverrideLayer::Group, "beta", true)).is_none();
        assert_that!(overrides.upsert(OverrideLayer::Group, "beta", false)).contains_value(true);
        assert_that!(overrides.get(OverrideLayer::Group, "beta")).contains_value(false);
        assert_that!(overrides.group_overrides).has_length(1);
    }

    #[test]
    fn layers_are_independent() {
        let overrides = OverrideSet::new()
            .with_user("eu", true)
            .with_region("eu", false);

        assert_that!(overrides.get(OverrideLayer::User, "eu")).contains_value(true);
        assert_that!(overrides.get(OverrideLayer::Group, "eu")).is_none();
        assert_that!(overrides.get(OverrideLayer::Region, "eu")).contains_value(false);
    }

    #[test]
    fn lookups_are_case_sensitive() {
        let overrides = OverrideSet::new().with_group("Beta", true);
        assert_that!(overrides.get(OverrideLayer::Group, "beta")).is_none();
        assert_that!(overrides.get(OverrideLayer::Group, "Beta")).contains_value(true);
    }

    #[test]
    fn layer_serializes_as_snake_case() {
        assert_eq!(
            serde_json::to_string(&OverrideLayer::Region).unwrap(),
            r#""region""#
        );
        assert_eq!(OverrideLayer::Group.to_string(), "group");
    }

    proptest! {
        #[test]
        fn remove_undoes_upsert(
            layer in any::<OverrideLayer>(),
            identity in "[a-z0-9-]{1,12}",
            enabled in any::<bool>()
        ) {
            let mut overrides = OverrideSet::new();
            overrides.upsert(layer, identity.clone(), enabled);
            prop_assert_eq!(overrides.get(layer, &identity), Some(enabled));
            prop_assert_eq!(overrides.remove(layer, &identity), Some(enabled));
            prop_assert!(overrides.is_empty());
        }
    }
}
