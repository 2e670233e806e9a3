use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::context::EvaluationContext;
use crate::flag::FlagDefinition;
use crate::overrides::{OverrideLayer, OverrideSet};

/// Evaluate a flag for the specified [EvaluationContext].
///
/// Overrides are consulted one layer at a time in [OverrideLayer::PRECEDENCE] order and the first
/// layer with an override for the context decides the result:
///
/// 1. the override for the context's user id, if any;
/// 2. the override for the first of the context's groups that has one, in the order the groups
///    were given;
/// 3. the override for the context's region, if any.
///
/// If none applies, the flag's global value is returned with [Reason::Default].
///
/// Evaluation has no side effects and cannot fail. An absent context field, an empty group list,
/// or an empty user id or region simply skips the corresponding layer.
pub fn evaluate(
    flag: &FlagDefinition,
    overrides: &OverrideSet,
    context: &EvaluationContext,
) -> EvaluationResult {
    let result = OverrideLayer::PRECEDENCE
        .iter()
        .find_map(|layer| {
            layer
                .matching_override(overrides, context)
                .map(|enabled| EvaluationResult::new(enabled, layer.into()))
        })
        .unwrap_or_else(|| EvaluationResult::new(flag.global_enabled, Reason::Default));

    debug!(
        "evaluated flag {} to {} ({})",
        flag.key, result.enabled, result.reason
    );
    result
}

impl OverrideLayer {
    fn matching_override(
        &self,
        overrides: &OverrideSet,
        context: &EvaluationContext,
    ) -> Option<bool> {
        match self {
            OverrideLayer::User => context
                .user_id()
                .and_then(|user_id| overrides.get(OverrideLayer::User, user_id)),
            // Groups without an entry are skipped, not treated as a miss for the whole layer.
            OverrideLayer::Group => context
                .groups()
                .iter()
                .find_map(|group| overrides.get(OverrideLayer::Group, group)),
            OverrideLayer::Region => context
                .region()
                .and_then(|region| overrides.get(OverrideLayer::Region, region)),
        }
    }
}

/// An EvaluationResult is returned from [evaluate], combining the value of a flag with an
/// explanation of how it was calculated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct EvaluationResult {
    /// Whether the flag is enabled for the evaluated context.
    pub enabled: bool,

    /// The layer that produced [EvaluationResult::enabled].
    pub reason: Reason,
}

impl EvaluationResult {
    pub fn new(enabled: bool, reason: Reason) -> Self {
        Self { enabled, reason }
    }
}

/// Reason describes which precedence layer produced an evaluation result.
///
/// The reason always names the layer that actually decided, even when a lower layer would have
/// produced the same value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// UserOverride indicates that the context's user id had an override.
    UserOverride,
    /// GroupOverride indicates that one of the context's groups had an override.
    GroupOverride,
    /// RegionOverride indicates that the context's region had an override.
    RegionOverride,
    /// Default indicates that no override applied and the flag's global value was used.
    Default,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::UserOverride => "user_override",
            Reason::GroupOverride => "group_override",
            Reason::RegionOverride => "region_override",
            Reason::Default => "default",
        }
    }

    /// Returns the override layer responsible for this reason, or None for [Reason::Default].
    pub fn layer(&self) -> Option<OverrideLayer> {
        match self {
            Reason::UserOverride => Some(OverrideLayer::User),
            Reason::GroupOverride => Some(OverrideLayer::Group),
            Reason::RegionOverride => Some(OverrideLayer::Region),
            Reason::Default => None,
        }
    }
}

impl From<&OverrideLayer> for Reason {
    fn from(layer: &OverrideLayer) -> Self {
        match layer {
            OverrideLayer::User => Reason::UserOverride,
            OverrideLayer::Group => Reason::GroupOverride,
            OverrideLayer::Region => Reason::RegionOverride,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
