//! Local checks that gate a planned action.
//!
//! Exactly two forms are understood: `app_is:<package>` and
//! `element_visible:<text>`. Both are substring matches. Anything else is
//! treated as unmet.

use crate::device::DeviceState;

/// A parsed precondition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    AppIs(String),
    ElementVisible(String),
    Unsupported(String),
}

impl Precondition {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(pkg) = raw.strip_prefix("app_is:") {
            Precondition::AppIs(pkg.trim().to_string())
        } else if let Some(text) = raw.strip_prefix("element_visible:") {
            Precondition::ElementVisible(text.trim().to_string())
        } else {
            Precondition::Unsupported(raw.to_string())
        }
    }

    /// Evaluate against the state captured this cycle.
    pub fn is_met(&self, state: &DeviceState) -> bool {
        match self {
            Precondition::AppIs(pkg) => state.foreground_package.contains(pkg.as_str()),
            Precondition::ElementVisible(text) => state.tree.any_text_contains(text),
            Precondition::Unsupported(raw) => {
                tracing::warn!(precondition = %raw, "Unsupported precondition");
                false
            }
        }
    }
}

/// Evaluate an optional raw precondition; absent means met.
pub fn check(raw: Option<&str>, state: &DeviceState) -> bool {
    raw.map_or(true, |r| Precondition::parse(r).is_met(state))
}
