//! Resolution state carried by every tree node.

use serde::{Deserialize, Serialize};

/// The resolution state of a node.
///
/// # Step Semantics
///
/// Nodes are re-evaluated once per step rather than run to completion:
/// - `Ready` is the initial state and the state every node returns to on reset
/// - `Running` is the only state that persists across steps without input
/// - `Succeeded` and `Failed` are terminal until the next reset
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum State {
    /// The node has not been activated since its last reset.
    #[default]
    Ready,

    /// The node is active and has outstanding work.
    Running,

    /// The node resolved successfully.
    ///
    /// For conditions: the predicate returned `true`.
    /// For actions: the action reported success.
    Succeeded,

    /// The node resolved unsuccessfully.
    ///
    /// For conditions: the predicate returned `false`.
    /// For actions: the action reported failure.
    Failed,
}

impl State {
    /// Returns `true` if this state is `Succeeded`.
    #[inline]
    pub fn is_succeeded(self) -> bool {
        matches!(self, State::Succeeded)
    }

    /// Returns `true` if this state is `Failed`.
    #[inline]
    pub fn is_failed(self) -> bool {
        matches!(self, State::Failed)
    }

    /// Returns `true` if this state is `Running`.
    #[inline]
    pub fn is_running(self) -> bool {
        matches!(self, State::Running)
    }

    /// Returns `true` if this state is `Ready`.
    #[inline]
    pub fn is_ready(self) -> bool {
        matches!(self, State::Ready)
    }

    /// Returns `true` for `Succeeded` and `Failed`.
    #[inline]
    pub fn is_resolved(self) -> bool {
        matches!(self, State::Succeeded | State::Failed)
    }

    /// Returns `true` for `Ready` and `Running`, the states a parent still updates.
    #[inline]
    pub fn is_pending(self) -> bool {
        !self.is_resolved()
    }

    /// Swaps `Succeeded` and `Failed`; unresolved states pass through.
    #[inline]
    pub fn invert(self) -> Self {
        match self {
            State::Succeeded => State::Failed,
            State::Failed => State::Succeeded,
            other => other,
        }
    }

    /// The resolved state matching a boolean outcome.
    #[inline]
    pub fn from_outcome(succeeded: bool) -> Self {
        if succeeded {
            State::Succeeded
        } else {
            State::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn invert_swaps_only_resolved_states() {
        assert_eq!(State::Succeeded.invert(), State::Failed);
        assert_eq!(State::Failed.invert(), State::Succeeded);
        assert_eq!(State::Running.invert(), State::Running);
        assert_eq!(State::Ready.invert(), State::Ready);
    }

    #[test]
    fn parses_and_displays_upper_case_names() {
        assert_eq!(State::from_str("succeeded").unwrap(), State::Succeeded);
        assert_eq!(State::Running.to_string(), "RUNNING");
        assert_eq!(
            serde_json::to_string(&State::Failed).unwrap(),
            "\"FAILED\""
        );
    }
}
