//! Policy verdicts and governance decision statuses.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of escalating rule evaluation, ordered by restrictiveness.
///
/// The derived ordering is load-bearing: escalate-all evaluation computes
/// the final verdict as the maximum of all triggered rule verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Allow,
    Warn,
    RequireSignoff,
    Block,
}

impl Verdict {
    /// The more restrictive of two verdicts.
    pub fn most_restrictive(self, other: Verdict) -> Verdict {
        self.max(other)
    }

    /// WARN is treated as ALLOW for approval purposes.
    pub fn is_allow_like(&self) -> bool {
        matches!(self, Verdict::Allow | Verdict::Warn)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Warn => "warn",
            Self::RequireSignoff => "require_signoff",
            Self::Block => "block",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse decision surfaced by a single evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDecision {
    Allow,
    Deny,
    RequireApproval,
}

impl PolicyDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::RequireApproval => "require_approval",
        }
    }
}

impl fmt::Display for PolicyDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<Verdict> for PolicyDecision {
    /// Collapse an escalation verdict into the coarse decision surface.
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Allow | Verdict::Warn => PolicyDecision::Allow,
            Verdict::RequireSignoff => PolicyDecision::RequireApproval,
            Verdict::Block => PolicyDecision::Deny,
        }
    }
}

/// Lifecycle status of a tracked governance decision.
///
/// `Pending` is the only non-terminal status. Every other status is final
/// and must never be mutated again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernanceStatus {
    Pending,
    Approved,
    Blocked,
    Signed,
    Failed,
}

impl GovernanceStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GovernanceStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Blocked => "blocked",
            Self::Signed => "signed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for GovernanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_ordering() {
        assert!(Verdict::Allow < Verdict::Warn);
        assert!(Verdict::Warn < Verdict::RequireSignoff);
        assert!(Verdict::RequireSignoff < Verdict::Block);
        assert_eq!(
            Verdict::Warn.most_restrictive(Verdict::Block),
            Verdict::Block
        );
    }

    #[test]
    fn test_warn_is_allow_like() {
        assert!(Verdict::Warn.is_allow_like());
        assert!(!Verdict::RequireSignoff.is_allow_like());
    }

    #[test]
    fn test_verdict_to_decision() {
        assert_eq!(PolicyDecision::from(Verdict::Warn), PolicyDecision::Allow);
        assert_eq!(
            PolicyDecision::from(Verdict::RequireSignoff),
            PolicyDecision::RequireApproval
        );
        assert_eq!(PolicyDecision::from(Verdict::Block), PolicyDecision::Deny);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!GovernanceStatus::Pending.is_terminal());
        for status in [
            GovernanceStatus::Approved,
            GovernanceStatus::Blocked,
            GovernanceStatus::Signed,
            GovernanceStatus::Failed,
        ] {
            assert!(status.is_terminal());
        }
    }
}
