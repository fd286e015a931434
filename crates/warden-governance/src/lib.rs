//! Governance decision lifecycle.
//!
//! A decision record starts `Pending` and moves exactly once into one of
//! the terminal states. Every mutation goes through [`apply_transition`],
//! which validates the move against the final policy verdict; the gate for
//! actually running the operation is [`can_proceed_with_verdict`], which is
//! independent of mutation and safe to call repeatedly.

use serde::{Deserialize, Serialize};
use tracing::debug;
use warden_types::{GovernanceStatus, Result, Verdict, WardenError};

/// The four ways a pending decision can be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Approve,
    Block,
    Sign,
    Fail,
}

impl TransitionKind {
    pub fn target(&self) -> GovernanceStatus {
        match self {
            TransitionKind::Approve => GovernanceStatus::Approved,
            TransitionKind::Block => GovernanceStatus::Blocked,
            TransitionKind::Sign => GovernanceStatus::Signed,
            TransitionKind::Fail => GovernanceStatus::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::Approve => "approve",
            TransitionKind::Block => "block",
            TransitionKind::Sign => "sign",
            TransitionKind::Fail => "fail",
        }
    }
}

fn transition_error(
    from: GovernanceStatus,
    to: GovernanceStatus,
    reason: impl Into<String>,
) -> WardenError {
    WardenError::StateTransition {
        from: from.to_string(),
        to: to.to_string(),
        reason: reason.into(),
    }
}

/// Checks whether `current -> target` is a legal move given the verdict the
/// policy run produced and whether a human signoff event has been recorded.
pub fn validate_transition(
    current: GovernanceStatus,
    target: GovernanceStatus,
    final_verdict: Verdict,
    signoff_received: bool,
) -> Result<()> {
    if current.is_terminal() {
        return Err(transition_error(
            current,
            target,
            "decision is already in a terminal state",
        ));
    }
    match target {
        GovernanceStatus::Pending => Err(transition_error(
            current,
            target,
            "a decision cannot return to pending",
        )),
        GovernanceStatus::Approved => {
            if final_verdict.is_allow_like() {
                Ok(())
            } else {
                Err(transition_error(
                    current,
                    target,
                    format!("approval requires an allow verdict, got {final_verdict}"),
                ))
            }
        }
        GovernanceStatus::Blocked => {
            if final_verdict == Verdict::Block {
                Ok(())
            } else {
                Err(transition_error(
                    current,
                    target,
                    format!("blocking requires a block verdict, got {final_verdict}"),
                ))
            }
        }
        GovernanceStatus::Signed => {
            if final_verdict != Verdict::RequireSignoff {
                return Err(transition_error(
                    current,
                    target,
                    format!("signing requires a require_signoff verdict, got {final_verdict}"),
                ));
            }
            if !signoff_received {
                return Err(transition_error(
                    current,
                    target,
                    "no human signoff event has been recorded",
                ));
            }
            Ok(())
        }
        // Error path, always open from pending.
        GovernanceStatus::Failed => Ok(()),
    }
}

/// Computes the target from the transition kind and validates the move.
/// Returns the new status; the caller persists it.
pub fn apply_transition(
    current: GovernanceStatus,
    kind: TransitionKind,
    final_verdict: Verdict,
    signoff_received: bool,
) -> Result<GovernanceStatus> {
    let target = kind.target();
    validate_transition(current, target, final_verdict, signoff_received)?;
    debug!(from = %current, to = %target, kind = kind.as_str(), "governance transition");
    Ok(target)
}

/// The execution gate. Answers "may the operation run right now" without
/// touching the record.
pub fn can_proceed_with_verdict(
    status: GovernanceStatus,
    final_verdict: Verdict,
) -> (bool, Option<String>) {
    match final_verdict {
        Verdict::Block => (false, Some("decision verdict is block".to_string())),
        Verdict::RequireSignoff => {
            if status == GovernanceStatus::Signed {
                (true, None)
            } else {
                (
                    false,
                    Some(format!(
                        "signoff required but decision is {status}, not signed"
                    )),
                )
            }
        }
        Verdict::Allow | Verdict::Warn => match status {
            GovernanceStatus::Pending | GovernanceStatus::Approved => (true, None),
            other => (
                false,
                Some(format!(
                    "allow verdict is inconsistent with decision status {other}"
                )),
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approve_requires_allow_verdict() {
        let err = apply_transition(
            GovernanceStatus::Pending,
            TransitionKind::Approve,
            Verdict::Block,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, WardenError::StateTransition { .. }));
        assert_eq!(err.error_code(), "STATE_TRANSITION");
    }

    #[test]
    fn test_warn_verdict_approves() {
        let status = apply_transition(
            GovernanceStatus::Pending,
            TransitionKind::Approve,
            Verdict::Warn,
            false,
        )
        .unwrap();
        assert_eq!(status, GovernanceStatus::Approved);
    }

    #[test]
    fn test_sign_needs_signoff_event() {
        let err = apply_transition(
            GovernanceStatus::Pending,
            TransitionKind::Sign,
            Verdict::RequireSignoff,
            false,
        )
        .unwrap_err();
        let WardenError::StateTransition { reason, .. } = err else {
            panic!("wrong error variant");
        };
        assert!(reason.contains("signoff"));

        let status = apply_transition(
            GovernanceStatus::Pending,
            TransitionKind::Sign,
            Verdict::RequireSignoff,
            true,
        )
        .unwrap();
        assert_eq!(status, GovernanceStatus::Signed);
    }

    #[test]
    fn test_fail_is_always_open_from_pending() {
        for verdict in [
            Verdict::Allow,
            Verdict::Warn,
            Verdict::RequireSignoff,
            Verdict::Block,
        ] {
            let status = apply_transition(
                GovernanceStatus::Pending,
                TransitionKind::Fail,
                verdict,
                false,
            )
            .unwrap();
            assert_eq!(status, GovernanceStatus::Failed);
        }
    }

    #[test]
    fn test_terminal_states_reject_all_transitions() {
        for current in [
            GovernanceStatus::Approved,
            GovernanceStatus::Blocked,
            GovernanceStatus::Signed,
            GovernanceStatus::Failed,
        ] {
            for kind in [
                TransitionKind::Approve,
                TransitionKind::Block,
                TransitionKind::Sign,
                TransitionKind::Fail,
            ] {
                assert!(apply_transition(current, kind, Verdict::Allow, true).is_err());
            }
        }
    }

    #[test]
    fn test_no_return_to_pending() {
        let err = validate_transition(
            GovernanceStatus::Pending,
            GovernanceStatus::Pending,
            Verdict::Allow,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, WardenError::StateTransition { .. }));
    }

    #[test]
    fn test_proceed_signed_signoff() {
        assert_eq!(
            can_proceed_with_verdict(GovernanceStatus::Signed, Verdict::RequireSignoff),
            (true, None)
        );
        let (ok, reason) =
            can_proceed_with_verdict(GovernanceStatus::Pending, Verdict::RequireSignoff);
        assert!(!ok);
        assert!(reason.unwrap().contains("signoff"));
    }

    #[test]
    fn test_block_never_proceeds() {
        for status in [
            GovernanceStatus::Pending,
            GovernanceStatus::Approved,
            GovernanceStatus::Signed,
        ] {
            let (ok, _) = can_proceed_with_verdict(status, Verdict::Block);
            assert!(!ok);
        }
    }

    #[test]
    fn test_allow_proceeds_from_pending_or_approved() {
        assert!(can_proceed_with_verdict(GovernanceStatus::Pending, Verdict::Allow).0);
        assert!(can_proceed_with_verdict(GovernanceStatus::Approved, Verdict::Warn).0);
        let (ok, reason) = can_proceed_with_verdict(GovernanceStatus::Blocked, Verdict::Allow);
        assert!(!ok);
        assert!(reason.unwrap().contains("inconsistent"));
    }
}
