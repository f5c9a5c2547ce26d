//! The transition graph and its validator.

use warden_core::{ErrorCode, TaskState};

use crate::context::PolicyContext;

/// Result of validating one transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionCheck {
    /// The transition is allowed.
    Ok,
    /// The transition is rejected; one code per missing precondition.
    Rejected(Vec<ErrorCode>),
}

impl TransitionCheck {
    /// Whether the transition passed.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// The rejection codes, empty when allowed.
    #[must_use]
    pub fn errors(&self) -> &[ErrorCode] {
        match self {
            Self::Ok => &[],
            Self::Rejected(errors) => errors,
        }
    }
}

/// The states reachable from `from` in one step.
///
/// `DONE` is strictly terminal: override paths move into it, never out.
#[must_use]
pub fn allowed_targets(from: TaskState) -> &'static [TaskState] {
    use TaskState::{Approval, Blocked, Doing, Done, Inbox, Ready, Review, Triaged};
    match from {
        Inbox => &[Triaged, Blocked],
        Triaged => &[Ready, Blocked],
        Ready => &[Doing, Blocked],
        Doing => &[Review, Blocked],
        Review => &[Approval, Doing, Blocked],
        Approval => &[Done, Review, Blocked],
        Done => &[],
        Blocked => &[Inbox, Triaged, Ready, Doing],
    }
}

/// Validate a transition between two known states.
///
/// With `strict` set, the gate checks described on [`PolicyContext`] are
/// applied on top of the graph; without it only the graph is consulted.
/// The context is optional because not every call site has a task at
/// hand (the graph itself is task-independent).
#[must_use]
pub fn validate_transition(
    from: TaskState,
    to: TaskState,
    ctx: Option<&PolicyContext>,
    strict: bool,
) -> TransitionCheck {
    let mut errors = Vec::new();

    if !allowed_targets(from).contains(&to) {
        errors.push(ErrorCode::InvalidTransition);
        return TransitionCheck::Rejected(errors);
    }

    if strict && let Some(ctx) = ctx {
        check_strict(from, to, ctx, &mut errors);
    }

    if errors.is_empty() {
        TransitionCheck::Ok
    } else {
        TransitionCheck::Rejected(errors)
    }
}

/// Validate a transition given wire-format state names.
///
/// An unparseable `from` or `to` yields `UNKNOWN_STATE`; this is the
/// entry point for callers handling untrusted strings (the ops API).
#[must_use]
pub fn validate_transition_str(
    from: &str,
    to: &str,
    ctx: Option<&PolicyContext>,
    strict: bool,
) -> TransitionCheck {
    let (Some(from), Some(to)) = (TaskState::parse(from), TaskState::parse(to)) else {
        return TransitionCheck::Rejected(vec![ErrorCode::UnknownState]);
    };
    validate_transition(from, to, ctx, strict)
}

fn check_strict(from: TaskState, to: TaskState, ctx: &PolicyContext, errors: &mut Vec<ErrorCode>) {
    // Entering DOING requires a checklist and an explicit evidence flag.
    if to == TaskState::Doing
        && (ctx.dod_checklist.is_empty() || ctx.evidence_required.is_none())
    {
        errors.push(ErrorCode::MissingDodChecklist);
    }

    // Leaving REVIEW or entering DONE with evidence required needs a link.
    let evidence_gate = from == TaskState::Review || to == TaskState::Done;
    if evidence_gate && ctx.evidence_required == Some(true) && ctx.evidence_links.is_empty() {
        errors.push(ErrorCode::MissingEvidenceLink);
    }

    if to == TaskState::Done {
        check_done(ctx, errors);
    }
}

fn check_done(ctx: &PolicyContext, errors: &mut Vec<ErrorCode>) {
    if ctx.dod_checklist.iter().any(|item| !item.done) {
        errors.push(ErrorCode::DodIncomplete);
    }

    if ctx
        .task_type
        .is_some_and(|t| t.requires_docs())
        && !ctx.docs_updated
    {
        errors.push(ErrorCode::DocsNotUpdated);
    }

    match &ctx.override_grant {
        Some(grant) => {
            // An override bypasses the gate but must be complete.
            let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
            if !filled(&grant.by) {
                errors.push(ErrorCode::OverrideMissingBy);
            }
            if !filled(&grant.reason) {
                errors.push(ErrorCode::OverrideMissingReason);
            }
            if !filled(&grant.accepted_risk) {
                errors.push(ErrorCode::OverrideMissingAcceptedRisk);
            }
            if !filled(&grant.review_deadline_iso) {
                errors.push(ErrorCode::OverrideMissingReviewDeadline);
            }
        },
        None => {
            if ctx.has_gate && !ctx.gate_approved {
                errors.push(ErrorCode::GateNotApproved);
            }
        },
    }
}
