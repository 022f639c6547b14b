//! Action log state machine
//!
//! Every transition checks its guard before touching the log, so a failed
//! call leaves the log exactly as it was.
//!
//! ```text
//! open ──assign──▶ open
//! open/in_progress ──update(in_progress)──▶ in_progress
//! in_progress ──update(closed)──▶ pending_approval @ first stage
//! pending_approval ──approve──▶ pending_approval @ next stage | closed
//! pending_approval ──reject──▶ in_progress (stage = rejected)
//! ```
//!
//! A unit with no active unit head skips straight to the assistant
//! commissioner, and a super admin may reject at any stage so a log whose
//! approver has left can always be sent back.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::authority::Authority;
use super::delegation::{Actor, Grant};
use super::WorkflowError;
use crate::models::{ActionLog, ActionLogStatus, ApprovalStage, User};

/// Result of an approve or reject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalOutcome {
    pub from: ApprovalStage,
    pub to: ApprovalStage,
    pub closed: bool,
    /// Delegator whose authority was used, if any
    pub on_behalf_of: Option<Uuid>,
}

/// First stage a closure request must clear, from the assignees' own authority
pub fn first_stage<'a>(
    log: &ActionLog,
    assignees: impl IntoIterator<Item = &'a User>,
    unit_head_available: bool,
) -> ApprovalStage {
    let highest = assignees
        .into_iter()
        .filter_map(|u| u.authorities.highest())
        .max();

    match highest {
        None if log.unit_id.is_some() && unit_head_available => ApprovalStage::UnitHead,
        None | Some(Authority::UnitHead) => ApprovalStage::AssistantCommissioner,
        Some(Authority::AssistantCommissioner) | Some(Authority::Commissioner) => {
            ApprovalStage::Commissioner
        }
    }
}

/// Whether `actor` may set the assignees of `log`
pub fn can_assign(log: &ActionLog, actor: &Actor) -> bool {
    actor.is_admin()
        || log.original_assigner == Some(actor.id())
        || (log.original_assigner.is_none() && log.created_by == actor.id())
        || actor.covers(log)
}

/// Replace the assignees (and team leader) of a log
pub fn assign(
    log: &mut ActionLog,
    actor: &Actor,
    assignees: Vec<Uuid>,
    team_leader: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    if !matches!(
        log.status,
        ActionLogStatus::Open | ActionLogStatus::InProgress
    ) {
        return Err(WorkflowError::InvalidTransition(format!(
            "Cannot assign an action log with status: {}",
            log.status.as_str()
        )));
    }
    if !can_assign(log, actor) {
        return Err(WorkflowError::NotAuthorized(
            "Only the original assigner or an approver over this log can assign it".to_string(),
        ));
    }

    let mut unique = Vec::with_capacity(assignees.len());
    for id in assignees {
        if !unique.contains(&id) {
            unique.push(id);
        }
    }
    if let Some(leader) = team_leader {
        if !unique.contains(&leader) {
            return Err(WorkflowError::Validation(
                "Team leader must be one of the assignees".to_string(),
            ));
        }
    }

    if log.original_assigner.is_none() && !unique.is_empty() {
        log.original_assigner = Some(actor.id());
    }
    log.assigned_to = unique;
    log.team_leader = team_leader;
    log.updated_at = now;
    Ok(())
}

/// Only an assignee may move the status, and only the team leader once there are several
pub fn check_status_actor(log: &ActionLog, actor_id: Uuid) -> Result<(), WorkflowError> {
    if !log.is_assignee(actor_id) {
        return Err(WorkflowError::NotAuthorized(
            "Only assignees can update the status".to_string(),
        ));
    }
    if log.assigned_to.len() >= 2 {
        match log.team_leader {
            None => return Err(WorkflowError::TeamLeaderRequired),
            Some(leader) if leader != actor_id => {
                return Err(WorkflowError::NotAuthorized(
                    "Only the team leader can update the status".to_string(),
                ))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Move a log to `target` on behalf of an assignee.
///
/// Requesting `closed` submits the log for approval; it never closes it.
pub fn update_status<'a>(
    log: &mut ActionLog,
    actor_id: Uuid,
    target: ActionLogStatus,
    assignees: impl IntoIterator<Item = &'a User>,
    unit_head_available: bool,
    now: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    check_status_actor(log, actor_id)?;

    match (log.status, target) {
        (ActionLogStatus::Open | ActionLogStatus::InProgress, ActionLogStatus::InProgress) => {
            log.status = ActionLogStatus::InProgress;
        }
        (ActionLogStatus::InProgress, ActionLogStatus::Closed) => {
            log.closure_approval_stage = first_stage(log, assignees, unit_head_available);
            log.status = ActionLogStatus::PendingApproval;
            log.approved_by = None;
            log.approved_at = None;
        }
        (from, to) => {
            return Err(WorkflowError::InvalidTransition(format!(
                "Cannot move action log from {} to {}",
                from.as_str(),
                to.as_str()
            )))
        }
    }
    log.updated_at = now;
    Ok(())
}

/// The grant that lets `actor` decide the log's current stage
pub fn approval_grant<'a>(log: &ActionLog, actor: &'a Actor) -> Result<&'a Grant, WorkflowError> {
    if log.status != ActionLogStatus::PendingApproval {
        return Err(WorkflowError::InvalidTransition(format!(
            "Action log is {}, not pending approval",
            log.status.as_str()
        )));
    }
    let authority = Authority::for_stage(log.closure_approval_stage).ok_or_else(|| {
        WorkflowError::InvalidTransition(format!(
            "Action log has no approval stage awaiting a decision ({})",
            log.closure_approval_stage.as_str()
        ))
    })?;

    actor.grant_for(authority, log).ok_or_else(|| {
        WorkflowError::NotAuthorized(format!(
            "Approval at the {} stage requires {} authority",
            log.closure_approval_stage.as_str(),
            authority.as_str()
        ))
    })
}

pub fn can_approve(log: &ActionLog, actor: &Actor) -> bool {
    approval_grant(log, actor).is_ok()
}

/// Sign off the current stage; the commissioner stage closes the log
pub fn approve(
    log: &mut ActionLog,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<ApprovalOutcome, WorkflowError> {
    let grant = approval_grant(log, actor)?;
    let on_behalf_of = grant.on_behalf_of;
    let from = log.closure_approval_stage;

    match grant.authority.next() {
        Some(next) => {
            log.closure_approval_stage = next.stage();
        }
        None => {
            log.status = ActionLogStatus::Closed;
            log.closure_approval_stage = ApprovalStage::Closed;
            log.approved_by = Some(actor.id());
            log.approved_at = Some(now);
        }
    }
    log.updated_at = now;

    Ok(ApprovalOutcome {
        from,
        to: log.closure_approval_stage,
        closed: log.status == ActionLogStatus::Closed,
        on_behalf_of,
    })
}

/// Send the log back to its assignees for revision.
///
/// Super admins may reject at any stage without holding its authority.
pub fn reject(
    log: &mut ActionLog,
    actor: &Actor,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<ApprovalOutcome, WorkflowError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(WorkflowError::Validation(
            "A rejection reason is required".to_string(),
        ));
    }
    let on_behalf_of = match approval_grant(log, actor) {
        Ok(grant) => grant.on_behalf_of,
        Err(WorkflowError::NotAuthorized(_)) if actor.is_admin() => None,
        Err(e) => return Err(e),
    };
    let from = log.closure_approval_stage;

    log.status = ActionLogStatus::InProgress;
    log.closure_approval_stage = ApprovalStage::Rejected;
    log.rejection_reason = Some(reason.to_string());
    log.updated_at = now;

    Ok(ApprovalOutcome {
        from,
        to: ApprovalStage::Rejected,
        closed: false,
        on_behalf_of,
    })
}
