//! Workflow manager for action logs, comments and delegations
//!
//! The manager handles:
//! - Resolving the acting user's grants against live delegations
//! - Applying assignment, status and approval transitions
//! - Comment threads
//! - The delegation registry
//! - Notifications and event broadcasting

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::approval;
use super::delegation::{self, Actor, Delegation, DelegationView};
use crate::error::{AppError, Result};
use crate::models::{
    ActionLog, ActionLogStatus, ActionLogView, AddCommentRequest, ApprovalStage, AssignRequest,
    AssignmentRecord, Comment, CommentThread, CreateActionLogRequest, CreateDelegationRequest,
    ListActionLogsQuery, Notification, Paginated, UpdateActionLogRequest, UpdateDelegationRequest,
    User, UserProfile,
};
use crate::store::Store;
use crate::workflow::Authority;

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

/// Events emitted by the workflow manager
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// An action log was created
    LogCreated { log_id: Uuid, created_by: Uuid },
    /// Assignees (or team leader) changed
    LogAssigned {
        log_id: Uuid,
        assigned_by: Uuid,
        assigned_to: Vec<Uuid>,
        team_leader: Option<Uuid>,
    },
    /// An assignee moved the log
    StatusChanged {
        log_id: Uuid,
        changed_by: Uuid,
        status: ActionLogStatus,
        stage: ApprovalStage,
    },
    /// A stage was signed off
    LogApproved {
        log_id: Uuid,
        approver_id: Uuid,
        stage: ApprovalStage,
        closed: bool,
        on_behalf_of: Option<Uuid>,
    },
    /// The log was sent back to its assignees
    LogRejected {
        log_id: Uuid,
        approver_id: Uuid,
        reason: String,
        on_behalf_of: Option<Uuid>,
    },
    /// A comment was posted
    CommentAdded {
        log_id: Uuid,
        comment_id: Uuid,
        author_id: Uuid,
    },
    /// Authority was handed off
    DelegationCreated {
        delegation_id: Uuid,
        delegator_id: Uuid,
        delegate_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
    },
    /// A delegation was revoked or deleted
    DelegationRevoked {
        delegation_id: Uuid,
        delegator_id: Uuid,
        delegate_id: Uuid,
    },
}

/// An event together with the users it concerns
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowNotice {
    pub recipients: Vec<Uuid>,
    pub event: WorkflowEvent,
}

/// Pending side effects of one transition
struct Outcome {
    log_id: Option<Uuid>,
    recipients: Vec<Uuid>,
    message: String,
    event: WorkflowEvent,
}

/// Manager for the action log workflow
pub struct WorkflowManager {
    store: Store,
    event_tx: broadcast::Sender<WorkflowNotice>,
}

impl WorkflowManager {
    pub fn new(store: Store) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self { store, event_tx }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Subscribe to workflow events
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowNotice> {
        self.event_tx.subscribe()
    }

    /// Resolve `user`'s effective grants at this moment
    pub async fn actor(&self, user: User) -> Result<Actor> {
        let now = Utc::now();
        let outgoing = self.store.active_delegations_by(user.id).await?;

        let mut incoming = Vec::new();
        for d in self.store.active_delegations_to(user.id).await? {
            if !d.is_effective(now) {
                continue;
            }
            let delegator = self.store.get_user(d.delegated_by).await?;
            if delegator.is_active {
                incoming.push((d, delegator));
            }
        }

        Ok(Actor::resolve(user, &outgoing, &incoming, now))
    }

    // Action logs

    pub async fn create_log(&self, user: User, req: CreateActionLogRequest) -> Result<ActionLog> {
        let title = req.title.trim();
        if title.is_empty() {
            return Err(AppError::BadRequest("Title is required".to_string()));
        }

        let department = self.store.get_department(req.department_id).await?;
        let unit_id = match req.unit_id {
            Some(unit_id) => {
                let unit = self.store.get_unit(unit_id).await?;
                if unit.department_id != department.id {
                    return Err(AppError::BadRequest(format!(
                        "Unit {} does not belong to department {}",
                        unit.id, department.id
                    )));
                }
                Some(unit.id)
            }
            None if user.department_id == Some(department.id) => user.unit_id,
            None => None,
        };

        let now = Utc::now();
        let mut log = ActionLog {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: req.description.filter(|d| !d.trim().is_empty()),
            priority: req.priority,
            due_date: req.due_date,
            department_id: department.id,
            unit_id,
            assigned_to: vec![],
            team_leader: None,
            status: ActionLogStatus::Open,
            closure_approval_stage: ApprovalStage::None,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            created_by: user.id,
            original_assigner: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let actor = self.actor(user).await?;
        let mut outcomes = vec![Outcome {
            log_id: None,
            recipients: vec![],
            message: String::new(),
            event: WorkflowEvent::LogCreated {
                log_id: log.id,
                created_by: actor.id(),
            },
        }];

        let history = if req.assigned_to.is_empty() {
            None
        } else {
            let (record, outcome) = self
                .apply_assign(&mut log, &actor, req.assigned_to, req.team_leader, now)
                .await?;
            outcomes.push(outcome);
            Some(record)
        };

        self.store.insert_action_log(&log, history.as_ref()).await?;
        tracing::info!(log_id = %log.id, actor = %actor.id(), "Action log created");

        self.publish(actor.id(), outcomes).await?;
        Ok(log)
    }

    /// Fetch a log the user is allowed to see
    pub async fn get_log(&self, user: User, id: Uuid) -> Result<ActionLogView> {
        let actor = self.actor(user).await?;
        let log = self.visible_log(&actor, id).await?;
        let comment_count = self.store.list_comments(id).await?.len() as i64;

        Ok(ActionLogView {
            can_approve: approval::can_approve(&log, &actor),
            comment_count,
            log,
        })
    }

    pub async fn list_logs(
        &self,
        user: User,
        query: ListActionLogsQuery,
    ) -> Result<Paginated<ActionLogView>> {
        let actor = self.actor(user).await?;
        let counts = self.store.comment_counts().await?;

        let matching: Vec<ActionLog> = self
            .store
            .list_action_logs()
            .await?
            .into_iter()
            .filter(|log| is_visible(log, &actor))
            .filter(|log| query.status.map_or(true, |s| log.status == s))
            .filter(|log| query.unit_id.map_or(true, |u| log.unit_id == Some(u)))
            .filter(|log| query.assignee.map_or(true, |a| log.is_assignee(a)))
            .filter(|log| {
                query
                    .search
                    .as_deref()
                    .map_or(true, |needle| log.matches_search(needle))
            })
            .collect();

        let page_size = query
            .page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let page = query.page.unwrap_or(1).max(1);
        let count = matching.len();

        let results = matching
            .into_iter()
            .skip(page.saturating_sub(1).saturating_mul(page_size))
            .take(page_size)
            .map(|log| ActionLogView {
                can_approve: approval::can_approve(&log, &actor),
                comment_count: counts.get(&log.id).copied().unwrap_or(0),
                log,
            })
            .collect();

        let page_link = |p: usize| format!("/action-logs/?page={}&page_size={}", p, page_size);
        Ok(Paginated {
            count,
            next: (page.saturating_mul(page_size) < count).then(|| page_link(page + 1)),
            previous: (page > 1).then(|| page_link(page - 1)),
            results,
        })
    }

    /// Partial update; assignment and status changes go through their transitions
    pub async fn update_log(
        &self,
        user: User,
        id: Uuid,
        req: UpdateActionLogRequest,
    ) -> Result<ActionLog> {
        let actor = self.actor(user).await?;
        let mut log = self.store.get_action_log(id).await?;
        let now = Utc::now();
        let mut outcomes = Vec::new();

        let edits_content = req.title.is_some()
            || req.description.is_some()
            || req.priority.is_some()
            || req.due_date.is_some();
        if edits_content {
            let may_edit = actor.is_admin()
                || log.created_by == actor.id()
                || log.original_assigner == Some(actor.id());
            if !may_edit {
                return Err(AppError::Forbidden(
                    "Only the creator or original assigner can edit this action log".to_string(),
                ));
            }
            if log.status == ActionLogStatus::Closed {
                return Err(AppError::Conflict(
                    "Closed action logs cannot be edited".to_string(),
                ));
            }
            if let Some(title) = req.title {
                let title = title.trim();
                if title.is_empty() {
                    return Err(AppError::BadRequest("Title is required".to_string()));
                }
                log.title = title.to_string();
            }
            if let Some(description) = req.description {
                log.description = Some(description).filter(|d| !d.trim().is_empty());
            }
            if let Some(priority) = req.priority {
                log.priority = priority;
            }
            if req.due_date.is_some() {
                log.due_date = req.due_date;
            }
            log.updated_at = now;
        }

        let mut history = None;
        if req.assigned_to.is_some() || req.team_leader.is_some() {
            let assignees = req.assigned_to.unwrap_or_else(|| log.assigned_to.clone());
            let team_leader = match req.team_leader {
                Some(leader) => leader,
                None => log.team_leader.filter(|leader| assignees.contains(leader)),
            };
            let (record, outcome) = self
                .apply_assign(&mut log, &actor, assignees, team_leader, now)
                .await?;
            history = Some(record);
            outcomes.push(outcome);
        }

        let mut comment = None;
        if let Some(target) = req.status {
            let (entry, outcome) = self
                .apply_status(&mut log, &actor, target, req.comment, now)
                .await?;
            comment = entry;
            outcomes.push(outcome);
        }

        self.store
            .save_transition(&mut log, comment.as_ref(), history.as_ref())
            .await?;
        self.publish(actor.id(), outcomes).await?;
        Ok(log)
    }

    pub async fn assign(&self, user: User, id: Uuid, req: AssignRequest) -> Result<ActionLog> {
        let actor = self.actor(user).await?;
        let mut log = self.store.get_action_log(id).await?;
        let now = Utc::now();

        let (record, outcome) = self
            .apply_assign(&mut log, &actor, req.assigned_to, req.team_leader, now)
            .await?;
        self.store
            .save_transition(&mut log, None, Some(&record))
            .await?;

        self.publish(actor.id(), vec![outcome]).await?;
        Ok(log)
    }

    pub async fn update_status(
        &self,
        user: User,
        id: Uuid,
        target: ActionLogStatus,
        comment: Option<String>,
    ) -> Result<ActionLog> {
        let actor = self.actor(user).await?;
        let mut log = self.store.get_action_log(id).await?;

        let (entry, outcome) = self
            .apply_status(&mut log, &actor, target, comment, Utc::now())
            .await?;
        self.store
            .save_transition(&mut log, entry.as_ref(), None)
            .await?;

        self.publish(actor.id(), vec![outcome]).await?;
        Ok(log)
    }

    pub async fn approve(&self, user: User, id: Uuid, comment: Option<String>) -> Result<ActionLog> {
        let actor = self.actor(user).await?;
        let mut log = self.store.get_action_log(id).await?;
        let now = Utc::now();

        let outcome = approval::approve(&mut log, &actor, now)?;
        let entry = comment
            .filter(|c| !c.trim().is_empty())
            .map(|body| new_comment(&log, actor.id(), body, None, Some(log.status), now));

        self.store
            .save_transition(&mut log, entry.as_ref(), None)
            .await?;
        tracing::info!(
            log_id = %log.id,
            actor = %actor.id(),
            from = outcome.from.as_str(),
            to = outcome.to.as_str(),
            on_behalf_of = ?outcome.on_behalf_of,
            "Action log approved"
        );

        let message = if outcome.closed {
            format!("'{}' was approved and closed", log.title)
        } else {
            format!(
                "'{}' was approved at the {} stage",
                log.title,
                outcome.from.as_str()
            )
        };
        self.publish(
            actor.id(),
            vec![Outcome {
                log_id: Some(log.id),
                recipients: stakeholders(&log),
                message,
                event: WorkflowEvent::LogApproved {
                    log_id: log.id,
                    approver_id: actor.id(),
                    stage: outcome.to,
                    closed: outcome.closed,
                    on_behalf_of: outcome.on_behalf_of,
                },
            }],
        )
        .await?;
        Ok(log)
    }

    pub async fn reject(&self, user: User, id: Uuid, reason: String) -> Result<ActionLog> {
        let actor = self.actor(user).await?;
        let mut log = self.store.get_action_log(id).await?;
        let now = Utc::now();

        let outcome = approval::reject(&mut log, &actor, &reason, now)?;
        let reason = log.rejection_reason.clone().unwrap_or_default();
        let entry = new_comment(&log, actor.id(), reason.clone(), None, Some(log.status), now);

        self.store
            .save_transition(&mut log, Some(&entry), None)
            .await?;
        tracing::info!(
            log_id = %log.id,
            actor = %actor.id(),
            from = outcome.from.as_str(),
            on_behalf_of = ?outcome.on_behalf_of,
            "Action log rejected"
        );

        self.publish(
            actor.id(),
            vec![Outcome {
                log_id: Some(log.id),
                recipients: stakeholders(&log),
                message: format!("'{}' was returned for revision: {}", log.title, reason),
                event: WorkflowEvent::LogRejected {
                    log_id: log.id,
                    approver_id: actor.id(),
                    reason,
                    on_behalf_of: outcome.on_behalf_of,
                },
            }],
        )
        .await?;
        Ok(log)
    }

    pub async fn assignment_history(&self, user: User, id: Uuid) -> Result<Vec<AssignmentRecord>> {
        let actor = self.actor(user).await?;
        self.visible_log(&actor, id).await?;
        self.store.list_assignment_history(id).await
    }

    pub async fn unread_notifications(&self, user: &User, id: Uuid) -> Result<i64> {
        self.store.get_action_log(id).await?;
        self.store.unread_notification_count(user.id, id).await
    }

    pub async fn mark_notifications_read(&self, user: &User, id: Uuid) -> Result<u64> {
        self.store.get_action_log(id).await?;
        self.store.mark_notifications_read(user.id, id).await
    }

    // Comments

    pub async fn add_comment(&self, user: User, id: Uuid, req: AddCommentRequest) -> Result<Comment> {
        let actor = self.actor(user).await?;
        let log = self.visible_log(&actor, id).await?;

        let body = req.comment.trim();
        if body.is_empty() {
            return Err(AppError::BadRequest("Comment cannot be empty".to_string()));
        }

        let mut recipients = stakeholders(&log);
        if let Some(parent_id) = req.parent_id {
            let parent = match self.store.get_comment(parent_id).await {
                Ok(parent) => parent,
                Err(AppError::NotFound(_)) => {
                    return Err(AppError::BadRequest(format!(
                        "Parent comment {} not found",
                        parent_id
                    )))
                }
                Err(e) => return Err(e),
            };
            if parent.action_log_id != log.id {
                return Err(AppError::BadRequest(
                    "Parent comment belongs to another action log".to_string(),
                ));
            }
            if parent.parent_id.is_some() {
                return Err(AppError::BadRequest(
                    "Replies cannot be nested more than one level".to_string(),
                ));
            }
            recipients.push(parent.author_id);
        }

        let comment = new_comment(
            &log,
            actor.id(),
            body.to_string(),
            req.parent_id,
            None,
            Utc::now(),
        );
        self.store.add_comment(&comment).await?;

        self.publish(
            actor.id(),
            vec![Outcome {
                log_id: Some(log.id),
                recipients,
                message: format!("New comment on '{}'", log.title),
                event: WorkflowEvent::CommentAdded {
                    log_id: log.id,
                    comment_id: comment.id,
                    author_id: actor.id(),
                },
            }],
        )
        .await?;
        Ok(comment)
    }

    /// Top-level comments newest first, each with its replies oldest first
    pub async fn list_comments(&self, user: User, id: Uuid) -> Result<Vec<CommentThread>> {
        let actor = self.actor(user).await?;
        self.visible_log(&actor, id).await?;
        let comments = self.store.list_comments(id).await?;
        Ok(thread_comments(comments))
    }

    // Delegations

    pub async fn create_delegation(
        &self,
        user: User,
        req: CreateDelegationRequest,
    ) -> Result<DelegationView> {
        let now = Utc::now();
        let delegate = match self.store.find_user(req.delegated_to_id).await? {
            Some(delegate) => delegate,
            None => {
                return Err(AppError::BadRequest(format!(
                    "User {} not found",
                    req.delegated_to_id
                )))
            }
        };
        delegation::validate_new(&user, &delegate, req.expires_at, now)?;

        let record = Delegation::new(user.id, delegate.id, req.expires_at, req.reason, now);
        let replaced = self.store.replace_delegation(&record).await?;
        tracing::info!(
            delegation_id = %record.id,
            delegator = %user.id,
            delegate = %delegate.id,
            replaced = replaced.len(),
            "Delegation created"
        );

        let _ = self.event_tx.send(WorkflowNotice {
            recipients: vec![user.id, delegate.id],
            event: WorkflowEvent::DelegationCreated {
                delegation_id: record.id,
                delegator_id: user.id,
                delegate_id: delegate.id,
                expires_at: record.expires_at,
            },
        });

        Ok(DelegationView::at(record, now))
    }

    pub async fn get_delegation(&self, user: &User, id: Uuid) -> Result<DelegationView> {
        let record = self.store.get_delegation(id).await?;
        let involved = record.delegated_by == user.id || record.delegated_to == user.id;
        if !involved && !user.role.is_admin() {
            return Err(AppError::Forbidden(
                "Not a party to this delegation".to_string(),
            ));
        }
        Ok(DelegationView::at(record, Utc::now()))
    }

    /// Delegations the user gave or received; administrators see all
    pub async fn list_delegations(&self, user: &User) -> Result<Vec<DelegationView>> {
        let now = Utc::now();
        let records = if user.role.is_admin() {
            self.store.list_delegations().await?
        } else {
            self.store.delegations_involving(user.id).await?
        };
        Ok(records
            .into_iter()
            .map(|d| DelegationView::at(d, now))
            .collect())
    }

    pub async fn revoke_delegation(&self, user: &User, id: Uuid) -> Result<DelegationView> {
        let now = Utc::now();
        let mut record = self.store.get_delegation(id).await?;
        check_delegation_owner(&record, user)?;

        if record.revoke(now) {
            self.store.deactivate_delegation(id, now).await?;
            tracing::info!(delegation_id = %id, actor = %user.id, "Delegation revoked");
            let _ = self.event_tx.send(WorkflowNotice {
                recipients: vec![record.delegated_by, record.delegated_to],
                event: WorkflowEvent::DelegationRevoked {
                    delegation_id: id,
                    delegator_id: record.delegated_by,
                    delegate_id: record.delegated_to,
                },
            });
        }
        Ok(DelegationView::at(record, now))
    }

    /// Change the expiry or reason of a delegation
    pub async fn update_delegation(
        &self,
        user: &User,
        id: Uuid,
        req: UpdateDelegationRequest,
    ) -> Result<DelegationView> {
        let now = Utc::now();
        let mut record = self.store.get_delegation(id).await?;
        check_delegation_owner(&record, user)?;

        if let Some(expires) = req.expires_at {
            if expires <= now {
                return Err(AppError::BadRequest(
                    "expires_at must be in the future".to_string(),
                ));
            }
            record.expires_at = Some(expires);
        }
        if let Some(reason) = req.reason {
            record.reason = reason;
        }
        record.updated_at = now;

        self.store.update_delegation(&record).await?;
        tracing::info!(
            delegation_id = %id,
            actor = %user.id,
            expires_at = ?record.expires_at,
            "Delegation updated"
        );
        Ok(DelegationView::at(record, now))
    }

    pub async fn delete_delegation(&self, user: &User, id: Uuid) -> Result<()> {
        let record = self.store.get_delegation(id).await?;
        check_delegation_owner(&record, user)?;

        self.store.delete_delegation(id).await?;
        tracing::info!(delegation_id = %id, actor = %user.id, "Delegation deleted");
        if record.is_active {
            let _ = self.event_tx.send(WorkflowNotice {
                recipients: vec![record.delegated_by, record.delegated_to],
                event: WorkflowEvent::DelegationRevoked {
                    delegation_id: id,
                    delegator_id: record.delegated_by,
                    delegate_id: record.delegated_to,
                },
            });
        }
        Ok(())
    }

    /// Who currently exercises `holder`'s authority
    pub async fn resolve_authority(&self, holder: Uuid) -> Result<Uuid> {
        self.store.get_user(holder).await?;
        let outgoing = self.store.active_delegations_by(holder).await?;
        Ok(delegation::resolve_holder(holder, &outgoing, Utc::now()))
    }

    /// The user with their server-computed authorization flags
    pub async fn profile(&self, user: User) -> Result<UserProfile> {
        let actor = self.actor(user).await?;
        let has_active_delegation = actor.on_leave || !actor.acting_for().is_empty();

        Ok(UserProfile {
            can_approve_action_logs: actor.can_approve_anything(),
            has_active_delegation,
            is_currently_on_leave: actor.on_leave,
            has_ag_cpap_designation: actor.holds(Authority::Commissioner),
            acting_for: actor.acting_for(),
            user: actor.user,
        })
    }

    // Internal helpers

    async fn visible_log(&self, actor: &Actor, id: Uuid) -> Result<ActionLog> {
        let log = self.store.get_action_log(id).await?;
        if !is_visible(&log, actor) {
            return Err(AppError::Forbidden(format!(
                "Not allowed to view action log {}",
                id
            )));
        }
        Ok(log)
    }

    async fn apply_assign(
        &self,
        log: &mut ActionLog,
        actor: &Actor,
        assigned_to: Vec<Uuid>,
        team_leader: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<(AssignmentRecord, Outcome)> {
        for id in &assigned_to {
            match self.store.find_user(*id).await? {
                Some(u) if u.is_active => {}
                Some(_) => {
                    return Err(AppError::BadRequest(format!("User {} is not active", id)))
                }
                None => return Err(AppError::BadRequest(format!("User {} not found", id))),
            }
        }

        let previous = log.assigned_to.clone();
        approval::assign(log, actor, assigned_to, team_leader, now)?;
        tracing::info!(
            log_id = %log.id,
            actor = %actor.id(),
            assignees = log.assigned_to.len(),
            "Action log assigned"
        );

        let record = AssignmentRecord {
            id: Uuid::new_v4(),
            action_log_id: log.id,
            assigned_by: actor.id(),
            assigned_to: log.assigned_to.clone(),
            team_leader: log.team_leader,
            created_at: now,
        };
        let outcome = Outcome {
            log_id: Some(log.id),
            recipients: log
                .assigned_to
                .iter()
                .filter(|id| !previous.contains(id))
                .copied()
                .collect(),
            message: format!("You were assigned to '{}'", log.title),
            event: WorkflowEvent::LogAssigned {
                log_id: log.id,
                assigned_by: actor.id(),
                assigned_to: log.assigned_to.clone(),
                team_leader: log.team_leader,
            },
        };
        Ok((record, outcome))
    }

    async fn apply_status(
        &self,
        log: &mut ActionLog,
        actor: &Actor,
        target: ActionLogStatus,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(Option<Comment>, Outcome)> {
        let (assignees, unit_head_available) = if target == ActionLogStatus::Closed {
            let available = match log.unit_id {
                Some(unit_id) => self.store.unit_has_holder(unit_id, Authority::UnitHead).await?,
                None => false,
            };
            (self.store.get_users(&log.assigned_to).await?, available)
        } else {
            (Vec::new(), false)
        };
        approval::update_status(
            log,
            actor.id(),
            target,
            assignees.iter(),
            unit_head_available,
            now,
        )?;
        tracing::info!(
            log_id = %log.id,
            actor = %actor.id(),
            status = log.status.as_str(),
            stage = log.closure_approval_stage.as_str(),
            "Action log status updated"
        );

        let entry = comment
            .filter(|c| !c.trim().is_empty())
            .map(|body| new_comment(log, actor.id(), body, None, Some(log.status), now));

        let mut recipients = vec![log.created_by];
        recipients.extend(log.original_assigner);
        let outcome = Outcome {
            log_id: Some(log.id),
            recipients,
            message: format!(
                "'{}' is now {}",
                log.title,
                log.status.as_str().replace('_', " ")
            ),
            event: WorkflowEvent::StatusChanged {
                log_id: log.id,
                changed_by: actor.id(),
                status: log.status,
                stage: log.closure_approval_stage,
            },
        };
        Ok((entry, outcome))
    }

    /// Store notifications for each outcome and broadcast its event
    async fn publish(&self, actor_id: Uuid, outcomes: Vec<Outcome>) -> Result<()> {
        let now = Utc::now();
        let mut notifications = Vec::new();
        let mut notices = Vec::with_capacity(outcomes.len());

        for outcome in outcomes {
            let mut recipients = outcome.recipients;
            recipients.sort();
            recipients.dedup();
            recipients.retain(|id| *id != actor_id);

            if let Some(log_id) = outcome.log_id {
                notifications.extend(recipients.iter().map(|user_id| Notification {
                    id: Uuid::new_v4(),
                    user_id: *user_id,
                    action_log_id: log_id,
                    message: outcome.message.clone(),
                    is_read: false,
                    created_at: now,
                }));
            }
            notices.push(WorkflowNotice {
                recipients,
                event: outcome.event,
            });
        }

        self.store.insert_notifications(&notifications).await?;
        for notice in notices {
            let _ = self.event_tx.send(notice);
        }
        Ok(())
    }
}

fn is_visible(log: &ActionLog, actor: &Actor) -> bool {
    let me = actor.id();
    actor.user.role.can_view_all_logs()
        || log.created_by == me
        || log.is_assignee(me)
        || log.original_assigner == Some(me)
        || actor.covers(log)
}

/// Assignees and creator of a log
fn stakeholders(log: &ActionLog) -> Vec<Uuid> {
    let mut ids = log.assigned_to.clone();
    ids.push(log.created_by);
    ids
}

fn check_delegation_owner(record: &Delegation, user: &User) -> Result<()> {
    if record.delegated_by != user.id && !user.role.is_admin() {
        return Err(AppError::Forbidden(
            "Only the delegator can revoke a delegation".to_string(),
        ));
    }
    Ok(())
}

fn new_comment(
    log: &ActionLog,
    author_id: Uuid,
    body: String,
    parent_id: Option<Uuid>,
    status: Option<ActionLogStatus>,
    now: DateTime<Utc>,
) -> Comment {
    Comment {
        id: Uuid::new_v4(),
        action_log_id: log.id,
        author_id,
        body: body.trim().to_string(),
        parent_id,
        status,
        created_at: now,
    }
}

/// Group newest-first comments into threads
fn thread_comments(comments: Vec<Comment>) -> Vec<CommentThread> {
    let mut replies: HashMap<Uuid, Vec<Comment>> = HashMap::new();
    let mut roots = Vec::new();
    for comment in comments {
        match comment.parent_id {
            Some(parent) => replies.entry(parent).or_default().push(comment),
            None => roots.push(comment),
        }
    }

    roots
        .into_iter()
        .map(|comment| {
            let mut thread = replies.remove(&comment.id).unwrap_or_default();
            thread.reverse();
            CommentThread {
                comment,
                replies: thread,
            }
        })
        .collect()
}
