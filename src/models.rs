//! Data models for action logs, comments, users and departments

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::workflow::authority::AuthoritySet;
use crate::workflow::delegation::DelegationReason;

/// Organisational role of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Economist,
    SeniorEconomist,
    PrincipalEconomist,
    AssistantCommissioner,
    Commissioner,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Economist => "economist",
            Role::SeniorEconomist => "senior_economist",
            Role::PrincipalEconomist => "principal_economist",
            Role::AssistantCommissioner => "assistant_commissioner",
            Role::Commissioner => "commissioner",
            Role::SuperAdmin => "super_admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::SuperAdmin)
    }

    /// Roles that see every action log regardless of assignment
    pub fn can_view_all_logs(&self) -> bool {
        matches!(
            self,
            Role::AssistantCommissioner | Role::Commissioner | Role::SuperAdmin
        )
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "economist" => Ok(Role::Economist),
            "senior_economist" => Ok(Role::SeniorEconomist),
            "principal_economist" => Ok(Role::PrincipalEconomist),
            "assistant_commissioner" => Ok(Role::AssistantCommissioner),
            "commissioner" => Ok(Role::Commissioner),
            "super_admin" => Ok(Role::SuperAdmin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// A user of the service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    /// Display title only; authorization never reads it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub designation: Option<String>,
    pub authorities: AuthoritySet,
    pub department_id: Option<Uuid>,
    pub unit_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Department {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub id: Uuid,
    pub department_id: Uuid,
    pub name: String,
    pub unit_type: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Department listing entry with its units embedded
#[derive(Debug, Clone, Serialize)]
pub struct DepartmentWithUnits {
    #[serde(flatten)]
    pub department: Department,
    pub units: Vec<Unit>,
}

/// Priority of an action log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "High" => Ok(Priority::High),
            "Medium" => Ok(Priority::Medium),
            "Low" => Ok(Priority::Low),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

/// Lifecycle status of an action log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionLogStatus {
    Open,
    InProgress,
    PendingApproval,
    Closed,
}

impl ActionLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionLogStatus::Open => "open",
            ActionLogStatus::InProgress => "in_progress",
            ActionLogStatus::PendingApproval => "pending_approval",
            ActionLogStatus::Closed => "closed",
        }
    }
}

impl std::str::FromStr for ActionLogStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(ActionLogStatus::Open),
            "in_progress" => Ok(ActionLogStatus::InProgress),
            "pending_approval" => Ok(ActionLogStatus::PendingApproval),
            "closed" => Ok(ActionLogStatus::Closed),
            _ => Err(format!("Invalid action log status: {}", s)),
        }
    }
}

/// Which authority must act next on a closure request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStage {
    #[default]
    None,
    UnitHead,
    AssistantCommissioner,
    Commissioner,
    Closed,
    Rejected,
}

impl ApprovalStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStage::None => "none",
            ApprovalStage::UnitHead => "unit_head",
            ApprovalStage::AssistantCommissioner => "assistant_commissioner",
            ApprovalStage::Commissioner => "commissioner",
            ApprovalStage::Closed => "closed",
            ApprovalStage::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for ApprovalStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ApprovalStage::None),
            "unit_head" => Ok(ApprovalStage::UnitHead),
            "assistant_commissioner" => Ok(ApprovalStage::AssistantCommissioner),
            "commissioner" => Ok(ApprovalStage::Commissioner),
            "closed" => Ok(ApprovalStage::Closed),
            "rejected" => Ok(ApprovalStage::Rejected),
            _ => Err(format!("Invalid approval stage: {}", s)),
        }
    }
}

/// An action item tracked through assignment and approval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLog {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub department_id: Uuid,
    pub unit_id: Option<Uuid>,
    pub assigned_to: Vec<Uuid>,
    pub team_leader: Option<Uuid>,
    pub status: ActionLogStatus,
    pub closure_approval_stage: ApprovalStage,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_by: Uuid,
    pub original_assigner: Option<Uuid>,
    /// Incremented by every persisted change
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActionLog {
    pub fn is_assignee(&self, user_id: Uuid) -> bool {
        self.assigned_to.contains(&user_id)
    }

    /// Case-insensitive match of `needle` against the log's text fields
    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        [
            Some(self.title.as_str()),
            self.description.as_deref(),
            Some(self.status.as_str()),
            Some(self.priority.as_str()),
            self.rejection_reason.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&needle))
    }
}

/// An action log as seen by a particular user
#[derive(Debug, Clone, Serialize)]
pub struct ActionLogView {
    #[serde(flatten)]
    pub log: ActionLog,
    pub can_approve: bool,
    pub comment_count: i64,
}

/// A comment on an action log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub action_log_id: Uuid,
    pub author_id: Uuid,
    #[serde(rename = "comment")]
    pub body: String,
    pub parent_id: Option<Uuid>,
    /// Status in effect when the comment was posted, for status-change entries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ActionLogStatus>,
    pub created_at: DateTime<Utc>,
}

/// A top-level comment with its replies
#[derive(Debug, Clone, Serialize)]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<Comment>,
}

/// One assignment (or re-assignment) of an action log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub id: Uuid,
    pub action_log_id: Uuid,
    pub assigned_by: Uuid,
    pub assigned_to: Vec<Uuid>,
    pub team_leader: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub action_log_id: Uuid,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// The requesting user together with server-computed authorization flags
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: User,
    pub can_approve_action_logs: bool,
    pub has_active_delegation: bool,
    pub is_currently_on_leave: bool,
    pub has_ag_cpap_designation: bool,
    /// Delegators whose authority this user currently exercises
    pub acting_for: Vec<Uuid>,
}

/// Paginated list envelope
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub count: usize,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// Request to create a new action log
#[derive(Debug, Deserialize)]
pub struct CreateActionLogRequest {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Priority,
    pub department_id: Uuid,
    #[serde(alias = "department_unit")]
    pub unit_id: Option<Uuid>,
    #[serde(default)]
    pub assigned_to: Vec<Uuid>,
    pub team_leader: Option<Uuid>,
}

/// Partial update of an action log
#[derive(Debug, Default, Deserialize)]
pub struct UpdateActionLogRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<NaiveDate>,
    pub status: Option<ActionLogStatus>,
    pub comment: Option<String>,
    pub assigned_to: Option<Vec<Uuid>>,
    /// Absent keeps the current leader, `null` clears it
    #[serde(default, deserialize_with = "present")]
    pub team_leader: Option<Option<Uuid>>,
}

/// Distinguish an explicit `null` from a missing field
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub assigned_to: Vec<Uuid>,
    pub team_leader: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveRequest {
    pub comment: Option<String>,
}

/// Rejection payload; older clients send the reason as `comment`
#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    #[serde(alias = "comment")]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct AddCommentRequest {
    pub comment: String,
    pub parent_id: Option<Uuid>,
}

/// Request to hand the caller's approval authority to another user
#[derive(Debug, Deserialize)]
pub struct CreateDelegationRequest {
    #[serde(alias = "delegated_to")]
    pub delegated_to_id: Uuid,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reason: DelegationReason,
}

/// Changes to an existing delegation; omitted fields are kept
#[derive(Debug, Default, Deserialize)]
pub struct UpdateDelegationRequest {
    pub expires_at: Option<DateTime<Utc>>,
    pub reason: Option<DelegationReason>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub role: Role,
    pub designation: Option<String>,
    #[serde(default)]
    pub authorities: AuthoritySet,
    pub department_id: Option<Uuid>,
    pub unit_id: Option<Uuid>,
}

/// Partial update of a user
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<Role>,
    #[serde(default, deserialize_with = "present")]
    pub designation: Option<Option<String>>,
    pub authorities: Option<AuthoritySet>,
    #[serde(default, deserialize_with = "present")]
    pub department_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "present")]
    pub unit_id: Option<Option<Uuid>>,
    pub is_active: Option<bool>,
}

impl UpdateUserRequest {
    /// Whether the request touches anything beyond the user's own contact details
    pub fn changes_privileges(&self) -> bool {
        self.role.is_some()
            || self.designation.is_some()
            || self.authorities.is_some()
            || self.department_id.is_some()
            || self.unit_id.is_some()
            || self.is_active.is_some()
    }
}

#[derive(Debug, Deserialize)]
pub struct DepartmentUnitQuery {
    pub department_unit: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CreateDepartmentRequest {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUnitRequest {
    pub department_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub unit_type: String,
    #[serde(default)]
    pub description: String,
}

/// Query parameters for listing action logs
#[derive(Debug, Default, Deserialize)]
pub struct ListActionLogsQuery {
    pub status: Option<ActionLogStatus>,
    pub unit_id: Option<Uuid>,
    pub assignee: Option<Uuid>,
    /// Free text matched against title, description, status, priority and rejection reason
    pub search: Option<String>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_strings() {
        for role in [
            Role::Economist,
            Role::SeniorEconomist,
            Role::PrincipalEconomist,
            Role::AssistantCommissioner,
            Role::Commissioner,
            Role::SuperAdmin,
        ] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("chief".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_visibility() {
        assert!(Role::Commissioner.can_view_all_logs());
        assert!(Role::SuperAdmin.can_view_all_logs());
        assert!(!Role::Economist.can_view_all_logs());
        assert!(Role::SuperAdmin.is_admin());
        assert!(!Role::Commissioner.is_admin());
    }

    #[test]
    fn test_priority_serializes_capitalized() {
        assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "\"High\"");
        assert_eq!("Low".parse::<Priority>().unwrap(), Priority::Low);
        assert!("low".parse::<Priority>().is_err());
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn test_status_and_stage_strings() {
        assert_eq!(
            serde_json::to_string(&ActionLogStatus::PendingApproval).unwrap(),
            "\"pending_approval\""
        );
        assert_eq!(
            "in_progress".parse::<ActionLogStatus>().unwrap(),
            ActionLogStatus::InProgress
        );
        assert_eq!(
            "assistant_commissioner".parse::<ApprovalStage>().unwrap(),
            ApprovalStage::AssistantCommissioner
        );
        assert!("approved".parse::<ApprovalStage>().is_err());
    }

    #[test]
    fn test_reject_request_accepts_comment_alias() {
        let req: RejectRequest = serde_json::from_str(r#"{"reason": "incomplete"}"#).unwrap();
        assert_eq!(req.reason, "incomplete");

        let req: RejectRequest = serde_json::from_str(r#"{"comment": "missing annex"}"#).unwrap();
        assert_eq!(req.reason, "missing annex");
    }

    #[test]
    fn test_update_request_distinguishes_null_team_leader() {
        let leader = Uuid::new_v4();
        let req: UpdateActionLogRequest = serde_json::from_str(r#"{"title": "x"}"#).unwrap();
        assert_eq!(req.team_leader, None);

        let req: UpdateActionLogRequest =
            serde_json::from_str(r#"{"team_leader": null}"#).unwrap();
        assert_eq!(req.team_leader, Some(None));

        let req: UpdateActionLogRequest =
            serde_json::from_value(serde_json::json!({ "team_leader": leader })).unwrap();
        assert_eq!(req.team_leader, Some(Some(leader)));
    }

    #[test]
    fn test_search_matches_text_fields_case_insensitively() {
        let now = Utc::now();
        let log = ActionLog {
            id: Uuid::new_v4(),
            title: "Budget Framework Paper".to_string(),
            description: Some("Draft for cabinet".to_string()),
            priority: Priority::High,
            due_date: None,
            department_id: Uuid::new_v4(),
            unit_id: None,
            assigned_to: vec![],
            team_leader: None,
            status: ActionLogStatus::InProgress,
            closure_approval_stage: ApprovalStage::Rejected,
            approved_by: None,
            approved_at: None,
            rejection_reason: Some("Missing revenue annex".to_string()),
            created_by: Uuid::new_v4(),
            original_assigner: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        for needle in ["framework", "CABINET", "in_progress", "high", "annex", "  "] {
            assert!(log.matches_search(needle), "{}", needle);
        }
        assert!(!log.matches_search("procurement"));
    }

    #[test]
    fn test_comment_serializes_body_as_comment() {
        let comment = Comment {
            id: Uuid::new_v4(),
            action_log_id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            body: "Looks good".to_string(),
            parent_id: None,
            status: None,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&comment).unwrap();
        assert_eq!(json["comment"], "Looks good");
        assert!(json.get("status").is_none());
    }
}
