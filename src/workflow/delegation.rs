//! Delegation of approval authority
//!
//! A delegation hands every authority its delegator holds to a single delegate
//! until it is revoked, deleted or expires. Expiry is never written back: a
//! record is effective while `is_active` is set and `expires_at` has not
//! passed, evaluated against the clock at the moment of each request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::authority::Authority;
use super::WorkflowError;
use crate::models::{ActionLog, User};

/// Why authority was handed off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationReason {
    #[default]
    Leave,
    Other,
}

impl DelegationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DelegationReason::Leave => "leave",
            DelegationReason::Other => "other",
        }
    }
}

impl std::str::FromStr for DelegationReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "leave" => Ok(DelegationReason::Leave),
            "other" => Ok(DelegationReason::Other),
            _ => Err(format!("Invalid delegation reason: {}", s)),
        }
    }
}

/// Derived state of a delegation at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationState {
    Active,
    Expired,
    Revoked,
}

/// A temporary grant of one user's approval authority to another
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delegation {
    pub id: Uuid,
    pub delegated_by: Uuid,
    pub delegated_to: Uuid,
    pub delegated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub reason: DelegationReason,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Delegation {
    pub fn new(
        delegated_by: Uuid,
        delegated_to: Uuid,
        expires_at: Option<DateTime<Utc>>,
        reason: DelegationReason,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            delegated_by,
            delegated_to,
            delegated_at: now,
            expires_at,
            is_active: true,
            reason,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this delegation currently transfers authority
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.map_or(true, |expires| expires >= now)
    }

    pub fn state(&self, now: DateTime<Utc>) -> DelegationState {
        if !self.is_active {
            DelegationState::Revoked
        } else if self.is_effective(now) {
            DelegationState::Active
        } else {
            DelegationState::Expired
        }
    }

    /// Deactivate; returns false if it was already inactive
    pub fn revoke(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        self.is_active = false;
        self.updated_at = now;
        true
    }
}

/// A delegation together with its state at read time
#[derive(Debug, Clone, Serialize)]
pub struct DelegationView {
    #[serde(flatten)]
    pub delegation: Delegation,
    pub state: DelegationState,
}

impl DelegationView {
    pub fn at(delegation: Delegation, now: DateTime<Utc>) -> Self {
        let state = delegation.state(now);
        Self { delegation, state }
    }
}

/// Check the rules for handing `delegator`'s authority to `delegate`
pub fn validate_new(
    delegator: &User,
    delegate: &User,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    if delegator.authorities.is_empty() {
        return Err(WorkflowError::NotAuthorized(
            "Only holders of an approval authority can delegate it".to_string(),
        ));
    }
    if delegator.id == delegate.id {
        return Err(WorkflowError::Validation(
            "Cannot delegate authority to yourself".to_string(),
        ));
    }
    if !delegate.is_active {
        return Err(WorkflowError::Validation(format!(
            "User {} is not active",
            delegate.id
        )));
    }
    if let Some(expires) = expires_at {
        if expires <= now {
            return Err(WorkflowError::Validation(
                "expires_at must be in the future".to_string(),
            ));
        }
    }
    Ok(())
}

/// Current holder of `holder`'s authority given their outgoing delegations
pub fn resolve_holder(holder: Uuid, outgoing: &[Delegation], now: DateTime<Utc>) -> Uuid {
    outgoing
        .iter()
        .filter(|d| d.delegated_by == holder)
        .find(|d| d.is_effective(now))
        .map(|d| d.delegated_to)
        .unwrap_or(holder)
}

/// Authority exercisable by an actor, with the scope it applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grant {
    pub authority: Authority,
    pub unit_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    /// Set when the authority is exercised on behalf of a delegator
    pub on_behalf_of: Option<Uuid>,
}

impl Grant {
    fn from_holder(holder: &User, authority: Authority, on_behalf_of: Option<Uuid>) -> Self {
        Self {
            authority,
            unit_id: holder.unit_id,
            department_id: holder.department_id,
            on_behalf_of,
        }
    }

    /// Whether this grant reaches the given log
    pub fn covers(&self, log: &ActionLog) -> bool {
        match self.authority {
            Authority::UnitHead => self.unit_id.is_some() && self.unit_id == log.unit_id,
            Authority::AssistantCommissioner | Authority::Commissioner => self
                .department_id
                .map_or(true, |department| department == log.department_id),
        }
    }
}

/// A user with their effective grants resolved against live delegations
#[derive(Debug, Clone)]
pub struct Actor {
    pub user: User,
    pub grants: Vec<Grant>,
    /// True while the user has an effective outgoing delegation
    pub on_leave: bool,
}

impl Actor {
    /// Resolve grants from the user's own authorities and incoming delegations.
    ///
    /// `incoming` pairs each delegation to this user with its delegator.
    pub fn resolve(
        user: User,
        outgoing: &[Delegation],
        incoming: &[(Delegation, User)],
        now: DateTime<Utc>,
    ) -> Self {
        let on_leave = resolve_holder(user.id, outgoing, now) != user.id;

        let mut grants = Vec::new();
        if !on_leave {
            grants.extend(
                user.authorities
                    .iter()
                    .map(|authority| Grant::from_holder(&user, authority, None)),
            );
        }
        for (delegation, delegator) in incoming {
            if delegation.delegated_to != user.id || !delegation.is_effective(now) {
                continue;
            }
            grants.extend(delegator.authorities.iter().map(|authority| {
                Grant::from_holder(delegator, authority, Some(delegator.id))
            }));
        }

        Self {
            user,
            grants,
            on_leave,
        }
    }

    /// An actor with only their own authorities, ignoring delegation
    pub fn without_delegations(user: User) -> Self {
        Self::resolve(user, &[], &[], Utc::now())
    }

    pub fn id(&self) -> Uuid {
        self.user.id
    }

    pub fn is_admin(&self) -> bool {
        self.user.role.is_admin()
    }

    /// The grant that lets this actor act as `authority` on `log`
    pub fn grant_for(&self, authority: Authority, log: &ActionLog) -> Option<&Grant> {
        self.grants
            .iter()
            .find(|g| g.authority == authority && g.covers(log))
    }

    /// Whether any grant reaches the log
    pub fn covers(&self, log: &ActionLog) -> bool {
        self.grants.iter().any(|g| g.covers(log))
    }

    pub fn holds(&self, authority: Authority) -> bool {
        self.grants.iter().any(|g| g.authority == authority)
    }

    pub fn can_approve_anything(&self) -> bool {
        !self.grants.is_empty()
    }

    /// Delegators whose authority this actor is exercising
    pub fn acting_for(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.grants.iter().filter_map(|g| g.on_behalf_of).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionLogStatus, ApprovalStage, Priority, Role};
    use chrono::Duration;

    fn make_user(role: Role, authorities: Vec<Authority>, department: Uuid) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            username: format!("user-{}", Uuid::new_v4()),
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            role,
            designation: None,
            authorities: authorities.into(),
            department_id: Some(department),
            unit_id: Some(Uuid::new_v4()),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn make_log(department: Uuid, unit: Option<Uuid>) -> ActionLog {
        let now = Utc::now();
        ActionLog {
            id: Uuid::new_v4(),
            title: "Budget review".to_string(),
            description: None,
            priority: Priority::Medium,
            due_date: None,
            department_id: department,
            unit_id: unit,
            assigned_to: vec![],
            team_leader: None,
            status: ActionLogStatus::PendingApproval,
            closure_approval_stage: ApprovalStage::Commissioner,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            created_by: Uuid::new_v4(),
            original_assigner: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_effective_until_expiry() {
        let now = Utc::now();
        let d = Delegation::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Some(now + Duration::hours(1)),
            DelegationReason::Leave,
            now,
        );
        assert!(d.is_effective(now));
        assert!(d.is_effective(now + Duration::hours(1)));
        assert!(!d.is_effective(now + Duration::hours(1) + Duration::seconds(1)));
        assert_eq!(d.state(now), DelegationState::Active);
        assert_eq!(d.state(now + Duration::hours(2)), DelegationState::Expired);
    }

    #[test]
    fn test_open_ended_delegation_never_expires() {
        let now = Utc::now();
        let d = Delegation::new(Uuid::new_v4(), Uuid::new_v4(), None, DelegationReason::Other, now);
        assert!(d.is_effective(now + Duration::days(3650)));
    }

    #[test]
    fn test_revoke_is_idempotent() {
        let now = Utc::now();
        let mut d = Delegation::new(Uuid::new_v4(), Uuid::new_v4(), None, DelegationReason::Leave, now);
        assert!(d.revoke(now));
        assert!(!d.revoke(now));
        assert_eq!(d.state(now), DelegationState::Revoked);
        assert!(!d.is_effective(now));
    }

    #[test]
    fn test_resolve_holder_falls_back_after_expiry() {
        let now = Utc::now();
        let holder = Uuid::new_v4();
        let delegate = Uuid::new_v4();
        let d = Delegation::new(
            holder,
            delegate,
            Some(now + Duration::hours(1)),
            DelegationReason::Leave,
            now,
        );
        let outgoing = vec![d];

        assert_eq!(resolve_holder(holder, &outgoing, now), delegate);
        assert_eq!(
            resolve_holder(holder, &outgoing, now + Duration::hours(2)),
            holder
        );
        assert_eq!(resolve_holder(holder, &[], now), holder);
    }

    #[test]
    fn test_validate_new_requires_authority() {
        let department = Uuid::new_v4();
        let now = Utc::now();
        let economist = make_user(Role::Economist, vec![], department);
        let other = make_user(Role::Economist, vec![], department);
        let err = validate_new(&economist, &other, None, now).unwrap_err();
        assert!(matches!(err, WorkflowError::NotAuthorized(_)));

        let commissioner = make_user(Role::Commissioner, vec![Authority::Commissioner], department);
        assert!(validate_new(&commissioner, &other, None, now).is_ok());
        assert!(matches!(
            validate_new(&commissioner, &commissioner, None, now),
            Err(WorkflowError::Validation(_))
        ));
        assert!(matches!(
            validate_new(&commissioner, &other, Some(now - Duration::minutes(1)), now),
            Err(WorkflowError::Validation(_))
        ));
    }

    #[test]
    fn test_actor_on_leave_loses_own_grants() {
        let department = Uuid::new_v4();
        let now = Utc::now();
        let commissioner = make_user(Role::Commissioner, vec![Authority::Commissioner], department);
        let deputy = make_user(Role::AssistantCommissioner, vec![Authority::AssistantCommissioner], department);
        let d = Delegation::new(
            commissioner.id,
            deputy.id,
            Some(now + Duration::hours(1)),
            DelegationReason::Leave,
            now,
        );
        let log = make_log(department, None);

        let away = Actor::resolve(commissioner.clone(), &[d.clone()], &[], now);
        assert!(away.on_leave);
        assert!(away.grant_for(Authority::Commissioner, &log).is_none());

        let acting = Actor::resolve(deputy.clone(), &[], &[(d.clone(), commissioner.clone())], now);
        let grant = acting.grant_for(Authority::Commissioner, &log).unwrap();
        assert_eq!(grant.on_behalf_of, Some(commissioner.id));
        assert!(acting.holds(Authority::AssistantCommissioner));
        assert_eq!(acting.acting_for(), vec![commissioner.id]);

        // after expiry both revert
        let later = now + Duration::hours(2);
        let back = Actor::resolve(commissioner, &[d.clone()], &[], later);
        assert!(!back.on_leave);
        assert!(back.grant_for(Authority::Commissioner, &log).is_some());
        let deputy_later = Actor::resolve(deputy, &[], &[(d, back.user.clone())], later);
        assert!(!deputy_later.holds(Authority::Commissioner));
    }

    #[test]
    fn test_unit_head_grant_scoped_to_unit() {
        let department = Uuid::new_v4();
        let head = make_user(Role::PrincipalEconomist, vec![Authority::UnitHead], department);
        let actor = Actor::without_delegations(head.clone());

        let own_unit = make_log(department, head.unit_id);
        let other_unit = make_log(department, Some(Uuid::new_v4()));
        let no_unit = make_log(department, None);

        assert!(actor.grant_for(Authority::UnitHead, &own_unit).is_some());
        assert!(actor.grant_for(Authority::UnitHead, &other_unit).is_none());
        assert!(actor.grant_for(Authority::UnitHead, &no_unit).is_none());
    }

    #[test]
    fn test_department_scope() {
        let department = Uuid::new_v4();
        let ac = make_user(
            Role::AssistantCommissioner,
            vec![Authority::AssistantCommissioner],
            department,
        );
        let actor = Actor::without_delegations(ac);
        assert!(actor.covers(&make_log(department, None)));
        assert!(!actor.covers(&make_log(Uuid::new_v4(), None)));
    }
}
