//! Database store for action logs, users, comments and delegations

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    ActionLog, ActionLogStatus, AssignmentRecord, Comment, Department, Notification, Unit, User,
};
use crate::workflow::{Authority, AuthoritySet, Delegation};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Open a pool, creating the database file if needed
pub async fn connect(database_url: &str, max_connections: u32) -> std::result::Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
}

const ACTION_LOG_COLUMNS: &str = "id, title, description, priority, due_date, department_id, unit_id, \
    team_leader, status, closure_approval_stage, approved_by, approved_at, rejection_reason, \
    created_by, original_assigner, version, created_at, updated_at";

const USER_COLUMNS: &str = "id, username, email, first_name, last_name, role, designation, \
    authorities, department_id, unit_id, is_active, created_at, updated_at";

const DELEGATION_COLUMNS: &str =
    "id, delegated_by, delegated_to, delegated_at, expires_at, is_active, reason, created_at, updated_at";

/// Database store
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // User operations

    pub async fn create_user(&self, user: &User) -> Result<()> {
        let authorities = serde_json::to_string(&user.authorities)
            .map_err(|e| AppError::Internal(format!("Invalid authorities: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, first_name, last_name, role, designation,
                               authorities, department_id, unit_id, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role.as_str())
        .bind(&user.designation)
        .bind(authorities)
        .bind(user.department_id.map(|id| id.to_string()))
        .bind(user.unit_id.map(|id| id.to_string()))
        .bind(user.is_active)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    pub async fn get_user(&self, id: Uuid) -> Result<User> {
        self.find_user(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }

    /// Fetch several users, failing if any is missing
    pub async fn get_users(&self, ids: &[Uuid]) -> Result<Vec<User>> {
        let mut users = Vec::with_capacity(ids.len());
        for id in ids {
            users.push(self.get_user(*id).await?);
        }
        Ok(users)
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let sql = format!("SELECT {} FROM users ORDER BY username ASC", USER_COLUMNS);
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    pub async fn list_department_users(&self, department_id: Uuid) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE department_id = ? ORDER BY username ASC",
            USER_COLUMNS
        );
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(department_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    pub async fn update_user(&self, user: &User) -> Result<()> {
        let authorities = serde_json::to_string(&user.authorities)
            .map_err(|e| AppError::Internal(format!("Invalid authorities: {}", e)))?;

        let result = sqlx::query(
            r#"
            UPDATE users
            SET email = ?, first_name = ?, last_name = ?, role = ?, designation = ?, authorities = ?,
                department_id = ?, unit_id = ?, is_active = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role.as_str())
        .bind(&user.designation)
        .bind(authorities)
        .bind(user.department_id.map(|id| id.to_string()))
        .bind(user.unit_id.map(|id| id.to_string()))
        .bind(user.is_active)
        .bind(user.updated_at)
        .bind(user.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", user.id)));
        }
        Ok(())
    }

    pub async fn list_unit_users(&self, unit_id: Uuid) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE unit_id = ? ORDER BY username ASC",
            USER_COLUMNS
        );
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(unit_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    /// Whether an active member of the unit holds `authority` outright
    pub async fn unit_has_holder(&self, unit_id: Uuid, authority: Authority) -> Result<bool> {
        Ok(self
            .list_unit_users(unit_id)
            .await?
            .iter()
            .any(|u| u.is_active && u.authorities.has(authority)))
    }

    // Department operations

    pub async fn create_department(&self, department: &Department) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO departments (id, name, code, description, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(department.id.to_string())
        .bind(&department.name)
        .bind(&department.code)
        .bind(&department.description)
        .bind(department.created_at)
        .bind(department.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_department(&self, id: Uuid) -> Result<Department> {
        let row = sqlx::query_as::<_, DepartmentRow>(
            r#"
            SELECT id, name, code, description, created_at, updated_at
            FROM departments
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Department {} not found", id)))?;

        row.try_into()
    }

    pub async fn list_departments(&self) -> Result<Vec<Department>> {
        let rows = sqlx::query_as::<_, DepartmentRow>(
            r#"
            SELECT id, name, code, description, created_at, updated_at
            FROM departments
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    pub async fn create_unit(&self, unit: &Unit) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO units (id, department_id, name, unit_type, description, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(unit.id.to_string())
        .bind(unit.department_id.to_string())
        .bind(&unit.name)
        .bind(&unit.unit_type)
        .bind(&unit.description)
        .bind(unit.created_at)
        .bind(unit.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_unit(&self, id: Uuid) -> Result<Unit> {
        let row = sqlx::query_as::<_, UnitRow>(
            r#"
            SELECT id, department_id, name, unit_type, description, created_at, updated_at
            FROM units
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Unit {} not found", id)))?;

        row.try_into()
    }

    pub async fn list_department_units(&self, department_id: Uuid) -> Result<Vec<Unit>> {
        let rows = sqlx::query_as::<_, UnitRow>(
            r#"
            SELECT id, department_id, name, unit_type, description, created_at, updated_at
            FROM units
            WHERE department_id = ?
            ORDER BY name ASC
            "#,
        )
        .bind(department_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    pub async fn list_units(&self) -> Result<Vec<Unit>> {
        let rows = sqlx::query_as::<_, UnitRow>(
            r#"
            SELECT id, department_id, name, unit_type, description, created_at, updated_at
            FROM units
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    // Action log operations

    /// Insert a new log with its assignees and, if it was assigned on creation, the history entry
    pub async fn insert_action_log(
        &self,
        log: &ActionLog,
        history: Option<&AssignmentRecord>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO action_logs (id, title, description, priority, due_date, department_id, unit_id,
                                     team_leader, status, closure_approval_stage, approved_by, approved_at,
                                     rejection_reason, created_by, original_assigner, version, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(log.id.to_string())
        .bind(&log.title)
        .bind(&log.description)
        .bind(log.priority.as_str())
        .bind(log.due_date)
        .bind(log.department_id.to_string())
        .bind(log.unit_id.map(|id| id.to_string()))
        .bind(log.team_leader.map(|id| id.to_string()))
        .bind(log.status.as_str())
        .bind(log.closure_approval_stage.as_str())
        .bind(log.approved_by.map(|id| id.to_string()))
        .bind(log.approved_at)
        .bind(&log.rejection_reason)
        .bind(log.created_by.to_string())
        .bind(log.original_assigner.map(|id| id.to_string()))
        .bind(log.version)
        .bind(log.created_at)
        .bind(log.updated_at)
        .execute(&mut *tx)
        .await?;

        write_assignees(&mut *tx, log).await?;
        if let Some(record) = history {
            insert_assignment_record(&mut *tx, record).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_action_log(&self, id: Uuid) -> Result<ActionLog> {
        let sql = format!("SELECT {} FROM action_logs WHERE id = ?", ACTION_LOG_COLUMNS);
        let row = sqlx::query_as::<_, ActionLogRow>(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Action log {} not found", id)))?;

        let assignees = sqlx::query_as::<_, (String,)>(
            r#"
            SELECT user_id FROM action_log_assignees
            WHERE action_log_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(user_id,)| parse_uuid(&user_id, "assignee"))
        .collect::<Result<Vec<_>>>()?;

        row.into_log(assignees)
    }

    /// All logs, most recently updated first
    pub async fn list_action_logs(&self) -> Result<Vec<ActionLog>> {
        let sql = format!(
            "SELECT {} FROM action_logs ORDER BY updated_at DESC",
            ACTION_LOG_COLUMNS
        );
        let rows = sqlx::query_as::<_, ActionLogRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        let assignee_rows = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT action_log_id, user_id FROM action_log_assignees
            ORDER BY action_log_id, position ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut assignees: HashMap<String, Vec<Uuid>> = HashMap::new();
        for (log_id, user_id) in assignee_rows {
            assignees
                .entry(log_id)
                .or_default()
                .push(parse_uuid(&user_id, "assignee")?);
        }

        rows.into_iter()
            .map(|row| {
                let ids = assignees.remove(&row.id).unwrap_or_default();
                row.into_log(ids)
            })
            .collect()
    }

    /// Persist a change to `log` if nobody has written it since it was read.
    ///
    /// The update, the assignee list, the audit comment and the history entry
    /// are written in one transaction. A write made after `log` was loaded
    /// yields `Conflict`; on success `log.version` is advanced.
    pub async fn save_transition(
        &self,
        log: &mut ActionLog,
        comment: Option<&Comment>,
        history: Option<&AssignmentRecord>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE action_logs
            SET title = ?, description = ?, priority = ?, due_date = ?, team_leader = ?,
                status = ?, closure_approval_stage = ?, approved_by = ?, approved_at = ?,
                rejection_reason = ?, original_assigner = ?, updated_at = ?, version = version + 1
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(&log.title)
        .bind(&log.description)
        .bind(log.priority.as_str())
        .bind(log.due_date)
        .bind(log.team_leader.map(|id| id.to_string()))
        .bind(log.status.as_str())
        .bind(log.closure_approval_stage.as_str())
        .bind(log.approved_by.map(|id| id.to_string()))
        .bind(log.approved_at)
        .bind(&log.rejection_reason)
        .bind(log.original_assigner.map(|id| id.to_string()))
        .bind(log.updated_at)
        .bind(log.id.to_string())
        .bind(log.version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "Action log {} changed concurrently; reload and retry",
                log.id
            )));
        }

        write_assignees(&mut *tx, log).await?;
        if let Some(comment) = comment {
            insert_comment(&mut *tx, comment).await?;
        }
        if let Some(record) = history {
            insert_assignment_record(&mut *tx, record).await?;
        }

        tx.commit().await?;
        log.version += 1;
        Ok(())
    }

    // Comment operations

    pub async fn add_comment(&self, comment: &Comment) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        insert_comment(&mut *conn, comment).await
    }

    pub async fn get_comment(&self, id: Uuid) -> Result<Comment> {
        let row = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT id, action_log_id, author_id, body, parent_id, status, created_at
            FROM comments
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Comment {} not found", id)))?;

        row.try_into()
    }

    /// Comments on a log, newest first
    pub async fn list_comments(&self, action_log_id: Uuid) -> Result<Vec<Comment>> {
        let rows = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT id, action_log_id, author_id, body, parent_id, status, created_at
            FROM comments
            WHERE action_log_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(action_log_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    pub async fn comment_counts(&self) -> Result<HashMap<Uuid, i64>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT action_log_id, COUNT(*) FROM comments
            GROUP BY action_log_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, count)| Ok((parse_uuid(&id, "action_log_id")?, count)))
            .collect()
    }

    // Delegation operations

    /// Insert `delegation`, deactivating every active delegation from the same delegator.
    ///
    /// Returns the ids of the delegations that were replaced.
    pub async fn replace_delegation(&self, delegation: &Delegation) -> Result<Vec<Uuid>> {
        let mut tx = self.pool.begin().await?;

        let replaced = sqlx::query_as::<_, (String,)>(
            r#"
            SELECT id FROM delegations
            WHERE delegated_by = ? AND is_active = 1
            "#,
        )
        .bind(delegation.delegated_by.to_string())
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(|(id,)| parse_uuid(&id, "delegation"))
        .collect::<Result<Vec<_>>>()?;

        sqlx::query(
            r#"
            UPDATE delegations
            SET is_active = 0, updated_at = ?
            WHERE delegated_by = ? AND is_active = 1
            "#,
        )
        .bind(delegation.created_at)
        .bind(delegation.delegated_by.to_string())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO delegations (id, delegated_by, delegated_to, delegated_at, expires_at,
                                     is_active, reason, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(delegation.id.to_string())
        .bind(delegation.delegated_by.to_string())
        .bind(delegation.delegated_to.to_string())
        .bind(delegation.delegated_at)
        .bind(delegation.expires_at)
        .bind(delegation.is_active)
        .bind(delegation.reason.as_str())
        .bind(delegation.created_at)
        .bind(delegation.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(replaced)
    }

    pub async fn get_delegation(&self, id: Uuid) -> Result<Delegation> {
        let sql = format!("SELECT {} FROM delegations WHERE id = ?", DELEGATION_COLUMNS);
        let row = sqlx::query_as::<_, DelegationRow>(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Delegation {} not found", id)))?;

        row.try_into()
    }

    pub async fn deactivate_delegation(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE delegations
            SET is_active = 0, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn update_delegation(&self, delegation: &Delegation) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE delegations
            SET expires_at = ?, reason = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(delegation.expires_at)
        .bind(delegation.reason.as_str())
        .bind(delegation.updated_at)
        .bind(delegation.id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete_delegation(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM delegations WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Delegation {} not found", id)));
        }
        Ok(())
    }

    /// Delegations flagged active from `delegator`, regardless of expiry
    pub async fn active_delegations_by(&self, delegator: Uuid) -> Result<Vec<Delegation>> {
        let sql = format!(
            "SELECT {} FROM delegations WHERE delegated_by = ? AND is_active = 1 ORDER BY created_at DESC",
            DELEGATION_COLUMNS
        );
        let rows = sqlx::query_as::<_, DelegationRow>(&sql)
            .bind(delegator.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    /// Delegations flagged active to `delegate`, regardless of expiry
    pub async fn active_delegations_to(&self, delegate: Uuid) -> Result<Vec<Delegation>> {
        let sql = format!(
            "SELECT {} FROM delegations WHERE delegated_to = ? AND is_active = 1 ORDER BY created_at DESC",
            DELEGATION_COLUMNS
        );
        let rows = sqlx::query_as::<_, DelegationRow>(&sql)
            .bind(delegate.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    /// Delegations given or received by `user`, newest first
    pub async fn delegations_involving(&self, user: Uuid) -> Result<Vec<Delegation>> {
        let sql = format!(
            "SELECT {} FROM delegations WHERE delegated_by = ? OR delegated_to = ? ORDER BY created_at DESC, rowid DESC",
            DELEGATION_COLUMNS
        );
        let rows = sqlx::query_as::<_, DelegationRow>(&sql)
            .bind(user.to_string())
            .bind(user.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    pub async fn list_delegations(&self) -> Result<Vec<Delegation>> {
        let sql = format!(
            "SELECT {} FROM delegations ORDER BY created_at DESC, rowid DESC",
            DELEGATION_COLUMNS
        );
        let rows = sqlx::query_as::<_, DelegationRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    // Assignment history

    pub async fn list_assignment_history(&self, action_log_id: Uuid) -> Result<Vec<AssignmentRecord>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(
            r#"
            SELECT id, action_log_id, assigned_by, assigned_to, team_leader, created_at
            FROM assignment_history
            WHERE action_log_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(action_log_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    // Notifications

    pub async fn insert_notifications(&self, notifications: &[Notification]) -> Result<()> {
        if notifications.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for n in notifications {
            sqlx::query(
                r#"
                INSERT INTO notifications (id, user_id, action_log_id, message, is_read, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(n.id.to_string())
            .bind(n.user_id.to_string())
            .bind(n.action_log_id.to_string())
            .bind(&n.message)
            .bind(n.is_read)
            .bind(n.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn unread_notification_count(&self, user_id: Uuid, action_log_id: Uuid) -> Result<i64> {
        let (count,) = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT COUNT(*) FROM notifications
            WHERE user_id = ? AND action_log_id = ? AND is_read = 0
            "#,
        )
        .bind(user_id.to_string())
        .bind(action_log_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Mark a user's notifications for a log as read; returns how many changed
    pub async fn mark_notifications_read(&self, user_id: Uuid, action_log_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = 1
            WHERE user_id = ? AND action_log_id = ? AND is_read = 0
            "#,
        )
        .bind(user_id.to_string())
        .bind(action_log_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

async fn write_assignees(conn: &mut SqliteConnection, log: &ActionLog) -> Result<()> {
    sqlx::query("DELETE FROM action_log_assignees WHERE action_log_id = ?")
        .bind(log.id.to_string())
        .execute(&mut *conn)
        .await?;

    for (position, user_id) in log.assigned_to.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO action_log_assignees (action_log_id, user_id, position)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(log.id.to_string())
        .bind(user_id.to_string())
        .bind(position as i64)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn insert_comment(conn: &mut SqliteConnection, comment: &Comment) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO comments (id, action_log_id, author_id, body, parent_id, status, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(comment.id.to_string())
    .bind(comment.action_log_id.to_string())
    .bind(comment.author_id.to_string())
    .bind(&comment.body)
    .bind(comment.parent_id.map(|id| id.to_string()))
    .bind(comment.status.map(|s| s.as_str()))
    .bind(comment.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn insert_assignment_record(conn: &mut SqliteConnection, record: &AssignmentRecord) -> Result<()> {
    let assigned_to = serde_json::to_string(&record.assigned_to)
        .map_err(|e| AppError::Internal(format!("Invalid assignee list: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO assignment_history (id, action_log_id, assigned_by, assigned_to, team_leader, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.id.to_string())
    .bind(record.action_log_id.to_string())
    .bind(record.assigned_by.to_string())
    .bind(assigned_to)
    .bind(record.team_leader.map(|id| id.to_string()))
    .bind(record.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

fn parse_uuid(value: &str, field: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| AppError::Internal(format!("Invalid {} UUID: {}", field, e)))
}

fn parse_opt_uuid(value: Option<String>, field: &str) -> Result<Option<Uuid>> {
    value.map(|v| parse_uuid(&v, field)).transpose()
}

fn parse_column<T: FromStr<Err = String>>(value: &str) -> Result<T> {
    value.parse().map_err(AppError::Internal)
}

// Internal row types for sqlx

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    role: String,
    designation: Option<String>,
    authorities: String,
    department_id: Option<String>,
    unit_id: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self> {
        let authorities: AuthoritySet = serde_json::from_str(&row.authorities)
            .map_err(|e| AppError::Internal(format!("Invalid authorities: {}", e)))?;

        Ok(User {
            id: parse_uuid(&row.id, "user")?,
            username: row.username,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            role: parse_column(&row.role)?,
            designation: row.designation,
            authorities,
            department_id: parse_opt_uuid(row.department_id, "department_id")?,
            unit_id: parse_opt_uuid(row.unit_id, "unit_id")?,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DepartmentRow {
    id: String,
    name: String,
    code: String,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DepartmentRow> for Department {
    type Error = AppError;

    fn try_from(row: DepartmentRow) -> Result<Self> {
        Ok(Department {
            id: parse_uuid(&row.id, "department")?,
            name: row.name,
            code: row.code,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UnitRow {
    id: String,
    department_id: String,
    name: String,
    unit_type: String,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UnitRow> for Unit {
    type Error = AppError;

    fn try_from(row: UnitRow) -> Result<Self> {
        Ok(Unit {
            id: parse_uuid(&row.id, "unit")?,
            department_id: parse_uuid(&row.department_id, "department_id")?,
            name: row.name,
            unit_type: row.unit_type,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ActionLogRow {
    id: String,
    title: String,
    description: Option<String>,
    priority: String,
    due_date: Option<NaiveDate>,
    department_id: String,
    unit_id: Option<String>,
    team_leader: Option<String>,
    status: String,
    closure_approval_stage: String,
    approved_by: Option<String>,
    approved_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    created_by: String,
    original_assigner: Option<String>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ActionLogRow {
    fn into_log(self, assigned_to: Vec<Uuid>) -> Result<ActionLog> {
        Ok(ActionLog {
            id: parse_uuid(&self.id, "action_log")?,
            title: self.title,
            description: self.description,
            priority: parse_column(&self.priority)?,
            due_date: self.due_date,
            department_id: parse_uuid(&self.department_id, "department_id")?,
            unit_id: parse_opt_uuid(self.unit_id, "unit_id")?,
            assigned_to,
            team_leader: parse_opt_uuid(self.team_leader, "team_leader")?,
            status: parse_column(&self.status)?,
            closure_approval_stage: parse_column(&self.closure_approval_stage)?,
            approved_by: parse_opt_uuid(self.approved_by, "approved_by")?,
            approved_at: self.approved_at,
            rejection_reason: self.rejection_reason,
            created_by: parse_uuid(&self.created_by, "created_by")?,
            original_assigner: parse_opt_uuid(self.original_assigner, "original_assigner")?,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: String,
    action_log_id: String,
    author_id: String,
    body: String,
    parent_id: Option<String>,
    status: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<CommentRow> for Comment {
    type Error = AppError;

    fn try_from(row: CommentRow) -> Result<Self> {
        Ok(Comment {
            id: parse_uuid(&row.id, "comment")?,
            action_log_id: parse_uuid(&row.action_log_id, "action_log_id")?,
            author_id: parse_uuid(&row.author_id, "author_id")?,
            body: row.body,
            parent_id: parse_opt_uuid(row.parent_id, "parent_id")?,
            status: row
                .status
                .map(|s| parse_column::<ActionLogStatus>(&s))
                .transpose()?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DelegationRow {
    id: String,
    delegated_by: String,
    delegated_to: String,
    delegated_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    is_active: bool,
    reason: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DelegationRow> for Delegation {
    type Error = AppError;

    fn try_from(row: DelegationRow) -> Result<Self> {
        Ok(Delegation {
            id: parse_uuid(&row.id, "delegation")?,
            delegated_by: parse_uuid(&row.delegated_by, "delegated_by")?,
            delegated_to: parse_uuid(&row.delegated_to, "delegated_to")?,
            delegated_at: row.delegated_at,
            expires_at: row.expires_at,
            is_active: row.is_active,
            reason: parse_column(&row.reason)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AssignmentRow {
    id: String,
    action_log_id: String,
    assigned_by: String,
    assigned_to: String,
    team_leader: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AssignmentRow> for AssignmentRecord {
    type Error = AppError;

    fn try_from(row: AssignmentRow) -> Result<Self> {
        let assigned_to: Vec<Uuid> = serde_json::from_str(&row.assigned_to)
            .map_err(|e| AppError::Internal(format!("Invalid assignee list: {}", e)))?;

        Ok(AssignmentRecord {
            id: parse_uuid(&row.id, "assignment")?,
            action_log_id: parse_uuid(&row.action_log_id, "action_log_id")?,
            assigned_by: parse_uuid(&row.assigned_by, "assigned_by")?,
            assigned_to,
            team_leader: parse_opt_uuid(row.team_leader, "team_leader")?,
            created_at: row.created_at,
        })
    }
}
