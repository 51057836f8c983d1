use chrono::{Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::deserialize::row::DeserializeRow;
use scylla::serialize::row::SerializeRow;
use scylla::statement::batch::{Batch, BatchType};
use scylla::value::{CqlValue, Row};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{ActivityEntry, ActivityLogRow, AdminRow};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

mod finance;
mod gyms;
mod messaging;
mod people;

pub use finance::NewMembership;

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?
        .to_string();

    Ok(password_hash)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash format: {}", e)))?;

    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed_hash).is_ok())
}

pub(crate) const INSERT_ACTIVITY: &str = "INSERT INTO activity_log \
    (log_id, actor_id, actor_type, action, details, ip_address, user_agent, created_ts) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)";

type ActivityValues = (
    Uuid,
    Option<Uuid>,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    chrono::DateTime<Utc>,
);

pub(crate) fn activity_values(entry: &ActivityEntry) -> ActivityValues {
    (
        Uuid::new_v4(),
        entry.actor_id,
        entry.actor_type.clone(),
        entry.action.clone(),
        entry.details.clone(),
        entry.ip_address.clone(),
        entry.user_agent.clone(),
        Utc::now(),
    )
}

pub(crate) fn logged_batch(statements: &[&str]) -> Batch {
    let mut batch = Batch::new(BatchType::Logged);
    for statement in statements {
        batch.append_statement(*statement);
    }
    batch
}

/// A lookup that must have found its row; `what` names it in the message.
pub(crate) fn require<T>(row: Option<T>, what: &str) -> Result<T> {
    row.ok_or_else(|| AppError::NotFound(format!("{} not found.", what)))
}

#[derive(Debug, Clone)]
pub struct ScyllaConnector {
    session: Arc<Session>,
}

impl ScyllaConnector {
    pub async fn new(nodes: &[String], user: &str, password: &str) -> Result<Self> {
        let session = SessionBuilder::new()
            .known_nodes(nodes)
            .user(user, password)
            .build()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to connect to Scylla: {}", e)))?;
        tracing::info!("Connected to Scylla nodes {:?}", nodes);
        Ok(Self {
            session: Arc::new(session),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Makes `keyspace` the default for every following statement.
    pub async fn use_keyspace(&self, keyspace: &str) -> Result<()> {
        self.session
            .use_keyspace(keyspace, false)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to use keyspace {}: {}", keyspace, e)))
    }

    pub(crate) async fn select<R>(&self, cql: &str, values: impl SerializeRow) -> Result<Vec<R>>
    where
        R: for<'frame, 'metadata> DeserializeRow<'frame, 'metadata>,
    {
        let rows = self
            .session
            .query_unpaged(cql, values)
            .await?
            .into_rows_result()?;
        let typed = rows
            .rows::<R>()?
            .collect::<std::result::Result<Vec<R>, _>>()?;
        Ok(typed)
    }

    pub(crate) async fn select_one<R>(&self, cql: &str, values: impl SerializeRow) -> Result<Option<R>>
    where
        R: for<'frame, 'metadata> DeserializeRow<'frame, 'metadata>,
    {
        Ok(self.select::<R>(cql, values).await?.into_iter().next())
    }

    pub(crate) async fn execute(&self, cql: &str, values: impl SerializeRow) -> Result<()> {
        self.session.query_unpaged(cql, values).await?;
        Ok(())
    }

    /// Runs a lightweight transaction (`... IF ...`) and reports whether it
    /// was applied. The first result column is always `[applied]`.
    pub(crate) async fn execute_conditional(&self, cql: &str, values: impl SerializeRow) -> Result<bool> {
        let rows = self
            .session
            .query_unpaged(cql, values)
            .await?
            .into_rows_result()?;
        let first = rows.rows::<Row>()?.next().transpose()?;
        let applied = first.and_then(|row| row.columns.into_iter().next()).flatten();
        Ok(matches!(applied, Some(CqlValue::Boolean(true))))
    }

    pub(crate) async fn count(&self, table: &str) -> Result<i64> {
        let cql = format!("SELECT COUNT(*) FROM {}", table);
        let counted: Option<(i64,)> = self.select_one(&cql, ()).await?;
        Ok(counted.map(|c| c.0).unwrap_or(0))
    }

    /// Runs `statement` together with an activity log row as one logged batch.
    pub(crate) async fn execute_logged(
        &self,
        statement: &str,
        values: impl SerializeRow,
        activity: &ActivityEntry,
    ) -> Result<()> {
        let batch = logged_batch(&[statement, INSERT_ACTIVITY]);
        self.session
            .batch(&batch, (values, activity_values(activity)))
            .await?;
        Ok(())
    }

    // ---- admins ----

    pub async fn count_admins(&self) -> Result<i64> {
        self.count("admin").await
    }

    pub async fn create_admin(&self, email: &str, password: &str, full_name: &str) -> Result<Uuid> {
        let email = email.trim().to_lowercase();
        if self.get_admin_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict(format!("Email {} is already registered", email)));
        }

        let admin_id = Uuid::new_v4();
        let password_hash = hash_password(password)?;
        let batch = logged_batch(&[
            "INSERT INTO admin (admin_id, email, password_hash, full_name, created_ts) VALUES (?, ?, ?, ?, ?)",
            "INSERT INTO admin_by_email (email, admin_id) VALUES (?, ?)",
        ]);
        self.session
            .batch(
                &batch,
                (
                    (admin_id, &email, &password_hash, full_name, Utc::now()),
                    (&email, admin_id),
                ),
            )
            .await?;
        Ok(admin_id)
    }

    pub async fn get_admin(&self, admin_id: Uuid) -> Result<Option<AdminRow>> {
        self.select_one(
            "SELECT admin_id, email, password_hash, full_name, created_ts FROM admin WHERE admin_id = ?",
            (admin_id,),
        )
        .await
    }

    pub async fn get_admin_by_email(&self, email: &str) -> Result<Option<AdminRow>> {
        let email = email.trim().to_lowercase();
        let lookup: Option<(Uuid,)> = self
            .select_one("SELECT admin_id FROM admin_by_email WHERE email = ?", (&email,))
            .await?;

        match lookup {
            Some((admin_id,)) => match self.get_admin(admin_id).await? {
                Some(admin) => Ok(Some(admin)),
                None => Err(AppError::Internal(
                    "Admin found in email table but not in admin table".to_string(),
                )),
            },
            None => Ok(None),
        }
    }

    // ---- sessions ----

    pub async fn create_session(
        &self,
        admin_id: Uuid,
        ip_address: Option<String>,
        user_agent: Option<String>,
        duration_hours: i64,
    ) -> Result<String> {
        let session_token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(64)
            .map(char::from)
            .collect();

        let now = Utc::now();
        let expires = now + Duration::hours(duration_hours);

        self.execute(
            "INSERT INTO admin_session (session_token, admin_id, created_ts, expires_ts, ip_address, user_agent, is_active) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            (
                &session_token,
                admin_id,
                now,
                expires,
                ip_address.unwrap_or_default(),
                user_agent.unwrap_or_default(),
                true,
            ),
        )
        .await?;

        Ok(session_token)
    }

    /// Returns the session expiry in milliseconds when the token is active,
    /// unexpired and belongs to `admin_id`.
    pub async fn verify_session(&self, admin_id: Uuid, session_token: &str) -> Result<Option<i64>> {
        let row: Option<(Uuid, chrono::DateTime<Utc>, bool)> = self
            .select_one(
                "SELECT admin_id, expires_ts, is_active FROM admin_session WHERE session_token = ?",
                (session_token,),
            )
            .await?;

        let Some((owner, expires_ts, is_active)) = row else {
            return Ok(None);
        };

        if owner != admin_id || !is_active {
            return Ok(None);
        }
        if Utc::now() > expires_ts {
            self.invalidate_session(session_token).await?;
            return Ok(None);
        }
        Ok(Some(expires_ts.timestamp_millis()))
    }

    pub async fn invalidate_session(&self, session_token: &str) -> Result<()> {
        self.execute(
            "UPDATE admin_session SET is_active = false WHERE session_token = ?",
            (session_token,),
        )
        .await
    }

    // ---- activity log ----

    pub async fn record_activity(&self, entry: &ActivityEntry) -> Result<()> {
        self.execute(INSERT_ACTIVITY, activity_values(entry)).await
    }

    /// Newest first.
    pub async fn list_activity(&self, action: Option<&str>, limit: usize) -> Result<Vec<ActivityLogRow>> {
        let mut rows: Vec<ActivityLogRow> = self
            .select(
                "SELECT log_id, actor_id, actor_type, action, details, ip_address, user_agent, created_ts FROM activity_log",
                (),
            )
            .await?;
        if let Some(action) = action.filter(|a| !a.is_empty()) {
            rows.retain(|row| row.action.eq_ignore_ascii_case(action));
        }
        rows.sort_by(|a, b| b.created_ts.cmp(&a.created_ts));
        rows.truncate(limit);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("s3cret-pass").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("s3cret-pass", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_password("x", "not-a-hash").is_err());
    }

    #[test]
    fn missing_rows_become_not_found() {
        assert_eq!(require(Some(7), "Amenity").unwrap(), 7);
        match require::<i32>(None, "Fee range") {
            Err(AppError::NotFound(msg)) => assert_eq!(msg, "Fee range not found."),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn activity_values_copy_client_details() {
        let admin = Uuid::new_v4();
        let entry = ActivityEntry::admin(admin, "owner.create", "Created owner Ana")
            .from_client(Some("10.0.0.1".to_string()), Some("curl".to_string()));
        let values = activity_values(&entry);
        assert_eq!(values.1, Some(admin));
        assert_eq!(values.3, "owner.create");
        assert_eq!(values.5.as_deref(), Some("10.0.0.1"));
    }
}
