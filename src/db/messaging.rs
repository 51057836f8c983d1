use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{require, ScyllaConnector};
use crate::email_queue::EmailQueueStore;
use crate::error::{AppError, Result};
use crate::models::{ActivityEntry, EmailRow, EmailStatus, NotificationRow};

pub(crate) const INSERT_EMAIL: &str = "INSERT INTO email_queue \
    (email_id, recipient, subject, body, status, attempts, created_ts) VALUES (?, ?, ?, ?, ?, ?, ?)";

const EMAIL_COLUMNS: &str =
    "email_id, recipient, subject, body, status, attempts, last_error, created_ts, sent_ts";
const NOTIFICATION_COLUMNS: &str =
    "notification_id, recipient_type, recipient_id, title, message, is_read, created_ts";

impl ScyllaConnector {
    pub async fn enqueue_email(&self, recipient: &str, subject: &str, body: &str) -> Result<Uuid> {
        let email_id = Uuid::new_v4();
        self.execute(
            INSERT_EMAIL,
            (email_id, recipient, subject, body, EmailStatus::Pending.as_str(), 0_i32, Utc::now()),
        )
        .await?;
        Ok(email_id)
    }

    /// Newest first.
    pub async fn list_emails(&self) -> Result<Vec<EmailRow>> {
        let mut rows: Vec<EmailRow> = self
            .select(&format!("SELECT {} FROM email_queue", EMAIL_COLUMNS), ())
            .await?;
        rows.sort_by(|a, b| b.created_ts.cmp(&a.created_ts));
        Ok(rows)
    }

    pub async fn get_email(&self, email_id: Uuid) -> Result<Option<EmailRow>> {
        self.select_one(
            &format!("SELECT {} FROM email_queue WHERE email_id = ?", EMAIL_COLUMNS),
            (email_id,),
        )
        .await
    }

    pub async fn retry_email(&self, email_id: Uuid, activity: &ActivityEntry) -> Result<()> {
        let email = self
            .get_email(email_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Email not found.".to_string()))?;
        if !email.status().can_move_to(EmailStatus::Pending) {
            return Err(AppError::Conflict(format!(
                "Only failed or stuck processing emails can be re-queued; this one is {}.",
                email.status()
            )));
        }
        self.execute_logged(
            "UPDATE email_queue SET status = ? WHERE email_id = ?",
            (EmailStatus::Pending.as_str(), email_id),
            activity,
        )
        .await
    }

    // ---- notifications ----

    pub async fn list_notifications(&self) -> Result<Vec<NotificationRow>> {
        let mut rows: Vec<NotificationRow> = self
            .select(&format!("SELECT {} FROM notification", NOTIFICATION_COLUMNS), ())
            .await?;
        rows.sort_by(|a, b| b.created_ts.cmp(&a.created_ts));
        Ok(rows)
    }

    pub async fn notify_admins(&self, title: &str, message: &str) -> Result<()> {
        self.execute(
            "INSERT INTO notification (notification_id, recipient_type, recipient_id, title, message, is_read, created_ts) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            (Uuid::new_v4(), "admin", None::<Uuid>, title, message, false, Utc::now()),
        )
        .await
    }

    pub async fn get_notification(&self, notification_id: Uuid) -> Result<Option<NotificationRow>> {
        self.select_one(
            &format!("SELECT {} FROM notification WHERE notification_id = ?", NOTIFICATION_COLUMNS),
            (notification_id,),
        )
        .await
    }

    /// Updating an unknown id would upsert a row with only `is_read` set,
    /// so the row is looked up first.
    pub async fn mark_notification_read(&self, notification_id: Uuid) -> Result<()> {
        let notification = require(self.get_notification(notification_id).await?, "Notification")?;
        if notification.is_read {
            return Ok(());
        }
        self.execute(
            "UPDATE notification SET is_read = true WHERE notification_id = ?",
            (notification_id,),
        )
        .await
    }
}

#[async_trait]
impl EmailQueueStore for ScyllaConnector {
    async fn pending_emails(&self, limit: usize) -> Result<Vec<EmailRow>> {
        let mut pending: Vec<EmailRow> = self
            .list_emails()
            .await?
            .into_iter()
            .filter(|e| e.status() == EmailStatus::Pending)
            .collect();
        pending.sort_by(|a, b| a.created_ts.cmp(&b.created_ts));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn mark_processing(&self, email_id: Uuid) -> Result<bool> {
        self.execute_conditional(
            "UPDATE email_queue SET status = ? WHERE email_id = ? IF status = ?",
            (EmailStatus::Processing.as_str(), email_id, EmailStatus::Pending.as_str()),
        )
        .await
    }

    async fn mark_sent(&self, email_id: Uuid) -> Result<()> {
        self.execute(
            "UPDATE email_queue SET status = ?, sent_ts = ?, last_error = null WHERE email_id = ?",
            (EmailStatus::Sent.as_str(), Utc::now(), email_id),
        )
        .await
    }

    async fn mark_failed(&self, email_id: Uuid, attempts: i32, error: &str) -> Result<()> {
        self.execute(
            "UPDATE email_queue SET status = ?, attempts = ?, last_error = ? WHERE email_id = ?",
            (EmailStatus::Failed.as_str(), attempts, error, email_id),
        )
        .await
    }
}
