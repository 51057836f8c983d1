//! Drains the `email_queue` table: pending rows are claimed, sent and marked
//! sent or failed. There is no automatic retry; failed rows wait for an
//! admin to re-queue them. A claim only succeeds while the row is still
//! pending, so overlapping drains never send the same row twice.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::api::EmailQueueCounts;
use crate::email_sender::Mailer;
use crate::error::Result;
use crate::models::{EmailRow, EmailStatus};

#[async_trait]
pub trait EmailQueueStore: Send + Sync {
    /// Oldest pending rows first.
    async fn pending_emails(&self, limit: usize) -> Result<Vec<EmailRow>>;
    /// Moves a pending row to processing. Returns false when another
    /// drain claimed it first.
    async fn mark_processing(&self, email_id: Uuid) -> Result<bool>;
    async fn mark_sent(&self, email_id: Uuid) -> Result<()>;
    async fn mark_failed(&self, email_id: Uuid, attempts: i32, error: &str) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub sent: usize,
    pub failed: usize,
}

pub async fn drain_queue(
    store: &dyn EmailQueueStore,
    mailer: &dyn Mailer,
    sender: &str,
    limit: usize,
) -> Result<DrainReport> {
    let mut report = DrainReport::default();

    for email in store.pending_emails(limit).await? {
        if !store.mark_processing(email.email_id).await? {
            tracing::debug!("Email {} already claimed by another drain", email.email_id);
            continue;
        }

        match mailer
            .send_html(sender, &email.recipient, &email.subject, &email.body)
            .await
        {
            Ok(()) => {
                store.mark_sent(email.email_id).await?;
                report.sent += 1;
            }
            Err(e) => {
                tracing::warn!("Email {} to {} failed: {}", email.email_id, email.recipient, e);
                store
                    .mark_failed(email.email_id, email.attempts + 1, &e.to_string())
                    .await?;
                report.failed += 1;
            }
        }
    }

    if report.sent + report.failed > 0 {
        tracing::info!("Email queue drained: {} sent, {} failed", report.sent, report.failed);
    }
    Ok(report)
}

pub fn count_by_status(emails: &[EmailRow]) -> EmailQueueCounts {
    let mut counts = EmailQueueCounts { pending: 0, processing: 0, sent: 0, failed: 0 };
    for email in emails {
        match email.status() {
            EmailStatus::Pending => counts.pending += 1,
            EmailStatus::Processing => counts.processing += 1,
            EmailStatus::Sent => counts.sent += 1,
            EmailStatus::Failed => counts.failed += 1,
        }
    }
    counts
}

/// Drains the queue every `interval` until the process exits.
pub fn spawn_periodic_drain(
    store: Arc<dyn EmailQueueStore>,
    mailer: Arc<dyn Mailer>,
    sender: String,
    limit: usize,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("Periodic email drain every {:?}", interval);
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = drain_queue(store.as_ref(), mailer.as_ref(), &sender, limit).await {
                tracing::error!("Periodic email drain failed: {}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::Mutex;

    struct MemoryQueue {
        rows: Mutex<Vec<EmailRow>>,
    }

    impl MemoryQueue {
        fn with(rows: Vec<EmailRow>) -> Self {
            Self { rows: Mutex::new(rows) }
        }

        fn status_of(&self, id: Uuid) -> (String, i32, Option<String>) {
            let rows = self.rows.lock().unwrap();
            let row = rows.iter().find(|r| r.email_id == id).unwrap();
            (row.status.clone(), row.attempts, row.last_error.clone())
        }

        fn update(&self, id: Uuid, f: impl FnOnce(&mut EmailRow)) {
            let mut rows = self.rows.lock().unwrap();
            if let Some(row) = rows.iter_mut().find(|r| r.email_id == id) {
                f(row);
            }
        }
    }

    #[async_trait]
    impl EmailQueueStore for MemoryQueue {
        async fn pending_emails(&self, limit: usize) -> Result<Vec<EmailRow>> {
            let mut rows: Vec<EmailRow> = self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.status == "pending")
                .cloned()
                .collect();
            rows.sort_by(|a, b| a.created_ts.cmp(&b.created_ts));
            rows.truncate(limit);
            // Lets a concurrent drain read the same rows before either claims.
            tokio::task::yield_now().await;
            Ok(rows)
        }

        async fn mark_processing(&self, email_id: Uuid) -> Result<bool> {
            let mut rows = self.rows.lock().unwrap();
            match rows.iter_mut().find(|r| r.email_id == email_id) {
                Some(row) if row.status == "pending" => {
                    row.status = "processing".to_string();
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn mark_sent(&self, email_id: Uuid) -> Result<()> {
            self.update(email_id, |r| {
                r.status = "sent".to_string();
                r.sent_ts = Some(Utc::now());
            });
            Ok(())
        }

        async fn mark_failed(&self, email_id: Uuid, attempts: i32, error: &str) -> Result<()> {
            self.update(email_id, |r| {
                r.status = "failed".to_string();
                r.attempts = attempts;
                r.last_error = Some(error.to_string());
            });
            Ok(())
        }
    }

    /// Rejects any recipient on the `bounce.test` domain.
    struct FakeMailer {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Mailer for FakeMailer {
        async fn send_html(&self, _sender: &str, receiver: &str, _subject: &str, _html: &str) -> Result<()> {
            if receiver.ends_with("@bounce.test") {
                return Err(AppError::Email("mailbox unavailable".to_string()));
            }
            self.sent.lock().unwrap().push(receiver.to_string());
            Ok(())
        }
    }

    fn email(recipient: &str, status: &str, age_minutes: i64) -> EmailRow {
        EmailRow {
            email_id: Uuid::new_v4(),
            recipient: recipient.to_string(),
            subject: "Membership confirmed".to_string(),
            body: "<p>Welcome</p>".to_string(),
            status: status.to_string(),
            attempts: 0,
            last_error: None,
            created_ts: Utc::now() - ChronoDuration::minutes(age_minutes),
            sent_ts: None,
        }
    }

    #[tokio::test]
    async fn drain_marks_sent_and_failed() {
        let ok = email("ana@example.com", "pending", 10);
        let bad = email("bob@bounce.test", "pending", 5);
        let done = email("cy@example.com", "sent", 60);
        let (ok_id, bad_id, done_id) = (ok.email_id, bad.email_id, done.email_id);
        let store = MemoryQueue::with(vec![ok, bad, done]);
        let mailer = FakeMailer { sent: Mutex::new(Vec::new()) };

        let report = drain_queue(&store, &mailer, "no-reply@flexfit.local", 10).await.unwrap();

        assert_eq!(report, DrainReport { sent: 1, failed: 1 });
        assert_eq!(store.status_of(ok_id).0, "sent");
        let (status, attempts, error) = store.status_of(bad_id);
        assert_eq!(status, "failed");
        assert_eq!(attempts, 1);
        assert!(error.unwrap().contains("mailbox unavailable"));
        assert_eq!(store.status_of(done_id).0, "sent");
        assert_eq!(*mailer.sent.lock().unwrap(), vec!["ana@example.com".to_string()]);
    }

    #[tokio::test]
    async fn drain_respects_limit_oldest_first() {
        let newest = email("new@example.com", "pending", 1);
        let oldest = email("old@example.com", "pending", 100);
        let store = MemoryQueue::with(vec![newest.clone(), oldest.clone()]);
        let mailer = FakeMailer { sent: Mutex::new(Vec::new()) };

        let report = drain_queue(&store, &mailer, "no-reply@flexfit.local", 1).await.unwrap();

        assert_eq!(report.sent, 1);
        assert_eq!(store.status_of(oldest.email_id).0, "sent");
        assert_eq!(store.status_of(newest.email_id).0, "pending");
    }

    #[tokio::test]
    async fn overlapping_drains_send_each_email_once() {
        let only = email("ana@example.com", "pending", 3);
        let id = only.email_id;
        let store = MemoryQueue::with(vec![only]);
        let mailer = FakeMailer { sent: Mutex::new(Vec::new()) };

        let (first, second) = tokio::join!(
            drain_queue(&store, &mailer, "no-reply@flexfit.local", 10),
            drain_queue(&store, &mailer, "no-reply@flexfit.local", 10),
        );

        let (first, second) = (first.unwrap(), second.unwrap());
        assert_eq!(first.sent + second.sent, 1);
        assert_eq!(first.failed + second.failed, 0);
        assert_eq!(*mailer.sent.lock().unwrap(), vec!["ana@example.com".to_string()]);
        assert_eq!(store.status_of(id).0, "sent");
    }

    #[tokio::test]
    async fn failed_rows_are_not_picked_up_again() {
        let mut failed = email("bob@bounce.test", "failed", 5);
        failed.attempts = 1;
        let store = MemoryQueue::with(vec![failed.clone()]);
        let mailer = FakeMailer { sent: Mutex::new(Vec::new()) };

        let report = drain_queue(&store, &mailer, "no-reply@flexfit.local", 10).await.unwrap();
        assert_eq!(report, DrainReport::default());
        assert_eq!(store.status_of(failed.email_id).1, 1);
    }

    #[test]
    fn counts_group_by_status() {
        let rows = vec![
            email("a@example.com", "pending", 1),
            email("b@example.com", "pending", 1),
            email("c@example.com", "failed", 1),
            email("d@example.com", "sent", 1),
        ];
        let counts = count_by_status(&rows);
        assert_eq!(counts, EmailQueueCounts { pending: 2, processing: 0, sent: 1, failed: 1 });
    }
}
