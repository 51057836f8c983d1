use actix_web::{get, post, web, HttpResponse};
use std::sync::Arc;
use uuid::Uuid;

use super::{badge, empty_row, error_page, finish, flash_of, fmt_ts, opt_text};
use crate::api::{ActivityQuery, EmailQueueStatusResponse, FlashQuery};
use crate::auth::LoggedAdmin;
use crate::config::AppConfig;
use crate::email_queue::{count_by_status, drain_queue};
use crate::email_sender::Mailer;
use crate::error::Result as AppResult;
use crate::models::EmailStatus;
use crate::state::StoreStateManager;
use crate::templates::{escape, page_response, TemplateCache};

const EMAIL_QUEUE_PATH: &str = "/admin/email-queue";
const NOTIFICATIONS_PATH: &str = "/admin/notifications";
const ACTIVITY_LIMIT: usize = 200;

#[get("/admin/activity-logs")]
pub async fn activity_logs_page(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    cache: web::Data<TemplateCache>,
    config: web::Data<AppConfig>,
    query: web::Query<ActivityQuery>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;

    let action = query.action();
    let logs = match state_manager.db.list_activity(action.as_deref(), ACTIVITY_LIMIT).await {
        Ok(logs) => logs,
        Err(e) => return Ok(error_page(&cache, "Listing activity", &e)),
    };

    let rows: String = logs
        .iter()
        .map(|log| {
            format!(
                "<tr><td>{}</td><td>{}</td><td><code>{}</code></td><td>{}</td><td>{}</td><td class=\"muted\">{}</td></tr>",
                fmt_ts(&log.created_ts, config.timezone),
                escape(&log.actor_type),
                escape(&log.action),
                opt_text(&log.details),
                opt_text(&log.ip_address),
                opt_text(&log.user_agent),
            )
        })
        .collect();
    let rows = if rows.is_empty() { empty_row(6, "No activity recorded.") } else { rows };

    Ok(page_response(
        &cache,
        "activity_logs.html",
        "Activity Logs",
        None,
        &[
            ("action", escape(action.as_deref().unwrap_or(""))),
            ("count", logs.len().to_string()),
            ("rows", rows),
        ],
    ))
}

#[get("/admin/email-queue")]
pub async fn email_queue_page(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    cache: web::Data<TemplateCache>,
    config: web::Data<AppConfig>,
    query: web::Query<FlashQuery>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;

    let emails = match state_manager.db.list_emails().await {
        Ok(emails) => emails,
        Err(e) => return Ok(error_page(&cache, "Listing email queue", &e)),
    };
    let counts = count_by_status(&emails);

    let tz = config.timezone;
    let rows: String = emails
        .iter()
        .map(|email| {
            let action = if email.status().can_move_to(EmailStatus::Pending) {
                format!(
                    "<form method=\"post\" action=\"{}/{}/retry\" class=\"inline\">\
                     <button type=\"submit\" class=\"btn\">Retry</button></form>",
                    EMAIL_QUEUE_PATH, email.email_id
                )
            } else {
                String::new()
            };
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td class=\"num\">{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                fmt_ts(&email.created_ts, tz),
                escape(&email.recipient),
                escape(&email.subject),
                badge(email.status().as_str()),
                email.attempts,
                opt_text(&email.last_error),
                email.sent_ts.as_ref().map(|ts| fmt_ts(ts, tz)).unwrap_or_default(),
                action,
            )
        })
        .collect();
    let rows = if rows.is_empty() { empty_row(8, "The email queue is empty.") } else { rows };

    Ok(page_response(
        &cache,
        "email_queue.html",
        "Email Queue",
        flash_of(&query).as_ref(),
        &[
            ("pending", counts.pending.to_string()),
            ("processing", counts.processing.to_string()),
            ("sent", counts.sent.to_string()),
            ("failed", counts.failed.to_string()),
            ("rows", rows),
        ],
    ))
}

/// Queue counts as JSON for the page's refresh poll.
#[get("/admin/email-queue/status")]
pub async fn email_queue_status(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;

    let response = match state_manager.db.list_emails().await {
        Ok(emails) => EmailQueueStatusResponse {
            success: true,
            error_message: None,
            counts: Some(count_by_status(&emails)),
        },
        Err(e) => {
            super::log_failure("Email queue status", &e);
            EmailQueueStatusResponse {
                success: false,
                error_message: Some(e.user_message()),
                counts: None,
            }
        }
    };
    Ok(HttpResponse::Ok().json(response))
}

#[post("/admin/email-queue/process")]
pub async fn process_email_queue(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    config: web::Data<AppConfig>,
    mailer: web::Data<Arc<dyn Mailer>>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;

    let result: AppResult<String> = async {
        let report = drain_queue(
            state_manager.db.as_ref(),
            mailer.get_ref().as_ref(),
            &config.smtp.from,
            config.email_batch_size,
        )
        .await?;
        let summary = format!("{} sent, {} failed", report.sent, report.failed);
        if report.failed > 0 {
            state_manager
                .db
                .notify_admins(
                    "Email delivery failures",
                    &format!("{} queued emails could not be sent. Review them in the email queue.", report.failed),
                )
                .await?;
        }
        state_manager
            .db
            .record_activity(&admin.activity("email.process", format!("Processed email queue: {}", summary)))
            .await?;
        Ok(format!("Email queue processed: {}.", summary))
    }
    .await;

    Ok(finish(EMAIL_QUEUE_PATH, "Processing email queue", result))
}

#[post("/admin/email-queue/{email_id}/retry")]
pub async fn retry_email(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;
    let email_id = path.into_inner();

    let entry = admin.activity("email.retry", format!("Re-queued email {}", email_id));
    let result = state_manager
        .db
        .retry_email(email_id, &entry)
        .await
        .map(|()| "Email moved back to pending.".to_string());
    Ok(finish(EMAIL_QUEUE_PATH, "Retrying email", result))
}

#[get("/admin/notifications")]
pub async fn notifications_page(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    cache: web::Data<TemplateCache>,
    config: web::Data<AppConfig>,
    query: web::Query<FlashQuery>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;

    let notifications = match state_manager.db.list_notifications().await {
        Ok(found) => found,
        Err(e) => return Ok(error_page(&cache, "Listing notifications", &e)),
    };

    let rows: String = notifications
        .iter()
        .filter(|n| n.recipient_type == "admin")
        .map(|n| {
            let action = if n.is_read {
                "<span class=\"muted\">Read</span>".to_string()
            } else {
                format!(
                    "<form method=\"post\" action=\"{}/{}/read\" class=\"inline\">\
                     <button type=\"submit\" class=\"btn\">Mark read</button></form>",
                    NOTIFICATIONS_PATH, n.notification_id
                )
            };
            format!(
                "<tr class=\"{}\"><td>{}</td><td><strong>{}</strong></td><td>{}</td><td>{}</td></tr>",
                if n.is_read { "read" } else { "unread" },
                fmt_ts(&n.created_ts, config.timezone),
                escape(&n.title),
                escape(&n.message),
                action,
            )
        })
        .collect();
    let rows = if rows.is_empty() { empty_row(4, "No notifications.") } else { rows };

    Ok(page_response(
        &cache,
        "notifications.html",
        "Notifications",
        flash_of(&query).as_ref(),
        &[("rows", rows)],
    ))
}

#[post("/admin/notifications/{notification_id}/read")]
pub async fn mark_notification_read(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;

    let result = state_manager
        .db
        .mark_notification_read(path.into_inner())
        .await
        .map(|()| "Notification marked as read.".to_string());
    Ok(finish(NOTIFICATIONS_PATH, "Marking notification", result))
}
