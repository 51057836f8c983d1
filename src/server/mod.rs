//! HTTP handlers for the admin back-office and the helpers they share.
//!
//! Every page follows the same shape: validate the admin session, load what
//! the page needs from the store, fill the page template and wrap it in the
//! layout. Form posts redirect back with a flash message in the query string.

use actix_web::{
    http::{header::{CONTENT_TYPE, LOCATION}, StatusCode},
    web, HttpResponse,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::fmt::Display;
use uuid::Uuid;

use crate::api::FlashQuery;
use crate::error::AppError;
use crate::revenue::round_money;
use crate::templates::{escape, render_page, Flash, FlashKind, TemplateCache};

pub mod finance;
pub mod gyms;
pub mod messaging;
pub mod people;
pub mod session;

/// Registers every route. Fixed paths come before their `{id}` siblings.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // session & landing
        .service(session::root)
        .service(session::serve_css)
        .service(session::login_page)
        .service(session::login_submit)
        .service(session::logout)
        .service(session::dashboard_page)
        // members & owners
        .service(people::users_page)
        .service(people::set_user_status)
        .service(people::owners_page)
        .service(people::new_owner_page)
        .service(people::create_owner)
        .service(people::edit_owner_page)
        .service(people::update_owner)
        .service(people::set_owner_status)
        .service(people::delete_owner)
        // gyms and what hangs off them
        .service(gyms::gyms_page)
        .service(gyms::set_gym_status)
        .service(gyms::policies_page)
        .service(gyms::create_policy)
        .service(gyms::update_policy)
        .service(gyms::delete_policy)
        .service(gyms::amenities_page)
        .service(gyms::create_amenity)
        .service(gyms::update_amenity)
        .service(gyms::delete_amenity)
        .service(gyms::tournaments_page)
        .service(gyms::set_tournament_status)
        .service(gyms::schedules_page)
        // money
        .service(finance::cut_off_chart_page)
        .service(finance::upsert_chart_entry)
        .service(finance::delete_chart_entry)
        .service(finance::create_fee_cut)
        .service(finance::update_fee_cut)
        .service(finance::delete_fee_cut)
        .service(finance::memberships_page)
        .service(finance::record_membership)
        .service(finance::payments_page)
        .service(finance::payments_export)
        .service(finance::revenue_report_page)
        .service(finance::revenue_report_export)
        .service(finance::withdrawals_page)
        .service(finance::set_withdrawal_status)
        // audit, mail, notifications
        .service(messaging::activity_logs_page)
        .service(messaging::email_queue_page)
        .service(messaging::email_queue_status)
        .service(messaging::process_email_queue)
        .service(messaging::retry_email)
        .service(messaging::notifications_page)
        .service(messaging::mark_notification_read);
}

pub(crate) fn see_other(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((LOCATION, location))
        .finish()
}

/// Redirects to `path` carrying `flash` as `?success=` or `?error=`.
pub(crate) fn redirect_flash(path: &str, flash: &Flash) -> HttpResponse {
    let key = match flash.kind {
        FlashKind::Success => "success",
        FlashKind::Error => "error",
    };
    let separator = if path.contains('?') { '&' } else { '?' };
    see_other(&format!(
        "{}{}{}={}",
        path,
        separator,
        key,
        urlencoding::encode(&flash.message)
    ))
}

/// Errors win over successes when both are present.
pub(crate) fn flash_of(query: &FlashQuery) -> Option<Flash> {
    let pick = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
    pick(&query.error)
        .map(Flash::error)
        .or_else(|| pick(&query.success).map(Flash::success))
}

pub(crate) fn log_failure(context: &str, err: &AppError) {
    match err {
        AppError::BadRequest(_)
        | AppError::Validation(_)
        | AppError::NotFound(_)
        | AppError::Conflict(_)
        | AppError::Unauthorized(_) => tracing::warn!("{}: {}", context, err),
        _ => tracing::error!("{}: {:?}", context, err),
    }
}

/// Redirect after a form post: success message, or the error's user text.
pub(crate) fn finish(path: &str, context: &str, result: crate::error::Result<String>) -> HttpResponse {
    match result {
        Ok(message) => redirect_flash(path, &Flash::success(message)),
        Err(e) => {
            log_failure(context, &e);
            redirect_flash(path, &Flash::error(e.user_message()))
        }
    }
}

fn status_for(err: &AppError) -> StatusCode {
    match err {
        AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        AppError::Conflict(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Full error page used when a page cannot load its data.
pub(crate) fn error_page(cache: &TemplateCache, context: &str, err: &AppError) -> HttpResponse {
    log_failure(context, err);
    match render_page(cache, "error.html", "Something went wrong", None, &[("message", escape(&err.user_message()))]) {
        Ok(body) => HttpResponse::build(status_for(err))
            .insert_header((CONTENT_TYPE, "text/html; charset=utf-8"))
            .body(body),
        Err(resp) => resp,
    }
}

pub(crate) fn csv_response(filename: &str, body: String) -> HttpResponse {
    HttpResponse::Ok()
        .insert_header((CONTENT_TYPE, "text/csv; charset=utf-8"))
        .insert_header((
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", filename),
        ))
        .body(body)
}

pub(crate) fn fmt_ts(ts: &DateTime<Utc>, tz: Tz) -> String {
    ts.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string()
}

pub(crate) fn fmt_money(value: &BigDecimal) -> String {
    round_money(value).to_string()
}

pub(crate) fn opt_text(value: &Option<String>) -> String {
    value.as_deref().map(escape).unwrap_or_default()
}

pub(crate) fn name_map<T>(rows: &[T], id: impl Fn(&T) -> Uuid, name: impl Fn(&T) -> &str) -> HashMap<Uuid, String> {
    rows.iter().map(|row| (id(row), name(row).to_string())).collect()
}

/// Escaped name for `id`, or a marker when the row is gone.
pub(crate) fn lookup(names: &HashMap<Uuid, String>, id: &Uuid) -> String {
    names
        .get(id)
        .map(|n| escape(n))
        .unwrap_or_else(|| "<em>unknown</em>".to_string())
}

pub(crate) fn badge(status: &str) -> String {
    let status = escape(status);
    format!("<span class=\"badge badge-{s}\">{s}</span>", s = status)
}

fn action_label(status: &str) -> String {
    match status {
        "approved" => "Approve",
        "rejected" => "Reject",
        "suspended" => "Suspend",
        "pending" => "Reopen",
        "cancelled" => "Cancel",
        "completed" => "Complete",
        "active" => "Activate",
        "inactive" => "Deactivate",
        other => other,
    }
    .to_string()
}

/// One small POST form per reachable status.
pub(crate) fn status_buttons<S: Display>(action: &str, targets: &[S]) -> String {
    if targets.is_empty() {
        return "<span class=\"muted\">No actions</span>".to_string();
    }
    targets
        .iter()
        .map(|target| {
            let value = target.to_string();
            format!(
                "<form method=\"post\" action=\"{action}\" class=\"inline\">\
                 <input type=\"hidden\" name=\"status\" value=\"{value}\">\
                 <button type=\"submit\" class=\"btn btn-{value}\">{label}</button></form>",
                action = action,
                value = value,
                label = action_label(&value)
            )
        })
        .collect()
}

/// Placeholder row for an empty table.
pub(crate) fn empty_row(columns: usize, message: &str) -> String {
    format!("<tr><td colspan=\"{}\" class=\"empty\">{}</td></tr>", columns, escape(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(resp: &HttpResponse) -> String {
        resp.headers().get(LOCATION).unwrap().to_str().unwrap().to_string()
    }

    #[test]
    fn redirect_flash_encodes_message() {
        let resp = redirect_flash("/admin/owners", &Flash::error("Email & name required"));
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), "/admin/owners?error=Email%20%26%20name%20required");

        let resp = redirect_flash("/admin/payments?from=2024-01-01", &Flash::success("Done"));
        assert_eq!(location(&resp), "/admin/payments?from=2024-01-01&success=Done");
    }

    #[test]
    fn flash_prefers_errors_and_ignores_blanks() {
        let query = FlashQuery { success: Some("Saved".into()), error: Some("Failed".into()) };
        assert_eq!(flash_of(&query).unwrap().kind, FlashKind::Error);

        let query = FlashQuery { success: Some("Saved".into()), error: Some("  ".into()) };
        assert_eq!(flash_of(&query).unwrap().message, "Saved");

        assert!(flash_of(&FlashQuery::default()).is_none());
    }

    #[test]
    fn finish_hides_store_errors() {
        let resp = finish("/admin/gyms", "test", Err(AppError::Internal("disk on fire".into())));
        let loc = location(&resp);
        assert!(loc.starts_with("/admin/gyms?error="));
        assert!(!loc.contains("disk"));
    }

    #[test]
    fn status_buttons_render_each_target() {
        let html = status_buttons("/admin/gyms/1/status", &["approved", "rejected"]);
        assert!(html.contains("value=\"approved\""));
        assert!(html.contains(">Reject</button>"));
        assert!(status_buttons::<&str>("/x", &[]).contains("No actions"));
    }

    #[test]
    fn error_page_uses_status_of_error() {
        let cache: TemplateCache = std::sync::Arc::new(dashmap::DashMap::new());
        cache.insert("layout.html".to_string(), "{content}".to_string());
        cache.insert("error.html".to_string(), "<p>{message}</p>".to_string());
        let resp = error_page(&cache, "test", &AppError::NotFound("Gym not found.".into()));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
