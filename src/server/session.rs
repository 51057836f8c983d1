use actix_web::{
    cookie::{Cookie, SameSite},
    get, post, web, HttpRequest, HttpResponse,
};
use std::sync::Arc;

use super::{error_page, flash_of, fmt_money, redirect_flash, see_other};
use crate::api::{FlashQuery, LoginForm};
use crate::auth::{client_details, LoggedAdmin, ADMIN_ID_COOKIE, LOGIN_PATH, SESSION_COOKIE};
use crate::config::AppConfig;
use crate::models::GymStatus;
use crate::state::StoreStateManager;
use crate::templates::{fill, get_template_content, html_response, page_response, Flash, TemplateCache};

pub const DASHBOARD_PATH: &str = "/admin/dashboard";

#[get("/")]
pub async fn root() -> HttpResponse {
    see_other(DASHBOARD_PATH)
}

#[get("/style.css")]
pub async fn serve_css(cache: web::Data<TemplateCache>) -> HttpResponse {
    match get_template_content(&cache, "style.css") {
        Ok(content) => HttpResponse::Ok().content_type("text/css").body(content),
        Err(resp) => resp,
    }
}

#[get("/admin/login")]
pub async fn login_page(cache: web::Data<TemplateCache>, query: web::Query<FlashQuery>) -> HttpResponse {
    let flash = flash_of(&query).map(|f| f.to_html()).unwrap_or_default();
    match get_template_content(&cache, "login.html") {
        Ok(content) => html_response(fill(&content, &[("flash", flash)])),
        Err(resp) => resp,
    }
}

fn session_cookie<'c>(name: &'c str, value: String, config: &AppConfig, http_only: bool) -> Cookie<'c> {
    Cookie::build(name, value)
        .path("/")
        .secure(config.secure_cookies)
        .http_only(http_only)
        .same_site(SameSite::Strict)
        .max_age(time::Duration::hours(config.session_hours))
        .finish()
}

#[post("/admin/login")]
pub async fn login_submit(
    state_manager: web::Data<Arc<StoreStateManager>>,
    config: web::Data<AppConfig>,
    form: web::Form<LoginForm>,
    req: HttpRequest,
) -> HttpResponse {
    let form = form.into_inner();
    if form.email.trim().is_empty() || form.password.is_empty() {
        return redirect_flash(LOGIN_PATH, &Flash::error("Enter your email and password."));
    }

    let (ip, user_agent) = client_details(&req);
    match state_manager
        .authenticate_admin(&form.email, &form.password, ip, user_agent, config.session_hours)
        .await
    {
        Ok((admin_id, session_token)) => {
            tracing::info!("Admin {} signed in", admin_id);
            HttpResponse::SeeOther()
                .insert_header((actix_web::http::header::LOCATION, DASHBOARD_PATH))
                .cookie(session_cookie(SESSION_COOKIE, session_token, &config, true))
                .cookie(session_cookie(ADMIN_ID_COOKIE, admin_id.to_string(), &config, true))
                .finish()
        }
        Err(e) => {
            super::log_failure("Login failed", &e);
            redirect_flash(LOGIN_PATH, &Flash::error(e.user_message()))
        }
    }
}

#[post("/admin/logout")]
pub async fn logout(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;

    let entry = admin.activity("logout", "Signed out");
    if let Err(e) = state_manager.logout(&admin.session_token, &entry).await {
        super::log_failure("Logout", &e);
    }

    let mut session = Cookie::new(SESSION_COOKIE, "");
    session.set_path("/");
    session.make_removal();
    let mut admin_id = Cookie::new(ADMIN_ID_COOKIE, "");
    admin_id.set_path("/");
    admin_id.make_removal();

    let location = format!("{}?success={}", LOGIN_PATH, urlencoding::encode("You have been signed out."));
    Ok(HttpResponse::SeeOther()
        .insert_header((actix_web::http::header::LOCATION, location))
        .cookie(session)
        .cookie(admin_id)
        .finish())
}

#[get("/admin/dashboard")]
pub async fn dashboard_page(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    cache: web::Data<TemplateCache>,
    config: web::Data<AppConfig>,
    query: web::Query<FlashQuery>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;

    let stats = match state_manager.dashboard(config.timezone).await {
        Ok(stats) => stats,
        Err(e) => return Ok(error_page(&cache, "Loading dashboard", &e)),
    };

    let gym_rows: String = stats
        .gyms_by_status
        .iter()
        .map(|(status, count)| format!("<tr><td>{}</td><td>{}</td></tr>", super::badge(status.as_str()), count))
        .collect();

    Ok(page_response(
        &cache,
        "dashboard.html",
        "Dashboard",
        flash_of(&query).as_ref(),
        &[
            ("members", stats.members.to_string()),
            ("suspended_members", stats.suspended_members.to_string()),
            ("owners", stats.owners.to_string()),
            ("gyms", stats.total_gyms().to_string()),
            ("pending_gyms", stats.gyms_with(GymStatus::Pending).to_string()),
            ("gym_rows", gym_rows),
            ("active_memberships", stats.active_memberships.to_string()),
            ("pending_withdrawals", stats.pending_withdrawals.to_string()),
            ("pending_tournaments", stats.pending_tournaments.to_string()),
            ("pending_emails", stats.pending_emails.to_string()),
            ("failed_emails", stats.failed_emails.to_string()),
            ("unread_notifications", stats.unread_notifications.to_string()),
            ("completed_payments", stats.revenue.payments.to_string()),
            ("gross", fmt_money(&stats.revenue.gross)),
            ("admin_share", fmt_money(&stats.revenue.admin_share)),
            ("gym_share", fmt_money(&stats.revenue.gym_share)),
        ],
    ))
}
