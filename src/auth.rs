use actix_web::{
    dev::Payload, error::InternalError, error::ErrorInternalServerError, http::header::LOCATION,
    FromRequest, HttpRequest, HttpResponse,
};
use futures_util::future::{ready, Ready};
use std::sync::Arc;
use uuid::Uuid;

use crate::state::StoreStateManager;

pub const SESSION_COOKIE: &str = "admin_session";
pub const ADMIN_ID_COOKIE: &str = "admin_id";
pub const LOGIN_PATH: &str = "/admin/login";

/// 303 to the login page, used wherever a page needs a session.
pub fn login_redirect(reason: &'static str) -> actix_web::Error {
    let response = HttpResponse::SeeOther()
        .insert_header((LOCATION, LOGIN_PATH))
        .finish();
    InternalError::from_response(reason, response).into()
}

/// Client IP and user agent, recorded on sessions and in the activity log.
pub fn client_details(req: &HttpRequest) -> (Option<String>, Option<String>) {
    let ip = req
        .connection_info()
        .realip_remote_addr()
        .map(|ip| ip.to_string());
    let user_agent = req
        .headers()
        .get(actix_web::http::header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());
    (ip, user_agent)
}

// Extractor for authenticated admins
pub struct LoggedAdmin {
    pub admin_id: Uuid,
    pub session_token: String,
    pub expire_ts: i64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl FromRequest for LoggedAdmin {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let session_cookie = req.cookie(SESSION_COOKIE);
        let admin_id_cookie = req.cookie(ADMIN_ID_COOKIE);

        match (session_cookie, admin_id_cookie) {
            (Some(session_cookie), Some(admin_id_cookie)) => {
                match admin_id_cookie.value().parse::<Uuid>() {
                    Ok(admin_id) => {
                        // Actual session validity is checked in the handler via validate().
                        let (ip_address, user_agent) = client_details(req);
                        ready(Ok(LoggedAdmin {
                            admin_id,
                            session_token: session_cookie.value().to_owned(),
                            expire_ts: 0,
                            ip_address,
                            user_agent,
                        }))
                    }
                    Err(e) => {
                        tracing::warn!("Invalid admin_id cookie format received: {:?}", e);
                        ready(Err(login_redirect("Invalid authentication token format")))
                    }
                }
            }
            _ => {
                tracing::debug!("Session or admin_id cookie missing.");
                ready(Err(login_redirect("Authentication credentials missing")))
            }
        }
    }
}

impl LoggedAdmin {
    pub async fn validate(&mut self, state: &Arc<StoreStateManager>) -> Result<Uuid, actix_web::Error> {
        match state.db.verify_session(self.admin_id, &self.session_token).await {
            Ok(Some(expires_ts_millis)) => {
                tracing::debug!("Session valid for admin_id: {}, expires at (millis): {}", self.admin_id, expires_ts_millis);
                self.expire_ts = expires_ts_millis;
                Ok(self.admin_id)
            }
            Ok(None) => {
                tracing::debug!("Session verification failed for admin_id: {}", self.admin_id);
                Err(login_redirect("Invalid or expired session"))
            }
            Err(app_err) => {
                tracing::error!("Database error during session verification for admin_id {}: {:?}", self.admin_id, app_err);
                Err(ErrorInternalServerError(app_err))
            }
        }
    }

    /// Audit entry attributed to this admin and their client.
    pub fn activity(&self, action: &str, details: impl Into<String>) -> crate::models::ActivityEntry {
        crate::models::ActivityEntry::admin(self.admin_id, action, details)
            .from_client(self.ip_address.clone(), self.user_agent.clone())
    }
}
