use actix_web::{
    cookie::Cookie,
    http::{header::LOCATION, StatusCode},
    test as actix_test, web, App,
};
use std::path::PathBuf;

use flexfit_admin::config::AppConfig;
use flexfit_admin::server;
use flexfit_admin::templates::{load_templates, TEMPLATE_FILES};

fn template_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("templates")
}

macro_rules! admin_app {
    () => {{
        let cache = load_templates(&template_dir()).expect("templates load");
        actix_test::init_service(
            App::new()
                .app_data(web::Data::new(cache))
                .app_data(web::Data::new(AppConfig::for_tests(template_dir())))
                .configure(server::configure),
        )
        .await
    }};
}

fn location<B>(resp: &actix_web::dev::ServiceResponse<B>) -> String {
    resp.headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[test]
fn every_template_ships() {
    let dir = template_dir();
    for name in TEMPLATE_FILES {
        assert!(dir.join(name).exists(), "missing template {}", name);
    }
}

#[actix_rt::test]
async fn login_page_renders_form() {
    let app = admin_app!();
    let resp = actix_test::call_service(&app, actix_test::TestRequest::get().uri("/admin/login").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = actix_test::read_body(resp).await;
    let html = std::str::from_utf8(&body).unwrap();
    assert!(html.contains("action=\"/admin/login\""));
    assert!(html.contains("name=\"password\""));
    assert!(!html.contains("{flash}"));
}

#[actix_rt::test]
async fn login_page_escapes_flash_message() {
    let app = admin_app!();
    let req = actix_test::TestRequest::get()
        .uri("/admin/login?error=%3Cscript%3Ealert(1)%3C%2Fscript%3E")
        .to_request();
    let body = actix_test::call_and_read_body(&app, req).await;
    let html = std::str::from_utf8(&body).unwrap();
    assert!(html.contains("flash-error"));
    assert!(!html.contains("<script>alert(1)</script>"));
}

#[actix_rt::test]
async fn root_redirects_to_dashboard() {
    let app = admin_app!();
    let resp = actix_test::call_service(&app, actix_test::TestRequest::get().uri("/").to_request()).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/admin/dashboard");
}

#[actix_rt::test]
async fn stylesheet_is_served_as_css() {
    let app = admin_app!();
    let resp = actix_test::call_service(&app, actix_test::TestRequest::get().uri("/style.css").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/css"));
}

#[actix_rt::test]
async fn admin_pages_require_a_session() {
    let app = admin_app!();
    for uri in [
        "/admin/dashboard",
        "/admin/users",
        "/admin/gyms",
        "/admin/cut-off-chart",
        "/admin/payments/export.csv",
        "/admin/email-queue/status",
    ] {
        let resp = actix_test::call_service(&app, actix_test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER, "{}", uri);
        assert_eq!(location(&resp), "/admin/login", "{}", uri);
    }
}

#[actix_rt::test]
async fn admin_posts_require_a_session() {
    let app = admin_app!();
    for uri in ["/admin/logout", "/admin/email-queue/process", "/admin/cut-off-chart/fees"] {
        let resp = actix_test::call_service(&app, actix_test::TestRequest::post().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER, "{}", uri);
        assert_eq!(location(&resp), "/admin/login", "{}", uri);
    }
}

#[actix_rt::test]
async fn malformed_admin_cookie_redirects_to_login() {
    let app = admin_app!();
    let req = actix_test::TestRequest::get()
        .uri("/admin/dashboard")
        .cookie(Cookie::new("admin_session", "token"))
        .cookie(Cookie::new("admin_id", "not-a-uuid"))
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/admin/login");
}
