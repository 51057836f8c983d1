use actix_web::{http::header::CONTENT_TYPE, HttpResponse};
use dashmap::DashMap;
use notify::{RecursiveMode, Watcher, event::{ModifyKind, EventKind}};
use notify_debouncer_full::{new_debouncer, DebounceEventResult};
use std::{
    fs,
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
// Type alias for the cache
pub type TemplateCache = Arc<DashMap<String, String>>;

pub const TEMPLATE_FILES: &[&str] = &[
    "layout.html",
    "login.html",
    "error.html",
    "dashboard.html",
    "users.html",
    "owners.html",
    "owner_form.html",
    "gyms.html",
    "policies.html",
    "amenities.html",
    "cut_off_chart.html",
    "memberships.html",
    "payments.html",
    "revenue_report.html",
    "withdrawals.html",
    "tournaments.html",
    "schedules.html",
    "activity_logs.html",
    "email_queue.html",
    "notifications.html",
    "email_membership.html",
    "style.css",
];

/// Loads all templates from `dir` into the cache.
/// Fails if any template file cannot be read on initial load.
pub fn load_templates(dir: &Path) -> io::Result<TemplateCache> {
    let cache: TemplateCache = Arc::new(DashMap::new());

    for filename in TEMPLATE_FILES {
        let path = dir.join(filename);
        match fs::read_to_string(&path) {
            Ok(content) => {
                cache.insert(filename.to_string(), content);
                tracing::debug!("Loaded template: {}", path.display());
            }
            Err(e) => {
                tracing::error!("Failed to load template {}: {}", path.display(), e);
                return Err(io::Error::new(
                    e.kind(),
                    format!("Failed to load essential template: {}", path.display()),
                ));
            }
        }
    }
    tracing::info!("Loaded {} templates from {}", cache.len(), dir.display());
    Ok(cache)
}

/// Watches the template directory for changes and updates the cache.
/// Runs in a separate Tokio task.
pub async fn watch_templates(cache: TemplateCache, dir: PathBuf) -> notify::Result<()> {
    let template_path = if dir.is_absolute() { dir } else { std::env::current_dir()?.join(dir) };
    let template_path_for_closure = template_path.clone();

    let event_handler = move |res: DebounceEventResult| {
        match res {
            Ok(events) => {
                for event in events {
                    if !matches!(event.kind, EventKind::Modify(ModifyKind::Data(_)) | EventKind::Create(_)) {
                        continue;
                    }
                    for path in &event.paths {
                        if !path.starts_with(&template_path_for_closure) || !path.is_file() {
                            continue;
                        }
                        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                            continue;
                        };
                        if !TEMPLATE_FILES.contains(&filename) {
                            continue;
                        }
                        match fs::read_to_string(path) {
                            Ok(new_content) => {
                                cache.insert(filename.to_string(), new_content);
                                tracing::info!("Reloaded template: {}", path.display());
                            }
                            Err(e) => {
                                tracing::error!("Failed to reload template {}: {}", path.display(), e);
                            }
                        }
                    }
                }
            }
            Err(errors) => {
                for error in errors {
                    tracing::error!("File watching error: {:?}", error);
                }
            }
        }
    };

    let mut debouncer = new_debouncer(Duration::from_secs(1), None, event_handler)?;

    debouncer
        .watcher()
        .watch(&template_path, RecursiveMode::Recursive)?;
    debouncer
        .cache()
        .add_root(&template_path, RecursiveMode::Recursive);

    tracing::info!("Template watcher started for directory: {}", template_path.display());

    // The debouncer stops watching when dropped.
    loop {
        tokio::time::sleep(Duration::from_secs(60)).await;
    }
}

/// Helper to get content from cache, returning 404 if not found
pub fn get_template_content(
    cache: &TemplateCache,
    filename: &str,
) -> Result<String, HttpResponse> {
    match cache.get(filename) {
        Some(content) => Ok(content.value().clone()),
        None => {
            tracing::error!("Template not found in cache: {}", filename);
            Err(HttpResponse::NotFound().body(format!("Template {} not found", filename)))
        }
    }
}

/// HTML-escapes user supplied text.
pub fn escape(text: &str) -> String {
    ammonia::clean_text(text)
}

/// Replaces `{name}` placeholders in one pass. Inserted values are never
/// scanned again, and unknown placeholders are left untouched.
pub fn fill(template: &str, vars: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len() + 256);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}');
        let key = close.map(|c| &after[..c]);

        match key.and_then(|k| vars.iter().find(|(name, _)| *name == k)) {
            Some((name, value)) => {
                out.push_str(value);
                rest = &after[name.len() + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashKind {
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Flash { kind: FlashKind::Success, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Flash { kind: FlashKind::Error, message: message.into() }
    }

    pub fn to_html(&self) -> String {
        let class = match self.kind {
            FlashKind::Success => "flash flash-success",
            FlashKind::Error => "flash flash-error",
        };
        format!("<div class=\"{}\">{}</div>", class, escape(&self.message))
    }
}

/// Fills `page` with `vars`, then wraps it in the admin layout.
pub fn render_page(
    cache: &TemplateCache,
    page: &str,
    title: &str,
    flash: Option<&Flash>,
    vars: &[(&str, String)],
) -> Result<String, HttpResponse> {
    let body = fill(&get_template_content(cache, page)?, vars);
    let layout = get_template_content(cache, "layout.html")?;
    Ok(fill(
        &layout,
        &[
            ("title", escape(title)),
            ("flash", flash.map(Flash::to_html).unwrap_or_default()),
            ("content", body),
        ],
    ))
}

pub fn html_response(content: String) -> HttpResponse {
    HttpResponse::Ok()
        .insert_header((CONTENT_TYPE, "text/html; charset=utf-8"))
        .body(content)
}

/// Renders `page` and returns the finished response.
pub fn page_response(
    cache: &TemplateCache,
    page: &str,
    title: &str,
    flash: Option<&Flash>,
    vars: &[(&str, String)],
) -> HttpResponse {
    match render_page(cache, page, title, flash, vars) {
        Ok(content) => html_response(content),
        Err(resp) => resp,
    }
}

/// `<option>` list with `selected` marking the current value.
pub fn options(values: &[&str], selected: &str) -> String {
    let mut out = String::new();
    for value in values {
        let mark = if value.eq_ignore_ascii_case(selected) { " selected" } else { "" };
        out.push_str(&format!(
            "<option value=\"{v}\"{mark}>{v}</option>",
            v = escape(value),
            mark = mark
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_replaces_known_keys_once() {
        let out = fill(
            "<h1>{title}</h1><p>{body}</p>",
            &[("title", "Owners".to_string()), ("body", "{title}".to_string())],
        );
        assert_eq!(out, "<h1>Owners</h1><p>{title}</p>");
    }

    #[test]
    fn fill_leaves_unknown_and_unbalanced_braces() {
        let out = fill("a {missing} b { c } d {", &[("x", "y".to_string())]);
        assert_eq!(out, "a {missing} b { c } d {");

        let css = "body { margin: 0 } .x{color:red}";
        assert_eq!(fill(css, &[("title", "t".to_string())]), css);
    }

    #[test]
    fn fill_handles_adjacent_placeholders() {
        let out = fill("{a}{b}{a}", &[("a", "1".to_string()), ("b", "2".to_string())]);
        assert_eq!(out, "121");
    }

    #[test]
    fn escape_neutralises_markup() {
        let out = escape("<script>alert('x')</script>");
        assert!(!out.contains('<'));
        assert!(!out.contains('>'));
    }

    #[test]
    fn options_marks_selected() {
        let out = options(&["pending", "approved"], "Approved");
        assert!(out.contains("<option value=\"approved\" selected>"));
        assert!(!out.contains("<option value=\"pending\" selected>"));
    }

    #[test]
    fn render_page_wraps_body_in_layout() {
        let cache: TemplateCache = Arc::new(DashMap::new());
        cache.insert("layout.html".to_string(), "<title>{title}</title>{flash}<main>{content}</main>".to_string());
        cache.insert("page.html".to_string(), "<p>{name}</p>".to_string());

        let flash = Flash::success("Saved");
        let html = render_page(&cache, "page.html", "Owners", Some(&flash), &[("name", "Ana".to_string())]).unwrap();
        assert!(html.starts_with("<title>Owners</title>"));
        assert!(html.contains("flash-success"));
        assert!(html.contains("<main><p>Ana</p></main>"));
    }

    #[test]
    fn missing_template_is_not_found() {
        let cache: TemplateCache = Arc::new(DashMap::new());
        let resp = render_page(&cache, "nope.html", "x", None, &[]).unwrap_err();
        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
    }
}
