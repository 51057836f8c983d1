use chrono_tz::Tz;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_address: String,
    pub db_nodes: Vec<String>,
    pub db_user: String,
    pub db_password: String,
    pub keyspace: String,
    pub schema_dir: PathBuf,
    pub schema_version: i32,
    pub template_dir: PathBuf,
    pub timezone: Tz,
    pub session_hours: i64,
    pub secure_cookies: bool,
    pub smtp: SmtpSettings,
    pub email_batch_size: usize,
    pub email_interval_secs: Option<u64>,
    pub seed_admin: Option<(String, String)>,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: FromStr>(name: &str, default: &str) -> Result<T> {
    let raw = var_or(name, default);
    raw.trim()
        .parse::<T>()
        .map_err(|_| AppError::Config(format!("{} has an invalid value: {}", name, raw)))
}

/// Unset or blank disables the periodic drain; otherwise a whole number of
/// seconds, at least one.
fn parse_interval(raw: Option<&str>) -> Result<Option<u64>> {
    let raw = match raw.map(str::trim) {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Ok(None),
    };
    match raw.parse::<u64>() {
        Ok(secs) if secs >= 1 => Ok(Some(secs)),
        _ => Err(AppError::Config(format!(
            "FLEXFIT_EMAIL_INTERVAL_SECS must be a whole number of seconds, at least 1: {}",
            raw
        ))),
    }
}

impl AppConfig {
    /// Reads `.env` (if any) and then the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let db_nodes: Vec<String> = var_or("FLEXFIT_DB_NODES", "127.0.0.1:9042")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if db_nodes.is_empty() {
            return Err(AppError::Config("FLEXFIT_DB_NODES must list at least one node".to_string()));
        }

        let tz_name = var_or("FLEXFIT_TIMEZONE", "Asia/Manila");
        let timezone = tz_name
            .parse::<Tz>()
            .map_err(|_| AppError::Config(format!("Unknown time zone: {}", tz_name)))?;

        let email_interval_secs = parse_interval(env::var("FLEXFIT_EMAIL_INTERVAL_SECS").ok().as_deref())?;

        let seed_admin = match (env::var("FLEXFIT_ADMIN_EMAIL"), env::var("FLEXFIT_ADMIN_PASSWORD")) {
            (Ok(email), Ok(password)) if !email.is_empty() && !password.is_empty() => Some((email, password)),
            _ => None,
        };

        let smtp_user = var_or("FLEXFIT_SMTP_USER", "");
        let smtp = SmtpSettings {
            host: var_or("FLEXFIT_SMTP_HOST", "localhost"),
            port: parse_var("FLEXFIT_SMTP_PORT", "465")?,
            password: var_or("FLEXFIT_SMTP_PASSWORD", ""),
            from: var_or("FLEXFIT_MAIL_FROM", if smtp_user.is_empty() { "no-reply@flexfit.local" } else { &smtp_user }),
            username: smtp_user,
        };

        Ok(AppConfig {
            bind_address: var_or("FLEXFIT_BIND", "127.0.0.1:1227"),
            db_nodes,
            db_user: var_or("FLEXFIT_DB_USER", "cassandra"),
            db_password: var_or("FLEXFIT_DB_PASSWORD", "cassandra"),
            keyspace: var_or("FLEXFIT_KEYSPACE", "flexfit"),
            schema_dir: PathBuf::from(var_or("FLEXFIT_SCHEMA_DIR", "schema")),
            schema_version: parse_var("FLEXFIT_SCHEMA_VERSION", "1")?,
            template_dir: PathBuf::from(var_or("FLEXFIT_TEMPLATE_DIR", "templates")),
            timezone,
            session_hours: parse_var("FLEXFIT_SESSION_HOURS", "8")?,
            secure_cookies: parse_var("FLEXFIT_SECURE_COOKIES", "true")?,
            smtp,
            email_batch_size: parse_var("FLEXFIT_EMAIL_BATCH", "20")?,
            email_interval_secs,
            seed_admin,
        })
    }

    /// Defaults without touching the environment.
    pub fn for_tests(template_dir: PathBuf) -> Self {
        AppConfig {
            bind_address: "127.0.0.1:0".to_string(),
            db_nodes: vec!["127.0.0.1:9042".to_string()],
            db_user: "cassandra".to_string(),
            db_password: "cassandra".to_string(),
            keyspace: "flexfit_test".to_string(),
            schema_dir: PathBuf::from("schema"),
            schema_version: 1,
            template_dir,
            timezone: chrono_tz::Asia::Manila,
            session_hours: 8,
            secure_cookies: false,
            smtp: SmtpSettings {
                host: "localhost".to_string(),
                port: 465,
                username: String::new(),
                password: String::new(),
                from: "no-reply@flexfit.local".to_string(),
            },
            email_batch_size: 20,
            email_interval_secs: None,
            seed_admin: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_var_rejects_garbage() {
        std::env::set_var("FLEXFIT_TEST_PORT_GARBAGE", "eighty");
        let parsed: Result<u16> = parse_var("FLEXFIT_TEST_PORT_GARBAGE", "80");
        assert!(matches!(parsed, Err(AppError::Config(_))));
    }

    #[test]
    fn email_interval_must_be_positive() {
        assert_eq!(parse_interval(None).unwrap(), None);
        assert_eq!(parse_interval(Some("  ")).unwrap(), None);
        assert_eq!(parse_interval(Some(" 60 ")).unwrap(), Some(60));
        assert!(matches!(parse_interval(Some("0")), Err(AppError::Config(_))));
        assert!(matches!(parse_interval(Some("-5")), Err(AppError::Config(_))));
        assert!(matches!(parse_interval(Some("soon")), Err(AppError::Config(_))));
    }

    #[test]
    fn parse_var_uses_default_when_unset() {
        let parsed: u16 = parse_var("FLEXFIT_TEST_UNSET_VARIABLE", "465").unwrap();
        assert_eq!(parsed, 465);
    }
}
