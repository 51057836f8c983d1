use std::sync::Arc;
use std::time::Duration;

use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};

use flexfit_admin::config::AppConfig;
use flexfit_admin::db::ScyllaConnector;
use flexfit_admin::db_migrate::MigrationTool;
use flexfit_admin::email_queue::{spawn_periodic_drain, EmailQueueStore};
use flexfit_admin::email_sender::{Mailer, SmtpMailer};
use flexfit_admin::error::TraceErr;
use flexfit_admin::server;
use flexfit_admin::state::StoreStateManager;
use flexfit_admin::templates::{load_templates, watch_templates};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    tracing::info!("Starting FlexFit admin");

    let config = AppConfig::from_env()?;

    let db = Arc::new(
        ScyllaConnector::new(&config.db_nodes, &config.db_user, &config.db_password)
            .await
            .trace_err("connecting to Scylla")?,
    );
    MigrationTool::new(config.keyspace.clone(), config.schema_dir.clone())
        .migrate_to_version(db.session(), config.schema_version)
        .await
        .trace_err("migrating schema")?;
    db.use_keyspace(&config.keyspace).await?;

    let state_manager = Arc::new(StoreStateManager::new(db.clone()));
    if let Some((email, password)) = &config.seed_admin {
        if let Some(admin_id) = state_manager.seed_admin(email, password).await? {
            tracing::info!("Created first admin {} ({})", email, admin_id);
        }
    }

    // --- Load Templates ---
    let template_cache = load_templates(&config.template_dir)?;
    let watched_cache = template_cache.clone();
    let watched_dir = config.template_dir.clone();
    tokio::spawn(async move {
        if let Err(e) = watch_templates(watched_cache, watched_dir).await {
            tracing::error!("Template watcher failed: {}", e);
        }
    });

    let mailer: Arc<dyn Mailer> = Arc::new(SmtpMailer::new(&config.smtp)?);
    if let Some(secs) = config.email_interval_secs {
        let store: Arc<dyn EmailQueueStore> = db.clone();
        spawn_periodic_drain(
            store,
            mailer.clone(),
            config.smtp.from.clone(),
            config.email_batch_size,
            Duration::from_secs(secs),
        );
    }

    let bind_address = config.bind_address.clone();
    let state_data = web::Data::new(state_manager);
    let template_data = web::Data::new(template_cache);
    let config_data = web::Data::new(config);
    let mailer_data = web::Data::new(mailer);

    tracing::info!("Starting HTTP server on {}", bind_address);
    HttpServer::new(move || {
        App::new()
            .app_data(state_data.clone())
            .app_data(template_data.clone())
            .app_data(config_data.clone())
            .app_data(mailer_data.clone())
            .wrap(Logger::default())
            .configure(server::configure)
    })
    .bind(bind_address)?
    .run()
    .await?;

    Ok(())
}
