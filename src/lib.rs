pub mod api;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod db_migrate;
pub mod email_queue;
pub mod email_sender;
pub mod error;
pub mod models;
pub mod report;
pub mod revenue;
pub mod server;
pub mod state;
pub mod templates;

pub use config::AppConfig;
pub use db::ScyllaConnector;
pub use error::Result as AppResult;
pub use state::StoreStateManager;
