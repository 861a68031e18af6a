pub mod api_observability;
pub mod app_config;
pub mod arbiter;
pub mod database;

pub use api_observability::{ApiConfig, ObservabilityConfig};
pub use app_config::AppConfig;
pub use arbiter::{ArbiterConfig, NotifierConfig, NotifierKind};
pub use database::DatabaseConfig;
