pub mod database;
pub mod error_handling;
pub mod in_memory_repository;
pub mod notifier;
pub mod observability;

pub use database::*;
pub use in_memory_repository::InMemoryBookingRepository;
pub use notifier::{create_notifier, LogNotifier, NoopNotifier, WebhookNotifier};
pub use observability::*;
