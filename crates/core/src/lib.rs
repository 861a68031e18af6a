pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use errors::*;
pub use models::{
    AcceptAttempt, Booking, BookingDetails, BookingDispatch, BookingStatus, BookingTemplate,
    ClosedDispatch, Decision, DispatchStatus, ExpireReport, NotificationPayload, RejectAttempt,
    RespondOutcome,
};
pub use traits::{BookingRepository, DispatchNotifier};
