pub mod sqlite_booking_repository;

pub use sqlite_booking_repository::SqliteBookingRepository;
