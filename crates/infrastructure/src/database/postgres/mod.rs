pub mod postgres_booking_repository;

pub use postgres_booking_repository::PostgresBookingRepository;
