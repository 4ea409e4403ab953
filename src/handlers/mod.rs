pub mod auth;
pub mod fetch;
pub mod health;
pub mod password_reset;
pub mod payload;
pub mod uploads;
