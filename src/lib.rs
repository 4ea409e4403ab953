pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod handlers;
pub mod logging;
pub mod middleware;
pub mod payload;
pub mod router;
pub mod service;
pub mod upload;

pub use error::TollgateError;
pub use router::{AppState, tollgate_router};
