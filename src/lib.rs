pub mod api;
pub mod bootstrap;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod service;

pub use api::{router, AppState};
pub use config::AppConfig;
pub use error::AppError;
