pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

pub use error::{Result, RouterError};
