//! WATA checkout backend
//!
//! Creates orders, requests hosted payment links from WATA and settles
//! orders from signed WATA webhooks.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod orders;
pub mod payments;

pub use crate::config::Config;
pub use crate::error::{AppError, AppResult};
