//! Payment provider implementations

pub mod wata;

pub use wata::{WataConfig, WataProvider};
