//! Parley core crate - data model, configuration, errors and store events
//! shared by the storage, chat and app crates.

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::ParleyConfig;
pub use error::{ParleyError, Result};
pub use events::StoreEvent;
pub use types::*;
