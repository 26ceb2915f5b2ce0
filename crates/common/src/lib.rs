//! Shared types for the QuickBooks gateway workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
