//! Intuit OAuth credential lifecycle
//!
//! Keeps one QuickBooks access/refresh token pair valid: persistence behind
//! the `CredentialStore` trait, refresh-grant exchanges against Intuit's token
//! endpoint, and a single-flight `TokenRefresher` that is the only writer of
//! the store. The interactive authorization flow that mints the first pair is
//! not part of this crate.
//!
//! Credential flow:
//! 1. Operator seeds `QB_ACCESS_TOKEN` / `QB_REFRESH_TOKEN` in the env file
//! 2. Every API call reads a fresh snapshot via `CredentialStore::load()`
//! 3. A 401/403 from QuickBooks triggers `TokenRefresher::refresh()`
//! 4. `token::refresh_token()` exchanges the refresh token exactly once
//! 5. The new pair is persisted via `CredentialStore::save()` before use

pub mod constants;
pub mod credentials;
pub mod error;
pub mod refresher;
pub mod token;

pub use constants::*;
pub use credentials::{Credential, CredentialStore, EnvFileStore, MemoryStore};
pub use error::{Error, Result};
pub use refresher::TokenRefresher;
pub use token::{TokenResponse, basic_auth_header, refresh_token};
