//! QuickBooks Online request dispatch
//!
//! Maps a fixed vocabulary of accounting operations (company info, entity
//! queries, named reports, the QuickBooks Time current user) onto REST calls
//! and shapes every outcome into a payload or an `OperationError`. Payloads
//! are opaque `serde_json::Value`s, never reshaped.
//!
//! Request flow:
//! 1. Caller invokes an `OperationCatalog` method (e.g. `invoices()`)
//! 2. `query::entity_query()` builds `SELECT * FROM Invoice` if needed
//! 3. `EndpointResolver` renders the sandbox or production URL
//! 4. `Session` loads the current credential and hands it to `RequestDispatcher`
//! 5. A 401/403 makes the `Session` refresh once (single-flight) and retry once

pub mod catalog;
pub mod classify;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod query;
pub mod session;

pub use catalog::{Operation, OperationCatalog};
pub use classify::{Classification, classify_status};
pub use dispatch::{DispatchResult, RequestDispatcher};
pub use endpoint::{EndpointResolver, Environment, Report, Resource, resolve};
pub use error::{DispatchError, OperationError, Result, UnknownName};
pub use query::{Entity, entity_query};
pub use session::Session;
