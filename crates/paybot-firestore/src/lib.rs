//! Firestore REST API client.
//!
//! This crate provides:
//! - Document CRUD with merge-mask upserts over the `documents` REST surface
//! - Structured queries with conjoined equality/range filters and limits
//! - Sequential write batches replaying in enqueue order
//! - Self-contained service-account authentication (assertion signing and
//!   token exchange) with a cached bearer token
//! - A JSON value codec for the typed wire format
//!
//! The deployment runtime cannot load the native driver, so the subset of
//! store semantics the application needs is implemented here directly.

pub mod client;
pub mod codec;
pub mod credentials;
pub mod error;
pub mod metrics;
pub mod query;
pub mod retry;
pub mod signer;
pub mod token_cache;
pub mod transaction;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{FirestoreClient, FirestoreConfig};
pub use credentials::ServiceAccountKey;
pub use error::{FirestoreError, FirestoreResult};
pub use query::{FilterOp, QueryBuilder};
pub use retry::{with_retry, RetryConfig};
pub use signer::{AccessToken, ServiceAccountSigner, TokenProvider};
pub use token_cache::TokenCache;
pub use transaction::TransactionBatch;
pub use types::{Document, Value};
