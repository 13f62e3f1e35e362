//! Resilience patterns for calls against unreliable dependencies
//!
//! This library provides:
//! - **Retry**: Exponential backoff with jitter for transient failures
//! - **Transient classification**: a single predicate trait deciding which
//!   errors are worth another attempt
//!
//! # Example: Store Call with Retry
//!
//! ```rust,no_run
//! use resilience::{with_retry, RetryConfig, Transient};
//!
//! #[derive(Debug)]
//! struct StoreDown;
//!
//! impl std::fmt::Display for StoreDown {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         f.write_str("connection refused")
//!     }
//! }
//!
//! impl Transient for StoreDown {
//!     fn is_transient(&self) -> bool {
//!         true
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = RetryConfig::default();
//!
//!     let result = with_retry(&config, || async {
//!         // Your store call here
//!         Ok::<_, StoreDown>(())
//!     })
//!     .await;
//! }
//! ```

pub mod retry;

pub use retry::{with_retry, RetryConfig, Transient};
