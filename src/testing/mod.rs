//! Testing infrastructure for promptloom.
//!
//! - **Mocks**: a [`GenerationBackend`](crate::backend::GenerationBackend)
//!   double with controllable seeds, empty results and errors
//! - **Fixtures**: temporary prompt trees (test-only)
//! - **Assertions**: composition-level checks
//!
//! # Example
//!
//! ```rust,ignore
//! use promptloom::testing::{LibraryFixture, MockBackend};
//!
//! let fixture = LibraryFixture::portrait();
//! let backend = MockBackend::new().with_seed(1234);
//! ```

pub mod assertions;
#[cfg(test)]
pub mod fixtures;
pub mod mocks;

pub use assertions::*;
#[cfg(test)]
pub use fixtures::*;
pub use mocks::*;
