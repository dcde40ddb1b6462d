//! # Halyard Platform
//!
//! Core platform types for the halyard SSH client library.
//!
//! This crate provides the unified error type (`HalyardError`, `HalyardResult`)
//! shared by every halyard crate.
//!
//! # Examples
//!
//! ```
//! use halyard_platform::{HalyardError, HalyardResult};
//!
//! fn example_function() -> HalyardResult<String> {
//!     Ok("Hello, halyard!".to_string())
//! }
//!
//! # fn main() -> HalyardResult<()> {
//! let result = example_function()?;
//! assert_eq!(result, "Hello, halyard!");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod error;

pub use error::{HalyardError, HalyardResult};

/// Platform version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
