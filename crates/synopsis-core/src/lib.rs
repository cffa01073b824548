//! # synopsis-core
//!
//! Core types, traits, and abstractions for the synopsis service.
//!
//! This crate provides the data model, the error taxonomy, and the trait
//! seams (storage repositories, inference backends) that the other synopsis
//! crates build on.

pub mod defaults;
pub mod distance;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use distance::{euclidean_distance, squared_euclidean};
pub use error::{Error, ErrorKind, Result};
pub use models::*;
pub use traits::*;
