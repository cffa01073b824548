//! Service layer for business logic.

pub mod synopsis_service;

pub use synopsis_service::{ServiceOptions, SynopsisService};
