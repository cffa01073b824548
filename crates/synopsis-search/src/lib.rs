//! # synopsis-search
//!
//! Vector search over stored embeddings.
//!
//! This crate provides:
//! - Batch-scoped nearest-neighbor queries (Euclidean distance)
//! - Seeded k-means partitioning (k-means++ init, Lloyd iterations)

pub mod kmeans;
pub mod similarity;

pub use kmeans::{kmeans, KMeansConfig, KMeansResult};
pub use similarity::SimilaritySearch;
