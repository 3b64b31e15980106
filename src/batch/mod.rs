//! Batch assembly - host rows or columns into a typed [`crate::Table`]

pub mod batcher;

pub use batcher::TableBatcher;
