//! Core processing pipeline: block segmentation, configuration parsing,
//! variable expansion, the cascade, and the database session behind it.

pub mod blocks;
pub mod cascade;
pub mod error;
pub mod executor;
pub mod parser;
pub mod resolver;
pub mod session;
pub mod types;
pub mod walker;
