//! Common types.
pub mod peripheral;
pub mod uuid;
