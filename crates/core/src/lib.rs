//! `commerce-core`: storage-agnostic building blocks shared by the batch
//! dispatcher crates.
//!
//! This crate contains **pure** primitives (no IO, no async).

pub mod entity;
pub mod error;
pub mod id;
pub mod request;

pub use entity::{Entity, Kind};
pub use error::DomainError;
pub use id::{Key, Namespace};
pub use request::RequestSnapshot;
