//! Core module
//!
//! Error taxonomy shared by every stage of the update pipeline.

pub mod error;

pub use error::{ErrorKind, Result, UpdateError};
