//! Core value types shared by the execution engine and its collaborators

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod types;

pub use types::*;
