//! Core type definitions shared by the store and its backends.

pub mod capability;
pub mod policy;

pub use capability::*;
pub use policy::*;
