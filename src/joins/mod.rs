//! Declared joins between collections and join path resolution

pub mod registry;

pub use registry::{JoinPathError, JoinRegistry};
