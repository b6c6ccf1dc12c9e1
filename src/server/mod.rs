//! Server module exposing the filter actions over HTTP
//!
//! This module provides a `ServerBuilder` that registers:
//! - `POST /{collection}/filter`, `/count` and `/history`
//! - a `/health` liveness route

pub mod builder;
pub mod router;

pub use builder::ServerBuilder;
pub use router::{FilterState, build_filter_routes};
