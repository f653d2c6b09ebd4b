//! HTTP handlers for resources routed through the data store chain.

pub mod resource;
pub use resource::*;
