//! Application services: the rendering pipeline and document adapters.

pub mod documents;
pub mod error;
pub mod render;
