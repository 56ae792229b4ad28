#![warn(clippy::unwrap_used)]

pub mod error;
pub mod rest;
pub mod sequence_rest;
pub mod server;
pub mod swagger;

pub use server::{build_router, ApiServer};
pub use swagger::ApiDoc;
