#[allow(clippy::module_inception)]
mod analyzer;
pub mod record_dump;
pub mod survey;
pub mod world;

pub use analyzer::*;
