pub mod analyzer;
pub mod classification;
pub mod decoder;
pub mod entity;
mod error;
pub mod feed;
pub mod types;

pub use error::*;
pub use strum;
