pub mod config;
mod error;
pub mod instance;
pub mod mirror;
pub mod packed;
pub mod pipeline;

pub use error::MirrorError;
pub use instance::{IconInstance, IconSet, IconShape, LockLine, LockPair, VelocityVector};
pub use mirror::{Frame, MirrorOptions, RenderMirror};
pub use packed::{MemoryReport, PackedArray};
pub use pipeline::{Pipeline, TickStats};
