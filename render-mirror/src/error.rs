use std::fmt;

use acmi_telemetry::FeedError;

/// Typed error for driving a pipeline from a telemetry source.
#[derive(Debug)]
pub enum MirrorError {
    /// The source itself failed (file, archive, socket, handshake).
    Feed(FeedError),
    /// A producer thread panicked before reporting.
    ProducerPanicked,
}

impl fmt::Display for MirrorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Feed(e) => write!(f, "telemetry source failed: {e}"),
            Self::ProducerPanicked => write!(f, "telemetry producer thread panicked"),
        }
    }
}

impl std::error::Error for MirrorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Feed(e) => Some(e),
            Self::ProducerPanicked => None,
        }
    }
}

impl From<FeedError> for MirrorError {
    fn from(e: FeedError) -> Self {
        Self::Feed(e)
    }
}
