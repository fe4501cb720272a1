use thiserror::Error;

/// Reasons a telemetry line (or one of its fields) could not be decoded.
///
/// These never escape [`crate::decoder::Decoder::decode_line`]; they are logged
/// and the offending line or sub-field is dropped.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("time marker {0:?} is not a number")]
    InvalidTimeMarker(String),
    #[error("time marker {0} is outside the representable time range")]
    TimeMarkerOutOfRange(f64),
    #[error("field {field:?} has no '=' separator")]
    MissingSeparator { field: String },
    #[error("T value {value:?} has {pipes} pipe separators")]
    UnsupportedPipeCount { value: String, pipes: usize },
    #[error("T sub-field {index} value {value:?} is not a number")]
    InvalidOrientationValue { index: usize, value: String },
    #[error("reference time {0:?} is not a YYYY-MM-DDTHH:MM:SSZ timestamp")]
    InvalidReferenceTime(String),
}

/// Errors raised while opening or reading a telemetry source.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("archive contains no telemetry entry")]
    EmptyArchive,
    #[error("unsupported telemetry file {0:?}")]
    UnsupportedFile(String),
    #[error("handshake rejected by server: {0:?}")]
    HandshakeRejected(String),
    #[error("connection closed during handshake")]
    HandshakeClosed,
}
