use thiserror::Error;

pub type Result<T> = std::result::Result<T, CodecError>;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame size {size} is outside the accepted range (max {max})")]
    FrameSize { size: usize, max: usize },

    #[error("header length {header_len} exceeds frame length {frame_len}")]
    HeaderOverflow { header_len: usize, frame_len: usize },

    #[error("unsupported serialize type: {0}")]
    UnsupportedSerializeType(u8),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("body is not valid utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("body does not start with the expected `{expected}` wrapper")]
    MissingWrapper { expected: &'static str },

    #[error("malformed segment: {0}")]
    MalformedSegment(String),
}
