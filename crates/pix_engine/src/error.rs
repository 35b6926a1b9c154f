//! Unified error types for pix_engine

use std::fmt;

use thiserror::Error;

use crate::connection::ConnectionState;

/// Main error type for pix_engine operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CanvasError {
    // === Palette Errors ===
    #[error("Unknown palette: {name}")]
    UnknownPalette { name: String },

    #[error("Color index {index} out of range for palette '{palette}' ({len} colors)")]
    IndexOutOfRange { palette: String, index: i32, len: usize },

    #[error("Invalid hex color: {value}")]
    InvalidHexColor { value: String },

    // === Codec Errors ===
    #[error("{field} value {value} is not representable in the wire frame")]
    EncodeRange { field: &'static str, value: i64 },

    #[error("Frame length must be {expected} bytes, got {actual}")]
    FrameLength { expected: usize, actual: usize },

    #[error("Failed to parse frame: {message}")]
    FrameParse { message: String },

    // === Validation Errors ===
    #[error("Update rejected: {0}")]
    ValidationRejected(Rejection),

    // === Connection Errors ===
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Not connected")]
    NotConnected,

    #[error("Cannot {action} while {state:?}")]
    InvalidTransition { action: &'static str, state: ConnectionState },

    // === Configuration Errors ===
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("I/O error: {message}")]
    Io { message: String },
}

impl CanvasError {
    pub fn frame_parse(message: impl Into<String>) -> Self {
        CanvasError::FrameParse { message: message.into() }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        CanvasError::Transport { message: message.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        CanvasError::Config { message: message.into() }
    }
}

impl From<std::io::Error> for CanvasError {
    fn from(err: std::io::Error) -> Self {
        CanvasError::Io { message: err.to_string() }
    }
}

impl From<Rejection> for CanvasError {
    fn from(rejection: Rejection) -> Self {
        CanvasError::ValidationRejected(rejection)
    }
}

/// The first bounds check an update failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    XOutOfBounds { x: i32, width: u32 },
    YOutOfBounds { y: i32, height: u32 },
    ColorIndexOutOfRange { index: u8, palette_size: usize },
    /// An indexed color on a direct-color canvas or the other way round.
    RepresentationMismatch,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::XOutOfBounds { x, width } => write!(f, "x {x} outside 0..{width}"),
            Rejection::YOutOfBounds { y, height } => write!(f, "y {y} outside 0..{height}"),
            Rejection::ColorIndexOutOfRange { index, palette_size } => {
                write!(f, "color index {index} outside palette of {palette_size} colors")
            }
            Rejection::RepresentationMismatch => write!(f, "color representation does not match the canvas"),
        }
    }
}

pub type Result<T> = std::result::Result<T, CanvasError>;
