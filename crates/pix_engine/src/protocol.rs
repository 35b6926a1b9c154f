//! Pixel canvas wire types.
//!
//! Two layouts exist for the same unit of mutation, a [`PixelUpdate`]:
//!
//! | Protocol | Frame | Color |
//! |----------|-------|-------|
//! | `binary` | 5 bytes: x u16 LE, y u16 LE, color index in the low nibble | palette index 0-15 |
//! | `text`   | JSON object `{x, y, color}` or an array of those | packed `(r<<16)\|(g<<8)\|b` or `#rrggbb` |
//!
//! A running system speaks exactly one of them.

use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message;

use crate::{CanvasError, ColorRepresentation, ColorValue, PixelCodec};

/// Wire protocol selected by configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Binary,
    Text,
}

impl Protocol {
    pub fn codec(&self) -> PixelCodec {
        match self {
            Protocol::Binary => PixelCodec::BinaryIndexed,
            Protocol::Text => PixelCodec::TextStructured,
        }
    }

    pub fn representation(&self) -> ColorRepresentation {
        self.codec().representation()
    }
}

/// One cell's coordinate plus its new color.
///
/// Coordinates are signed so that out-of-range input (negative or past the
/// 16-bit wire range) survives decoding and is rejected by validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelUpdate {
    pub x: i32,
    pub y: i32,
    pub color: ColorValue,
}

impl PixelUpdate {
    pub fn new(x: i32, y: i32, color: ColorValue) -> Self {
        Self { x, y, color }
    }

    pub fn indexed(x: i32, y: i32, index: u8) -> Self {
        Self::new(x, y, ColorValue::Index(index))
    }

    pub fn rgb(x: i32, y: i32, color: crate::Color) -> Self {
        Self::new(x, y, ColorValue::Rgb(color))
    }
}

/// An encoded frame as it travels over the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    Binary(Vec<u8>),
    Text(String),
}

impl WireFrame {
    pub fn len(&self) -> usize {
        match self {
            WireFrame::Binary(bytes) => bytes.len(),
            WireFrame::Text(text) => text.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert an inbound WebSocket message. Control frames yield `None`.
    pub fn from_message(msg: Message) -> Option<Self> {
        match msg {
            Message::Binary(bytes) => Some(WireFrame::Binary(bytes.to_vec())),
            Message::Text(text) => Some(WireFrame::Text(text.as_str().to_string())),
            _ => None,
        }
    }

    pub fn into_message(self) -> Message {
        match self {
            WireFrame::Binary(bytes) => Message::binary(bytes),
            WireFrame::Text(text) => Message::text(text),
        }
    }
}

impl std::fmt::Display for WireFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireFrame::Binary(bytes) => {
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{b:02X}")?;
                }
                Ok(())
            }
            WireFrame::Text(text) => write!(f, "{text}"),
        }
    }
}

/// Classification of an inbound frame before dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Single(PixelUpdate),
    /// One entry per array element, in wire order. Failed elements do not affect their siblings.
    Batch(Vec<Result<PixelUpdate, CanvasError>>),
    Malformed(CanvasError),
}

impl Decoded {
    /// Flatten into per-update results in wire order.
    pub fn into_results(self) -> Vec<Result<PixelUpdate, CanvasError>> {
        match self {
            Decoded::Single(update) => vec![Ok(update)],
            Decoded::Batch(items) => items,
            Decoded::Malformed(err) => vec![Err(err)],
        }
    }
}

/// Text layout record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRecord {
    pub x: i64,
    pub y: i64,
    #[serde(alias = "colorValue")]
    pub color: RecordColor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordColor {
    /// `(r<<16)|(g<<8)|b`
    Packed(i64),
    /// `#rrggbb`
    Literal(String),
}
