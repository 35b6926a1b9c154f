use byteorder::{ByteOrder, LittleEndian};
use serde_json::Value;

use crate::{CanvasError, Color, ColorRepresentation, ColorValue, Decoded, PixelRecord, PixelUpdate, RecordColor, Result, WireFrame};

pub const BINARY_FRAME_LEN: usize = 5;

/// Maximum records per JSON array produced by [`PixelCodec::encode_batch`].
pub const TEXT_BATCH_LIMIT: usize = 256;

const MAX_WIRE_INDEX: u8 = 0x0F;

/// Encoding strategy. One is chosen per running system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelCodec {
    BinaryIndexed,
    TextStructured,
}

impl PixelCodec {
    pub fn representation(&self) -> ColorRepresentation {
        match self {
            PixelCodec::BinaryIndexed => ColorRepresentation::Indexed,
            PixelCodec::TextStructured => ColorRepresentation::Direct,
        }
    }

    /// # Errors
    ///
    /// [`CanvasError::EncodeRange`] if the update cannot be represented in this layout.
    pub fn encode(&self, update: &PixelUpdate) -> Result<WireFrame> {
        match self {
            PixelCodec::BinaryIndexed => Ok(WireFrame::Binary(encode_binary(update)?.to_vec())),
            PixelCodec::TextStructured => Ok(WireFrame::Text(encode_text(update)?)),
        }
    }

    /// One frame per update for the binary layout; JSON arrays of at most
    /// [`TEXT_BATCH_LIMIT`] records for the text layout.
    ///
    /// # Errors
    ///
    /// Fails without producing any frame if one update is not representable.
    pub fn encode_batch(&self, updates: &[PixelUpdate]) -> Result<Vec<WireFrame>> {
        match self {
            PixelCodec::BinaryIndexed => updates
                .iter()
                .map(|u| encode_binary(u).map(|frame| WireFrame::Binary(frame.to_vec())))
                .collect(),
            PixelCodec::TextStructured => {
                let records = updates.iter().map(to_record).collect::<Result<Vec<_>>>()?;
                records
                    .chunks(TEXT_BATCH_LIMIT)
                    .map(|chunk| serde_json::to_string(chunk).map(WireFrame::Text).map_err(|e| CanvasError::frame_parse(e.to_string())))
                    .collect()
            }
        }
    }

    pub fn decode(&self, frame: &WireFrame) -> Decoded {
        match (self, frame) {
            (PixelCodec::BinaryIndexed, WireFrame::Binary(bytes)) => match decode_binary(bytes) {
                Ok(update) => Decoded::Single(update),
                Err(err) => Decoded::Malformed(err),
            },
            (PixelCodec::TextStructured, WireFrame::Text(text)) => decode_text(text),
            (PixelCodec::BinaryIndexed, WireFrame::Text(_)) => Decoded::Malformed(CanvasError::frame_parse("text frame on a binary connection")),
            (PixelCodec::TextStructured, WireFrame::Binary(_)) => Decoded::Malformed(CanvasError::frame_parse("binary frame on a text connection")),
        }
    }
}

/// Every field is range checked before the frame is assembled.
pub fn encode_binary(update: &PixelUpdate) -> Result<[u8; BINARY_FRAME_LEN]> {
    let x = u16::try_from(update.x).map_err(|_| CanvasError::EncodeRange {
        field: "x",
        value: update.x as i64,
    })?;
    let y = u16::try_from(update.y).map_err(|_| CanvasError::EncodeRange {
        field: "y",
        value: update.y as i64,
    })?;
    let index = match update.color {
        ColorValue::Index(index) if index <= MAX_WIRE_INDEX => index,
        ColorValue::Index(index) => {
            return Err(CanvasError::EncodeRange {
                field: "color",
                value: index as i64,
            });
        }
        ColorValue::Rgb(color) => {
            return Err(CanvasError::EncodeRange {
                field: "color",
                value: color.to_packed() as i64,
            });
        }
    };

    let mut frame = [0u8; BINARY_FRAME_LEN];
    LittleEndian::write_u16(&mut frame[0..2], x);
    LittleEndian::write_u16(&mut frame[2..4], y);
    frame[4] = index;
    Ok(frame)
}

/// The high nibble of the color byte is reserved and ignored.
pub fn decode_binary(bytes: &[u8]) -> Result<PixelUpdate> {
    if bytes.len() != BINARY_FRAME_LEN {
        return Err(CanvasError::FrameLength {
            expected: BINARY_FRAME_LEN,
            actual: bytes.len(),
        });
    }
    let x = LittleEndian::read_u16(&bytes[0..2]);
    let y = LittleEndian::read_u16(&bytes[2..4]);
    Ok(PixelUpdate::indexed(x as i32, y as i32, bytes[4] & MAX_WIRE_INDEX))
}

pub fn encode_text(update: &PixelUpdate) -> Result<String> {
    let record = to_record(update)?;
    serde_json::to_string(&record).map_err(|e| CanvasError::frame_parse(e.to_string()))
}

/// Classify a text payload as a single record, a batch, or garbage.
pub fn decode_text(text: &str) -> Decoded {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => return Decoded::Malformed(CanvasError::frame_parse(e.to_string())),
    };
    match value {
        Value::Object(_) => match decode_record(value) {
            Ok(update) => Decoded::Single(update),
            Err(err) => Decoded::Malformed(err),
        },
        Value::Array(items) => Decoded::Batch(items.into_iter().map(decode_record).collect()),
        other => Decoded::Malformed(CanvasError::frame_parse(format!("expected object or array, got {other}"))),
    }
}

fn to_record(update: &PixelUpdate) -> Result<PixelRecord> {
    let color = match update.color {
        ColorValue::Rgb(color) => color,
        ColorValue::Index(index) => {
            return Err(CanvasError::EncodeRange {
                field: "color",
                value: index as i64,
            });
        }
    };
    Ok(PixelRecord {
        x: update.x as i64,
        y: update.y as i64,
        color: RecordColor::Packed(color.to_packed() as i64),
    })
}

fn decode_record(value: Value) -> Result<PixelUpdate> {
    let record: PixelRecord = serde_json::from_value(value).map_err(|e| CanvasError::frame_parse(e.to_string()))?;
    let x = i32::try_from(record.x).map_err(|_| CanvasError::frame_parse(format!("x {} out of range", record.x)))?;
    let y = i32::try_from(record.y).map_err(|_| CanvasError::frame_parse(format!("y {} out of range", record.y)))?;
    let color = match record.color {
        RecordColor::Packed(packed) => u32::try_from(packed)
            .ok()
            .and_then(Color::from_packed)
            .ok_or_else(|| CanvasError::frame_parse(format!("packed color {packed} is not 24-bit")))?,
        RecordColor::Literal(hex) => Color::from_hex(&hex).map_err(|e| CanvasError::frame_parse(e.to_string()))?,
    };
    Ok(PixelUpdate::rgb(x, y, color))
}
