use crate::{ColorRepresentation, ColorValue, PixelUpdate, Rejection};

/// Bounds check shared by the send path and the receive path.
///
/// Checks run in a fixed order and stop at the first failure:
/// x, then y, then the color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateValidator {
    pub width: u32,
    pub height: u32,
    pub palette_size: usize,
    pub representation: ColorRepresentation,
}

impl UpdateValidator {
    pub fn new(width: u32, height: u32, palette_size: usize, representation: ColorRepresentation) -> Self {
        Self {
            width,
            height,
            palette_size,
            representation,
        }
    }

    pub fn validate(&self, update: &PixelUpdate) -> Result<(), Rejection> {
        if update.x < 0 || update.x as i64 >= self.width as i64 {
            return Err(Rejection::XOutOfBounds { x: update.x, width: self.width });
        }
        if update.y < 0 || update.y as i64 >= self.height as i64 {
            return Err(Rejection::YOutOfBounds {
                y: update.y,
                height: self.height,
            });
        }
        match (self.representation, update.color) {
            (ColorRepresentation::Indexed, ColorValue::Index(index)) => {
                if index as usize >= self.palette_size {
                    return Err(Rejection::ColorIndexOutOfRange {
                        index,
                        palette_size: self.palette_size,
                    });
                }
            }
            // u8 channels are always within 0..=255
            (ColorRepresentation::Direct, ColorValue::Rgb(_)) => {}
            _ => return Err(Rejection::RepresentationMismatch),
        }
        Ok(())
    }

    pub fn is_valid(&self, update: &PixelUpdate) -> bool {
        self.validate(update).is_ok()
    }
}
