use crate::Color;

/// A raster target the connection manager projects committed cells onto.
///
/// Colors arrive already resolved through the active palette.
pub trait RenderSurface: Send {
    fn set_pixel(&mut self, x: u32, y: u32, color: Color);

    /// Snapshot of every cell, row-major.
    fn committed_frame(&self) -> Vec<Color>;
}

/// Row-major in-memory surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySurface {
    width: u32,
    height: u32,
    pixels: Vec<Color>,
}

impl MemorySurface {
    pub fn new(width: u32, height: u32, fill: Color) -> Self {
        Self {
            width,
            height,
            pixels: vec![fill; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        if x < self.width && y < self.height {
            self.pixels.get(y as usize * self.width as usize + x as usize).copied()
        } else {
            None
        }
    }
}

impl RenderSurface for MemorySurface {
    fn set_pixel(&mut self, x: u32, y: u32, color: Color) {
        if x < self.width && y < self.height {
            self.pixels[y as usize * self.width as usize + x as usize] = color;
        }
    }

    fn committed_frame(&self) -> Vec<Color> {
        self.pixels.clone()
    }
}

/// Maps pointer positions to grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelMapper {
    pub pixel_size: u32,
}

impl PixelMapper {
    pub fn new(pixel_size: u32) -> Self {
        Self { pixel_size: pixel_size.max(1) }
    }

    /// Floor division of the offset from the canvas origin. Positions left of
    /// or above the origin give negative cells, which validation rejects.
    pub fn cell_at(&self, client_x: i32, client_y: i32, origin_x: i32, origin_y: i32) -> (i32, i32) {
        let size = self.pixel_size.max(1) as i64;
        let x = (client_x as i64 - origin_x as i64).div_euclid(size);
        let y = (client_y as i64 - origin_y as i64).div_euclid(size);
        (x as i32, y as i32)
    }
}
