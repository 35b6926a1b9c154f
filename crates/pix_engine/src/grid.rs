use crate::{ColorValue, PixelUpdate};

/// Last committed color per cell, row-major.
///
/// Dimensions are fixed at construction. Callers validate before committing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanvasGrid {
    width: u32,
    height: u32,
    background: ColorValue,
    cells: Vec<ColorValue>,
}

impl CanvasGrid {
    pub fn new(width: u32, height: u32, background: ColorValue) -> Self {
        Self {
            width,
            height,
            background,
            cells: vec![background; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn background(&self) -> ColorValue {
        self.background
    }

    fn offset(&self, x: i32, y: i32) -> Option<usize> {
        if x >= 0 && (x as i64) < self.width as i64 && y >= 0 && (y as i64) < self.height as i64 {
            Some(y as usize * self.width as usize + x as usize)
        } else {
            None
        }
    }

    /// Overwrite the cell at (x, y). Idempotent; coordinates outside the grid are ignored.
    pub fn commit(&mut self, x: i32, y: i32, value: ColorValue) {
        if let Some(offset) = self.offset(x, y) {
            self.cells[offset] = value;
        }
    }

    pub fn commit_update(&mut self, update: &PixelUpdate) {
        self.commit(update.x, update.y, update.color);
    }

    /// Applies in sequence order, so a later update for the same cell wins.
    pub fn commit_batch(&mut self, updates: &[PixelUpdate]) {
        for update in updates {
            self.commit_update(update);
        }
    }

    pub fn read(&self, x: i32, y: i32) -> Option<ColorValue> {
        self.offset(x, y).map(|offset| self.cells[offset])
    }

    pub fn cells(&self) -> &[ColorValue] {
        &self.cells
    }

    /// Every cell that differs from the background, row by row.
    pub fn painted_cells(&self) -> impl Iterator<Item = PixelUpdate> + '_ {
        let width = self.width as usize;
        self.cells
            .iter()
            .enumerate()
            .filter(move |(_, value)| **value != self.background)
            .map(move |(i, value)| PixelUpdate::new((i % width) as i32, (i / width) as i32, *value))
    }
}
