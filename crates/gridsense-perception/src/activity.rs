//! Per-cell debug hooks.
//!
//! A [`CellObserver`] is told, once per cell and cycle, which object (if any)
//! the cell reported.  [`CellActivity`] turns that into one colour per cell,
//! suitable for overlaying the grid in a viewer or a terminal map.

use gridsense_types::Rgba;

use crate::selection::DetectedObject;

/// Callback invoked by the sensor for every cell of a perception cycle.
pub trait CellObserver {
    fn on_cell(&mut self, cell: usize, detected: Option<&DetectedObject>);
}

/// Observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl CellObserver for NoopObserver {
    fn on_cell(&mut self, _cell: usize, _detected: Option<&DetectedObject>) {}
}

/// Colour of a cell with nothing in it.
pub const EMPTY_CELL_COLOR: Rgba = Rgba::new(1.0, 1.0, 1.0, 0.25);

/// Alpha applied to the colour of an occupied cell.
pub const OCCUPIED_ALPHA: f32 = 0.5;

/// Records one debug colour per cell.
///
/// Occupied cells take the palette colour of their tag at half opacity, or
/// white when the palette has no entry for that tag.
#[derive(Debug, Clone, PartialEq)]
pub struct CellActivity {
    palette: Vec<Rgba>,
    colors: Vec<Rgba>,
}

impl CellActivity {
    pub fn new(num_cells: usize, palette: Vec<Rgba>) -> Self {
        Self {
            palette,
            colors: vec![EMPTY_CELL_COLOR; num_cells],
        }
    }

    /// Colour of every cell, indexed by cell.
    pub fn colors(&self) -> &[Rgba] {
        &self.colors
    }

    /// Number of cells currently showing a detection.
    pub fn occupied(&self) -> usize {
        self.colors.iter().filter(|c| c.a == OCCUPIED_ALPHA).count()
    }

    fn color_for(&self, detected: &DetectedObject) -> Rgba {
        self.palette
            .get(detected.tag_index)
            .copied()
            .unwrap_or(Rgba::new(1.0, 1.0, 1.0, 1.0))
            .with_alpha(OCCUPIED_ALPHA)
    }
}

impl CellObserver for CellActivity {
    fn on_cell(&mut self, cell: usize, detected: Option<&DetectedObject>) {
        let color = match detected {
            Some(d) => self.color_for(d),
            None => EMPTY_CELL_COLOR,
        };
        if let Some(slot) = self.colors.get_mut(cell) {
            *slot = color;
        }
    }
}
