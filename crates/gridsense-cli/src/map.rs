//! Terminal occupancy map of one perception cycle.

use colored::Colorize;
use gridsense_perception::activity::{CellActivity, CellObserver};
use gridsense_perception::selection::DetectedObject;
use gridsense_types::{GridConfiguration, Rgba};

/// Records, for every cell, the colour and tag the sensor reported.
#[derive(Debug, Clone)]
pub struct MapRecorder {
    activity: CellActivity,
    tags: Vec<Option<usize>>,
}

impl MapRecorder {
    pub fn new(config: &GridConfiguration) -> Self {
        Self {
            activity: CellActivity::new(config.num_cells(), config.debug_colors.clone()),
            tags: vec![None; config.num_cells()],
        }
    }

    /// Number of cells that reported an object.
    pub fn occupied(&self) -> usize {
        self.tags.iter().filter(|t| t.is_some()).count()
    }

    pub fn tag_at(&self, cell: usize) -> Option<usize> {
        self.tags.get(cell).copied().flatten()
    }

    pub fn color_at(&self, cell: usize) -> Option<Rgba> {
        self.activity.colors().get(cell).copied()
    }
}

impl CellObserver for MapRecorder {
    fn on_cell(&mut self, cell: usize, detected: Option<&DetectedObject>) {
        self.activity.on_cell(cell, detected);
        if let Some(slot) = self.tags.get_mut(cell) {
            *slot = detected.map(|d| d.tag_index);
        }
    }
}

fn glyph(tag: &str) -> char {
    tag.chars().next().map_or('#', |c| c.to_ascii_uppercase())
}

fn channel(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Render the grid top row first (+z up), one glyph per cell: the initial of
/// the detected tag, `·` for empty cells and `@` for the observer's cell.
pub fn render(
    recorder: &MapRecorder,
    config: &GridConfiguration,
    observer_cell: Option<usize>,
) -> String {
    let nx = config.grid_num_side_x;
    let nz = config.grid_num_side_z;
    let mut out = String::new();

    for row in (0..nz).rev() {
        out.push_str("  ");
        for column in 0..nx {
            let cell = row * nx + column;
            let text = if observer_cell == Some(cell) {
                "@".bold().to_string()
            } else if let Some(index) = recorder.tag_at(cell) {
                let tag = config.detectable_tags.get(index).map_or("", String::as_str);
                let letter = glyph(tag).to_string();
                match recorder.color_at(cell) {
                    Some(c) if !config.debug_colors.is_empty() => {
                        letter.truecolor(channel(c.r), channel(c.g), channel(c.b)).to_string()
                    }
                    _ => letter.green().to_string(),
                }
            } else {
                "·".dimmed().to_string()
            };
            out.push_str(&text);
            out.push(' ');
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsense_types::ObjectId;

    fn config() -> GridConfiguration {
        GridConfiguration {
            grid_num_side_x: 3,
            grid_num_side_z: 2,
            detectable_tags: vec!["food".to_string(), "wall".to_string()],
            ..Default::default()
        }
    }

    fn hit(tag_index: usize) -> DetectedObject {
        DetectedObject {
            id: ObjectId::new(),
            tag_index,
            normalized_distance: 0.0,
        }
    }

    #[test]
    fn recorder_tracks_tags_and_colours() {
        let mut cfg = config();
        cfg.debug_colors = vec![Rgba::new(1.0, 0.0, 0.0, 1.0)];
        let mut recorder = MapRecorder::new(&cfg);
        recorder.on_cell(1, Some(&hit(0)));
        recorder.on_cell(2, None);

        assert_eq!(recorder.occupied(), 1);
        assert_eq!(recorder.tag_at(1), Some(0));
        assert_eq!(recorder.tag_at(2), None);
        assert_eq!(recorder.color_at(1), Some(Rgba::new(1.0, 0.0, 0.0, 0.5)));
    }

    #[test]
    fn render_puts_highest_row_first() {
        colored::control::set_override(false);
        let cfg = config();
        let mut recorder = MapRecorder::new(&cfg);
        recorder.on_cell(0, Some(&hit(0)));
        recorder.on_cell(5, Some(&hit(1)));

        let map = render(&recorder, &cfg, Some(4));
        let lines: Vec<&str> = map.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].trim_end(), "  · @ W");
        assert_eq!(lines[1].trim_end(), "  F · ·");
    }

    #[test]
    fn glyph_falls_back_for_empty_tag() {
        assert_eq!(glyph(""), '#');
        assert_eq!(glyph("rock"), 'R');
    }
}
