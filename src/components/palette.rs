// ============================================================================
// BRUSH PALETTE: semantic brushes: a label and the color that stands for it
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::components::colors::HexColor;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaletteError {
    #[error("brush label must not be empty")]
    EmptyLabel,
    #[error(transparent)]
    InvalidColor(#[from] crate::components::colors::InvalidHexColor),
    #[error("no brush at index {0}")]
    NoSuchBrush(usize),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brush {
    pub label: String,
    pub color: HexColor,
}

impl Brush {
    /// Validated constructor for user-entered brushes.
    pub fn new(label: &str, color: &str) -> Result<Self, PaletteError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(PaletteError::EmptyLabel);
        }
        Ok(Self {
            label: label.to_string(),
            color: HexColor::parse(color)?,
        })
    }
}

/// Ordered brushes. Duplicate colors are allowed; brushes are identified by
/// position only.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BrushPalette {
    brushes: Vec<Brush>,
}

impl BrushPalette {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn brushes(&self) -> &[Brush] {
        &self.brushes
    }

    pub fn get(&self, index: usize) -> Option<&Brush> {
        self.brushes.get(index)
    }

    pub fn len(&self) -> usize {
        self.brushes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.brushes.is_empty()
    }

    /// Swap in a fresh batch. Returns the first brush's color, which the
    /// session adopts as the active paint color.
    pub fn replace_all(&mut self, brushes: Vec<Brush>) -> Option<HexColor> {
        self.brushes = brushes;
        self.brushes.first().map(|b| b.color)
    }

    /// Add one brush at the end. The active color is the caller's business.
    pub fn append(&mut self, brush: Brush) {
        self.brushes.push(brush);
    }

    /// One "- Color #rrggbb represents Label" line per brush.
    pub fn legend(&self) -> String {
        self.brushes
            .iter()
            .map(|b| format!("- Color {} represents {}\n", b.color, b.label))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn brush(label: &str, color: &str) -> Brush {
        Brush::new(label, color).unwrap()
    }

    #[test]
    fn manual_brush_validation() {
        assert_eq!(Brush::new("", "#ff0000"), Err(PaletteError::EmptyLabel));
        assert_eq!(Brush::new("   ", "#ff0000"), Err(PaletteError::EmptyLabel));
        assert!(matches!(
            Brush::new("Lava", "#ff00"),
            Err(PaletteError::InvalidColor(_))
        ));
        assert_eq!(
            Brush::new(" Lava ", "#FF4500").unwrap(),
            Brush {
                label: "Lava".to_string(),
                color: HexColor::rgb(0xff, 0x45, 0x00),
            }
        );
    }

    #[test]
    fn replace_all_reports_first_color() {
        let mut palette = BrushPalette::new();
        palette.append(brush("Old", "#000001"));

        let first = palette.replace_all(vec![brush("Sky", "#87ceeb"), brush("Grass", "#228b22")]);
        assert_eq!(first, Some(HexColor::parse("#87ceeb").unwrap()));
        assert_eq!(palette.len(), 2);
        assert_eq!(palette.get(0).unwrap().label, "Sky");

        assert_eq!(palette.replace_all(Vec::new()), None);
        assert!(palette.is_empty());
    }

    #[test]
    fn append_keeps_order_and_duplicate_colors() {
        let mut palette = BrushPalette::new();
        palette.append(brush("Water", "#0000ff"));
        palette.append(brush("Sky", "#0000FF"));
        let labels: Vec<_> = palette.brushes().iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["Water", "Sky"]);
        assert_eq!(palette.brushes()[0].color, palette.brushes()[1].color);
    }

    #[test]
    fn legend_lists_every_brush() {
        let mut palette = BrushPalette::new();
        assert_eq!(palette.legend(), "");
        palette.append(brush("Sky", "#87CEEB"));
        palette.append(brush("Tree Bark", "#8b4513"));
        assert_eq!(
            palette.legend(),
            "- Color #87ceeb represents Sky\n- Color #8b4513 represents Tree Bark\n"
        );
    }
}
