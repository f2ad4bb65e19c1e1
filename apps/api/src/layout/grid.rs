//! Grid geometry — positions, the work area, and the layout configuration.
//!
//! All coordinates are integer grid units (GU) on a fixed grid (160×90 by default).
//! A `GridPosition` is a half-open rectangle: it covers `[left, left+width)` ×
//! `[top, top+height)`, so two boxes that merely touch do not overlap.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use crate::models::slide::{ContentDensity, ThemeRef};

// ────────────────────────────────────────────────────────────────────────────
// Positions
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridPosition {
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
}

impl GridPosition {
    pub fn new(left: u16, top: u16, width: u16, height: u16) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.left as u32 + self.width as u32
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.top as u32 + self.height as u32
    }

    pub fn area(&self) -> u32 {
        self.width as u32 * self.height as u32
    }

    pub fn center(&self) -> (f64, f64) {
        (
            self.left as f64 + self.width as f64 / 2.0,
            self.top as f64 + self.height as f64 / 2.0,
        )
    }

    /// Area of the intersection with `other`; 0 when the boxes only touch.
    pub fn intersection_area(&self, other: &GridPosition) -> u32 {
        let x0 = self.left.max(other.left) as u32;
        let y0 = self.top.max(other.top) as u32;
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            0
        } else {
            (x1 - x0) * (y1 - y0)
        }
    }

    pub fn overlaps(&self, other: &GridPosition) -> bool {
        self.intersection_area(other) > 0
    }

    pub fn fits_grid(&self, grid_width: u16, grid_height: u16) -> bool {
        self.right() <= grid_width as u32 && self.bottom() <= grid_height as u32
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Work area
// ────────────────────────────────────────────────────────────────────────────

/// The region containers may occupy: the grid minus margins and reserved zones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkArea {
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
}

impl WorkArea {
    pub fn right(&self) -> u32 {
        self.left as u32 + self.width as u32
    }

    pub fn bottom(&self) -> u32 {
        self.top as u32 + self.height as u32
    }

    pub fn area(&self) -> u32 {
        self.width as u32 * self.height as u32
    }

    pub fn center(&self) -> (f64, f64) {
        (
            self.left as f64 + self.width as f64 / 2.0,
            self.top as f64 + self.height as f64 / 2.0,
        )
    }

    pub fn contains(&self, pos: &GridPosition) -> bool {
        pos.left >= self.left
            && pos.top >= self.top
            && pos.right() <= self.right()
            && pos.bottom() <= self.bottom()
    }

    pub fn as_position(&self) -> GridPosition {
        GridPosition::new(self.left, self.top, self.width, self.height)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Layout configuration
// ────────────────────────────────────────────────────────────────────────────

/// Tunables for the layout engine. Loaded from the environment by `Config::from_env`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub grid_width: u16,
    pub grid_height: u16,
    /// Margin applied on every side of the grid.
    pub margin: u16,
    /// Minimum row gutter between siblings. Column gutters are scaled by the grid aspect.
    pub gutter: u16,
    pub white_space_min: f64,
    pub white_space_max: f64,
    pub max_iterations: u32,
    /// How many finalized layouts the variety tracker compares against.
    pub variety_window: usize,
    pub alignment_threshold: f64,
    /// Variety similarity above which a variation is applied.
    pub variety_similarity_threshold: f64,
    /// Max per-edge delta (GU) for two positions to count as "the same" in variety checks.
    pub variety_position_tolerance: u16,
    /// Max distance (GU) an edge may travel when snapping to a shared line.
    pub snap_tolerance: u16,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            grid_width: 160,
            grid_height: 90,
            margin: 8,
            gutter: 4,
            white_space_min: 0.30,
            white_space_max: 0.50,
            max_iterations: 5,
            variety_window: 6,
            alignment_threshold: 0.5,
            variety_similarity_threshold: 0.8,
            variety_position_tolerance: 4,
            snap_tolerance: 4,
        }
    }
}

impl LayoutConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.grid_width > 0 && self.grid_height > 0,
            "grid dimensions must be positive"
        );
        ensure!(
            (self.margin as u32) * 2 < self.grid_width as u32
                && (self.margin as u32) * 2 < self.grid_height as u32,
            "margin {} leaves no work area on a {}x{} grid",
            self.margin,
            self.grid_width,
            self.grid_height
        );
        ensure!(
            (0.0..=1.0).contains(&self.white_space_min)
                && (0.0..=1.0).contains(&self.white_space_max),
            "white-space bounds must lie within 0.0-1.0"
        );
        ensure!(
            self.white_space_min <= self.white_space_max,
            "white-space min {} exceeds max {}",
            self.white_space_min,
            self.white_space_max
        );
        ensure!(self.max_iterations > 0, "max refinement iterations must be ≥ 1");
        ensure!(
            (0.0..=1.0).contains(&self.alignment_threshold),
            "alignment threshold must lie within 0.0-1.0"
        );
        Ok(())
    }

    /// Work area for a slide: grid minus margins, minus the theme's header/footer zones.
    ///
    /// Reserved zones larger than the available height collapse the area to zero height
    /// rather than underflowing.
    pub fn work_area(&self, theme: Option<&ThemeRef>) -> WorkArea {
        let (header, footer) = theme
            .map(|t| (t.header_height, t.footer_height))
            .unwrap_or((0, 0));
        let inner_height = self.grid_height.saturating_sub(self.margin * 2);
        let header = header.min(inner_height);
        let footer = footer.min(inner_height - header);
        WorkArea {
            left: self.margin,
            top: self.margin + header,
            width: self.grid_width.saturating_sub(self.margin * 2),
            height: inner_height - header - footer,
        }
    }

    /// Horizontal gutter: the row gutter scaled by the grid aspect ratio (4 → 7 on 160×90).
    pub fn column_gutter(&self, gutter: u16) -> u16 {
        let aspect = self.grid_width as f64 / self.grid_height as f64;
        (gutter as f64 * aspect).round() as u16
    }

    pub fn white_space_midpoint(&self) -> f64 {
        (self.white_space_min + self.white_space_max) / 2.0
    }

    /// White-space ratio the first proposal aims for, by content density.
    pub fn white_space_target(&self, density: ContentDensity) -> f64 {
        let span = self.white_space_max - self.white_space_min;
        match density {
            ContentDensity::High => self.white_space_min + span * 0.25,
            ContentDensity::Medium => self.white_space_min + span * 0.5,
            ContentDensity::Low => self.white_space_min + span * 0.75,
        }
    }
}
