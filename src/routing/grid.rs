//! Obstacle rasterisation.

use std::collections::HashMap;

use crate::kicad::board::{self, BoundingBox, Point};
use crate::kicad::layers::pattern_matches;
use crate::kicad::sexpr::Document;

use super::{
    RouteRequest, RouterConfig, RoutingError, CONTENT_MARGIN, DEFAULT_GRID_RESOLUTION,
    MIN_GRID_RESOLUTION,
};

/// A grid cell on one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cell {
    /// Column (X index).
    pub col: usize,
    /// Row (Y index).
    pub row: usize,
    /// Index into [`ObstacleGrid::layers`].
    pub layer: usize,
}

/// Occupancy grid over the routable area, one plane per layer.
///
/// Blocked cells remember which net put them there, so the net being routed
/// can pass through its own copper. A cell blocked by several nets, or by
/// something without a net, stays blocked for everyone.
#[derive(Debug, Clone)]
pub struct ObstacleGrid {
    origin: Point,
    resolution: f64,
    cols: usize,
    rows: usize,
    layers: Vec<String>,
    blocked: HashMap<Cell, Option<u32>>,
}

impl ObstacleGrid {
    /// Creates an empty grid covering `bounds`.
    ///
    /// A pitch below [`MIN_GRID_RESOLUTION`] is raised to it; a non-finite
    /// pitch falls back to [`DEFAULT_GRID_RESOLUTION`].
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn new(bounds: BoundingBox, resolution: f64, layers: Vec<String>) -> Self {
        let resolution = if resolution.is_finite() {
            resolution.max(MIN_GRID_RESOLUTION)
        } else {
            DEFAULT_GRID_RESOLUTION
        };
        let cols = ((bounds.width() / resolution).ceil().max(0.0) as usize).saturating_add(1);
        let rows = ((bounds.height() / resolution).ceil().max(0.0) as usize).saturating_add(1);
        Self {
            origin: Point::new(bounds.min_x, bounds.min_y),
            resolution,
            cols,
            rows,
            layers,
            blocked: HashMap::new(),
        }
    }

    /// Builds the grid for `request` from the board's copper.
    ///
    /// The area is the Edge.Cuts outline, or the board content plus a margin
    /// when there is no outline. Pads, tracks and vias are inflated by the
    /// clearance plus half the requested track width. Copper on the
    /// requested net is then released.
    #[must_use]
    pub fn from_board(
        doc: &Document,
        layers: &[String],
        config: &RouterConfig,
        request: &RouteRequest,
    ) -> Self {
        let bounds = board::outline_bbox(doc).unwrap_or_else(|| {
            let mut bbox = board::content_bbox(doc).unwrap_or_else(|| BoundingBox::at(request.start));
            bbox.include(request.start);
            bbox.include(request.end);
            bbox.expanded(CONTENT_MARGIN)
        });
        let mut grid = Self::new(bounds, config.resolution, layers.to_vec());
        let inflate = config.clearance + request.width / 2.0;

        for component in board::components(doc) {
            for pad in &component.pads {
                let (sin, cos) = pad.angle.to_radians().sin_cos();
                let half_w = (pad.width * cos).abs().mul_add(0.5, (pad.height * sin).abs() * 0.5);
                let half_h = (pad.width * sin).abs().mul_add(0.5, (pad.height * cos).abs() * 0.5);
                let area = BoundingBox {
                    min_x: pad.x - half_w,
                    min_y: pad.y - half_h,
                    max_x: pad.x + half_w,
                    max_y: pad.y + half_h,
                }
                .expanded(inflate);
                let owner = pad.net.filter(|&n| n != 0);
                for layer in 0..grid.layers.len() {
                    if pad.layers.iter().any(|p| pattern_matches(p, &grid.layers[layer])) {
                        grid.block_rect(layer, area, owner);
                    }
                }
            }
        }

        for segment in board::segments(doc) {
            if let Some(layer) = grid.layer_index(&segment.layer) {
                let owner = Some(segment.net).filter(|&n| n != 0);
                grid.block_segment(
                    layer,
                    segment.start,
                    segment.end,
                    segment.width / 2.0 + inflate,
                    owner,
                );
            }
        }

        for via in board::vias(doc) {
            let owner = Some(via.net).filter(|&n| n != 0);
            for layer in 0..grid.layers.len() {
                grid.block_segment(layer, via.at, via.at, via.size / 2.0 + inflate, owner);
            }
        }

        if request.net != 0 {
            grid.clear_net(request.net);
        }
        grid
    }

    /// Routing layer names, in stack order.
    #[must_use]
    pub fn layers(&self) -> &[String] {
        &self.layers
    }

    /// Grid pitch in mm.
    #[must_use]
    pub const fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Grid dimensions as `(columns, rows)`.
    #[must_use]
    pub const fn dimensions(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    /// Index of a layer in [`ObstacleGrid::layers`].
    #[must_use]
    pub fn layer_index(&self, name: &str) -> Option<usize> {
        self.layers.iter().position(|l| l == name)
    }

    /// Nearest cell to `point` on `layer`.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::UnknownLayer`] or [`RoutingError::OutOfBounds`].
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn cell_at(&self, point: Point, layer: &str) -> Result<Cell, RoutingError> {
        let layer = self
            .layer_index(layer)
            .ok_or_else(|| RoutingError::UnknownLayer(layer.to_string()))?;
        let col = ((point.x - self.origin.x) / self.resolution).round();
        let row = ((point.y - self.origin.y) / self.resolution).round();
        if !col.is_finite() || !row.is_finite() || col < 0.0 || row < 0.0 {
            return Err(RoutingError::OutOfBounds {
                x: point.x,
                y: point.y,
            });
        }
        let (col, row) = (col as usize, row as usize);
        if col >= self.cols || row >= self.rows {
            return Err(RoutingError::OutOfBounds {
                x: point.x,
                y: point.y,
            });
        }
        Ok(Cell { col, row, layer })
    }

    /// Centre of a cell in board coordinates.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn point_of(&self, cell: Cell) -> Point {
        Point::new(
            (cell.col as f64).mul_add(self.resolution, self.origin.x),
            (cell.row as f64).mul_add(self.resolution, self.origin.y),
        )
    }

    /// Returns `true` if the cell is inside the grid.
    #[must_use]
    pub const fn in_bounds(&self, col: usize, row: usize) -> bool {
        col < self.cols && row < self.rows
    }

    /// Returns `true` if the cell is occupied.
    #[must_use]
    pub fn is_blocked(&self, cell: Cell) -> bool {
        self.blocked.contains_key(&cell)
    }

    /// Number of blocked cells over all layers.
    #[must_use]
    pub fn blocked_count(&self) -> usize {
        self.blocked.len()
    }

    fn mark(&mut self, cell: Cell, owner: Option<u32>) {
        self.blocked
            .entry(cell)
            .and_modify(|existing| {
                if *existing != owner {
                    *existing = None;
                }
            })
            .or_insert(owner);
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn cell_range(&self, min: f64, max: f64, origin: f64, count: usize) -> (usize, usize) {
        let lo = ((min - origin) / self.resolution).floor().max(0.0) as usize;
        let hi = ((max - origin) / self.resolution).ceil().max(0.0) as usize;
        (lo, hi.min(count.saturating_sub(1)))
    }

    /// Blocks every cell whose centre lies in `area` on `layer`.
    pub fn block_rect(&mut self, layer: usize, area: BoundingBox, owner: Option<u32>) {
        let (c0, c1) = self.cell_range(area.min_x, area.max_x, self.origin.x, self.cols);
        let (r0, r1) = self.cell_range(area.min_y, area.max_y, self.origin.y, self.rows);
        for col in c0..=c1 {
            for row in r0..=r1 {
                let cell = Cell { col, row, layer };
                if area.contains(self.point_of(cell)) {
                    self.mark(cell, owner);
                }
            }
        }
    }

    /// Blocks every cell whose centre is within `radius` of the segment
    /// `a`–`b` on `layer`. A zero-length segment blocks a disc.
    pub fn block_segment(
        &mut self,
        layer: usize,
        a: Point,
        b: Point,
        radius: f64,
        owner: Option<u32>,
    ) {
        let mut area = BoundingBox::at(a);
        area.include(b);
        let area = area.expanded(radius);
        let (c0, c1) = self.cell_range(area.min_x, area.max_x, self.origin.x, self.cols);
        let (r0, r1) = self.cell_range(area.min_y, area.max_y, self.origin.y, self.rows);
        for col in c0..=c1 {
            for row in r0..=r1 {
                let cell = Cell { col, row, layer };
                if distance_to_segment(self.point_of(cell), a, b) <= radius {
                    self.mark(cell, owner);
                }
            }
        }
    }

    /// Releases every cell blocked only by `net`.
    pub fn clear_net(&mut self, net: u32) {
        self.blocked.retain(|_, owner| *owner != Some(net));
    }
}

fn distance_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx.mul_add(dx, dy * dy);
    if len_sq == 0.0 {
        return p.distance(a);
    }
    let t = ((p.x - a.x).mul_add(dx, (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    p.distance(Point::new(t.mul_add(dx, a.x), t.mul_add(dy, a.y)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_layer_grid() -> ObstacleGrid {
        let bounds = BoundingBox {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 10.0,
            max_y: 10.0,
        };
        ObstacleGrid::new(bounds, 1.0, vec!["F.Cu".into(), "B.Cu".into()])
    }

    #[test]
    fn cell_mapping() {
        let grid = two_layer_grid();
        assert_eq!(grid.dimensions(), (11, 11));
        let cell = grid.cell_at(Point::new(3.2, 4.6), "B.Cu").unwrap();
        assert_eq!((cell.col, cell.row, cell.layer), (3, 5, 1));
        assert_eq!(grid.point_of(cell), Point::new(3.0, 5.0));
        assert!(matches!(
            grid.cell_at(Point::new(11.0, 0.0), "F.Cu"),
            Err(RoutingError::OutOfBounds { .. })
        ));
        assert!(matches!(
            grid.cell_at(Point::new(1.0, 1.0), "In1.Cu"),
            Err(RoutingError::UnknownLayer(_))
        ));
    }

    #[test]
    fn segment_blocks_thick_line() {
        let mut grid = two_layer_grid();
        grid.block_segment(0, Point::new(2.0, 5.0), Point::new(8.0, 5.0), 1.0, Some(3));
        assert!(grid.is_blocked(Cell { col: 5, row: 5, layer: 0 }));
        assert!(grid.is_blocked(Cell { col: 5, row: 4, layer: 0 }));
        assert!(!grid.is_blocked(Cell { col: 5, row: 3, layer: 0 }));
        assert!(!grid.is_blocked(Cell { col: 5, row: 5, layer: 1 }));
    }

    #[test]
    fn clearing_a_net_keeps_shared_cells() {
        let mut grid = two_layer_grid();
        grid.block_segment(0, Point::new(0.0, 5.0), Point::new(5.0, 5.0), 0.1, Some(1));
        grid.block_segment(0, Point::new(5.0, 0.0), Point::new(5.0, 10.0), 0.1, Some(2));
        grid.clear_net(1);
        assert!(!grid.is_blocked(Cell { col: 2, row: 5, layer: 0 }));
        assert!(grid.is_blocked(Cell { col: 5, row: 5, layer: 0 }));
        assert!(grid.is_blocked(Cell { col: 5, row: 2, layer: 0 }));
    }

    #[test]
    fn degenerate_pitch_is_clamped() {
        let bounds = BoundingBox {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 10.0,
            max_y: 5.0,
        };
        for pitch in [0.0, -1.0, 1e-9] {
            let grid = ObstacleGrid::new(bounds, pitch, vec!["F.Cu".into()]);
            assert!((grid.resolution() - MIN_GRID_RESOLUTION).abs() < 1e-12);
            assert_eq!(grid.dimensions(), (1001, 501));
        }
        let grid = ObstacleGrid::new(bounds, f64::NAN, vec!["F.Cu".into()]);
        assert!((grid.resolution() - DEFAULT_GRID_RESOLUTION).abs() < 1e-12);
        assert_eq!(grid.dimensions(), (41, 21));
    }

    #[test]
    fn point_segment_distance() {
        let d = distance_to_segment(Point::new(5.0, 3.0), Point::new(0.0, 0.0), Point::new(10.0, 0.0));
        assert!((d - 3.0).abs() < 1e-12);
        let d = distance_to_segment(Point::new(-3.0, 4.0), Point::new(0.0, 0.0), Point::new(10.0, 0.0));
        assert!((d - 5.0).abs() < 1e-12);
    }
}
