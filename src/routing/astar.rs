//! A* search over an [`ObstacleGrid`].

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use tracing::debug;

use super::grid::{Cell, ObstacleGrid};
use super::{Route, RouteRequest, RouterConfig, RoutingError, Waypoint};
use crate::kicad::board::Point;

/// Orthogonal moves first, then diagonals.
const MOVES: [(isize, isize); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

/// Open-set entry. Ordered so that [`BinaryHeap`] pops the lowest `f`, then
/// the lowest `g`, then the earliest pushed.
#[derive(Debug)]
struct OpenEntry {
    f: f64,
    g: f64,
    seq: u64,
    cell: Cell,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.g.total_cmp(&self.g))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Layer-aware A* pathfinder.
#[derive(Debug, Clone, Default)]
pub struct Pathfinder {
    config: RouterConfig,
}

impl Pathfinder {
    /// Creates a pathfinder with the given search parameters.
    #[must_use]
    pub const fn new(config: RouterConfig) -> Self {
        Self { config }
    }

    /// The search parameters.
    #[must_use]
    pub const fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Finds the cheapest route for `request` through `grid`.
    ///
    /// Identical inputs always produce identical routes.
    ///
    /// # Errors
    ///
    /// - [`RoutingError::UnknownLayer`] / [`RoutingError::OutOfBounds`] for
    ///   endpoints the grid cannot represent
    /// - [`RoutingError::EndpointBlocked`] if an endpoint sits on an obstacle
    /// - [`RoutingError::PathNotFound`] if the goal is unreachable
    /// - [`RoutingError::IterationLimit`] if the expansion budget runs out
    pub fn find_path(
        &self,
        grid: &ObstacleGrid,
        request: &RouteRequest,
    ) -> Result<Route, RoutingError> {
        let start = grid.cell_at(request.start, &request.start_layer)?;
        let goal = grid.cell_at(request.end, &request.end_layer)?;
        for (cell, point, layer) in [
            (start, request.start, &request.start_layer),
            (goal, request.end, &request.end_layer),
        ] {
            if grid.is_blocked(cell) {
                return Err(RoutingError::EndpointBlocked {
                    x: point.x,
                    y: point.y,
                    layer: layer.clone(),
                });
            }
        }

        let goal_point = grid.point_of(goal);
        let heuristic = |cell: Cell| grid.point_of(cell).distance(goal_point);

        let mut open = BinaryHeap::new();
        let mut g_score: HashMap<Cell, f64> = HashMap::new();
        let mut came_from: HashMap<Cell, Cell> = HashMap::new();
        let mut closed: HashSet<Cell> = HashSet::new();
        let mut seq = 0_u64;
        let mut iterations = 0_usize;

        g_score.insert(start, 0.0);
        open.push(OpenEntry {
            f: heuristic(start),
            g: 0.0,
            seq,
            cell: start,
        });

        while let Some(OpenEntry { g, cell, .. }) = open.pop() {
            if closed.contains(&cell) {
                continue;
            }
            if cell == goal {
                debug!(iterations, cost = g, "Route found");
                let path = reconstruct(&came_from, goal);
                return Ok(Route {
                    waypoints: waypoints(grid, &path, request),
                    cost: g,
                    iterations,
                });
            }

            iterations += 1;
            if iterations > self.config.max_iterations {
                debug!(iterations, "Route search hit the iteration ceiling");
                return Err(RoutingError::IterationLimit {
                    limit: self.config.max_iterations,
                });
            }
            closed.insert(cell);

            for (next, step) in self.neighbours(grid, cell) {
                if closed.contains(&next) {
                    continue;
                }
                let tentative = g + step;
                if tentative < g_score.get(&next).copied().unwrap_or(f64::INFINITY) {
                    g_score.insert(next, tentative);
                    came_from.insert(next, cell);
                    seq += 1;
                    open.push(OpenEntry {
                        f: tentative + heuristic(next),
                        g: tentative,
                        seq,
                        cell: next,
                    });
                }
            }
        }

        debug!(iterations, "Route search exhausted the open set");
        Err(RoutingError::PathNotFound)
    }

    fn neighbours(&self, grid: &ObstacleGrid, cell: Cell) -> Vec<(Cell, f64)> {
        let resolution = grid.resolution();
        let moves = if self.config.diagonal { &MOVES[..] } else { &MOVES[..4] };
        let mut out = Vec::with_capacity(moves.len() + grid.layers().len());

        let shifted = |dc: isize, dr: isize| -> Option<Cell> {
            let col = cell.col.checked_add_signed(dc)?;
            let row = cell.row.checked_add_signed(dr)?;
            let inside = grid.in_bounds(col, row);
            let next = Cell {
                col,
                row,
                layer: cell.layer,
            };
            (inside && !grid.is_blocked(next)).then_some(next)
        };

        for &(dc, dr) in moves {
            let Some(next) = shifted(dc, dr) else {
                continue;
            };
            if dc != 0 && dr != 0 {
                // No corner cutting past an obstacle.
                if shifted(dc, 0).is_none() || shifted(0, dr).is_none() {
                    continue;
                }
                out.push((next, resolution * std::f64::consts::SQRT_2));
            } else {
                out.push((next, resolution));
            }
        }

        let layer_count = grid.layers().len();
        let via_clear = (0..layer_count).all(|layer| !grid.is_blocked(Cell { layer, ..cell }));
        if via_clear {
            for layer in (0..layer_count).filter(|&l| l != cell.layer) {
                out.push((Cell { layer, ..cell }, self.config.via_cost));
            }
        }
        out
    }
}

/// Turns a cell path into corner waypoints, with the endpoints snapped
/// back to the requested coordinates.
fn waypoints(grid: &ObstacleGrid, path: &[Cell], request: &RouteRequest) -> Vec<Waypoint> {
    let layer_name = |cell: &Cell| grid.layers()[cell.layer].clone();
    let point = |cell: &Cell| grid.point_of(*cell);

    let mut kept: Vec<Cell> = Vec::with_capacity(path.len());
    for (i, cell) in path.iter().enumerate() {
        if i == 0 || i + 1 == path.len() {
            kept.push(*cell);
            continue;
        }
        let (prev, next) = (path[i - 1], path[i + 1]);
        let layer_change = prev.layer != cell.layer || next.layer != cell.layer;
        if layer_change || direction(prev, *cell) != direction(*cell, next) {
            kept.push(*cell);
        }
    }

    let mut waypoints: Vec<Waypoint> = kept
        .iter()
        .map(|cell| {
            let p = point(cell);
            Waypoint {
                x: p.x,
                y: p.y,
                layer: layer_name(cell),
            }
        })
        .collect();

    if waypoints.iter().all(|w| w.point() == waypoints[0].point()) {
        return single_cell(&waypoints, request);
    }
    snap(&mut waypoints, request.start, true);
    snap(&mut waypoints, request.end, false);
    waypoints
}

/// Waypoints for a path that never leaves one cell position: a straight run
/// on the start layer, then any layer changes at the end point.
fn single_cell(cells: &[Waypoint], request: &RouteRequest) -> Vec<Waypoint> {
    let mut out: Vec<Waypoint> = Vec::with_capacity(cells.len() + 1);
    if let Some(first) = cells.first() {
        out.push(Waypoint {
            x: request.start.x,
            y: request.start.y,
            layer: first.layer.clone(),
        });
    }
    for cell in cells {
        let next = Waypoint {
            x: request.end.x,
            y: request.end.y,
            layer: cell.layer.clone(),
        };
        if out.last() != Some(&next) {
            out.push(next);
        }
    }
    out
}

/// Moves the first (or last) waypoint onto `target`, carrying along any
/// waypoints that share its position on another layer.
fn snap(waypoints: &mut [Waypoint], target: Point, from_start: bool) {
    let len = waypoints.len();
    let order: Vec<usize> = if from_start {
        (0..len).collect()
    } else {
        (0..len).rev().collect()
    };
    let Some(&first) = order.first() else {
        return;
    };
    let anchor = waypoints[first].point();
    for i in order {
        if waypoints[i].point() != anchor {
            break;
        }
        waypoints[i].x = target.x;
        waypoints[i].y = target.y;
    }
}

fn direction(a: Cell, b: Cell) -> (i8, i8) {
    let sign = |from: usize, to: usize| match to.cmp(&from) {
        Ordering::Greater => 1,
        Ordering::Less => -1,
        Ordering::Equal => 0,
    };
    (sign(a.col, b.col), sign(a.row, b.row))
}

fn reconstruct(came_from: &HashMap<Cell, Cell>, goal: Cell) -> Vec<Cell> {
    let mut path = vec![goal];
    let mut current = goal;
    while let Some(&previous) = came_from.get(&current) {
        path.push(previous);
        current = previous;
    }
    path.reverse();
    path
}
