//! Point-to-point trace routing.
//!
//! The board is rasterised into an [`ObstacleGrid`] (one plane per copper
//! layer) and searched with A* by the [`Pathfinder`]. Moves within a layer
//! cost their Euclidean length in millimetres; changing layer at a cell costs
//! a fixed via penalty. The heuristic is the straight-line distance to the
//! goal, which never overestimates the remaining cost.
//!
//! The search is bounded only by [`RouterConfig::max_iterations`]; there is
//! no wall-clock timeout.

mod astar;
mod grid;

pub use astar::Pathfinder;
pub use grid::{Cell, ObstacleGrid};

use serde::Serialize;
use thiserror::Error;

use crate::kicad::board::Point;

/// Default ceiling on node expansions per search.
pub const DEFAULT_MAX_ITERATIONS: usize = 500_000;

/// Default cost of a layer change, in millimetre-equivalents.
pub const DEFAULT_VIA_COST: f64 = 5.0;

/// Default grid pitch in mm.
pub const DEFAULT_GRID_RESOLUTION: f64 = 0.25;

/// Smallest grid pitch a grid is built with, in mm.
pub const MIN_GRID_RESOLUTION: f64 = 0.01;

/// Default copper-to-copper clearance in mm.
pub const DEFAULT_CLEARANCE: f64 = 0.2;

/// Margin added around board content when there is no outline, in mm.
pub const CONTENT_MARGIN: f64 = 5.0;

/// Search parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RouterConfig {
    /// Maximum number of node expansions before giving up.
    pub max_iterations: usize,
    /// Cost of a layer change.
    pub via_cost: f64,
    /// Grid pitch in mm.
    pub resolution: f64,
    /// Clearance kept from foreign copper, in mm.
    pub clearance: f64,
    /// Allow 45° moves.
    pub diagonal: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            via_cost: DEFAULT_VIA_COST,
            resolution: DEFAULT_GRID_RESOLUTION,
            clearance: DEFAULT_CLEARANCE,
            diagonal: true,
        }
    }
}

/// What to route.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    /// Start point.
    pub start: Point,
    /// End point.
    pub end: Point,
    /// Layer the route starts on.
    pub start_layer: String,
    /// Layer the route ends on.
    pub end_layer: String,
    /// Track width in mm.
    pub width: f64,
    /// Net being routed; its own copper is not an obstacle.
    pub net: u32,
}

/// Errors from the pathfinder.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoutingError {
    /// A layer is not part of the routing grid.
    #[error("Layer '{0}' is not a routing layer")]
    UnknownLayer(String),

    /// A point lies outside the grid.
    #[error("Point ({x}, {y}) is outside the routable area")]
    OutOfBounds {
        /// X in mm.
        x: f64,
        /// Y in mm.
        y: f64,
    },

    /// An endpoint sits on foreign copper or inside its clearance.
    #[error("Endpoint ({x}, {y}) on {layer} is blocked by an obstacle")]
    EndpointBlocked {
        /// X in mm.
        x: f64,
        /// Y in mm.
        y: f64,
        /// Layer name.
        layer: String,
    },

    /// The open set was exhausted without reaching the goal.
    #[error("No path found")]
    PathNotFound,

    /// The search exceeded its expansion budget.
    #[error("Search exceeded {limit} iterations")]
    IterationLimit {
        /// The configured ceiling.
        limit: usize,
    },
}

/// A point on a route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Waypoint {
    /// X in mm.
    pub x: f64,
    /// Y in mm.
    pub y: f64,
    /// Copper layer.
    pub layer: String,
}

impl Waypoint {
    /// Position without the layer.
    #[must_use]
    pub const fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// A straight piece of a route on one layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteSegment {
    /// Start point.
    pub start: Point,
    /// End point.
    pub end: Point,
    /// Copper layer.
    pub layer: String,
}

/// A layer change on a route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteVia {
    /// Position.
    pub at: Point,
    /// Layer before the change.
    pub from_layer: String,
    /// Layer after the change.
    pub to_layer: String,
}

/// A found route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    /// Corner points in order; consecutive points on different layers share
    /// a position and mark a via.
    pub waypoints: Vec<Waypoint>,
    /// Path cost (length plus via penalties).
    pub cost: f64,
    /// Node expansions used.
    pub iterations: usize,
}

impl Route {
    /// Straight same-layer pieces of the route.
    #[must_use]
    pub fn segments(&self) -> Vec<RouteSegment> {
        self.waypoints
            .windows(2)
            .filter(|pair| pair[0].layer == pair[1].layer && pair[0].point() != pair[1].point())
            .map(|pair| RouteSegment {
                start: pair[0].point(),
                end: pair[1].point(),
                layer: pair[0].layer.clone(),
            })
            .collect()
    }

    /// Layer changes along the route.
    #[must_use]
    pub fn vias(&self) -> Vec<RouteVia> {
        self.waypoints
            .windows(2)
            .filter(|pair| pair[0].layer != pair[1].layer)
            .map(|pair| RouteVia {
                at: pair[1].point(),
                from_layer: pair[0].layer.clone(),
                to_layer: pair[1].layer.clone(),
            })
            .collect()
    }

    /// Total copper length in mm.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.segments()
            .iter()
            .map(|s| s.start.distance(s.end))
            .sum()
    }
}
