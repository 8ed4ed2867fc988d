//! Pathfinder tests against the sample board.

use kicad_pcb_mcp::kicad::board::{self, BoundingBox, Point};
use kicad_pcb_mcp::kicad::Document;
use kicad_pcb_mcp::routing::{
    ObstacleGrid, Pathfinder, RouteRequest, RouterConfig, RoutingError, DEFAULT_VIA_COST,
};

const SAMPLE: &str = include_str!("fixtures/sample.kicad_pcb");

fn approx_eq(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() < tolerance
}

fn sample() -> Document {
    Document::parse(SAMPLE).expect("fixture should parse")
}

fn request(start: (f64, f64), end: (f64, f64), net: u32) -> RouteRequest {
    RouteRequest {
        start: Point::new(start.0, start.1),
        end: Point::new(end.0, end.1),
        start_layer: "F.Cu".to_string(),
        end_layer: "F.Cu".to_string(),
        width: 0.25,
        net,
    }
}

fn copper(doc: &Document) -> Vec<String> {
    board::copper_layers(doc)
}

// =============================================================================
// Grid construction
// =============================================================================

#[test]
fn test_grid_covers_the_outline() {
    let doc = sample();
    let config = RouterConfig::default();
    let grid = ObstacleGrid::from_board(&doc, &copper(&doc), &config, &request((1.0, 1.0), (2.0, 2.0), 4));

    assert_eq!(grid.dimensions(), (241, 161));
    assert_eq!(grid.layers(), ["F.Cu", "B.Cu"]);
    assert!(matches!(
        grid.cell_at(Point::new(70.0, 5.0), "F.Cu"),
        Err(RoutingError::OutOfBounds { .. })
    ));
    assert!(matches!(
        grid.cell_at(Point::new(5.0, 5.0), "In1.Cu"),
        Err(RoutingError::UnknownLayer(_))
    ));
}

#[test]
fn test_pads_block_only_their_layers() {
    let doc = sample();
    let config = RouterConfig::default();
    let grid = ObstacleGrid::from_board(&doc, &copper(&doc), &config, &request((1.0, 1.0), (2.0, 2.0), 4));

    // C1 sits on the back side.
    let c1_pad = Point::new(24.25, 30.0);
    let front = grid.cell_at(c1_pad, "F.Cu").expect("in bounds");
    let back = grid.cell_at(c1_pad, "B.Cu").expect("in bounds");
    assert!(!grid.is_blocked(front));
    assert!(grid.is_blocked(back));

    // J1 is through-hole.
    let j1_pad = Point::new(10.0, 20.0);
    assert!(grid.is_blocked(grid.cell_at(j1_pad, "F.Cu").expect("in bounds")));
    assert!(grid.is_blocked(grid.cell_at(j1_pad, "B.Cu").expect("in bounds")));
}

#[test]
fn test_own_net_copper_is_released() {
    let doc = sample();
    let config = RouterConfig::default();
    let foreign = ObstacleGrid::from_board(&doc, &copper(&doc), &config, &request((1.0, 1.0), (2.0, 2.0), 4));
    let own = ObstacleGrid::from_board(&doc, &copper(&doc), &config, &request((1.0, 1.0), (2.0, 2.0), 1));

    let via = Point::new(30.0, 25.0);
    assert!(foreign.is_blocked(foreign.cell_at(via, "F.Cu").expect("in bounds")));
    assert!(!own.is_blocked(own.cell_at(via, "F.Cu").expect("in bounds")));
    assert!(own.blocked_count() < foreign.blocked_count());
}

// =============================================================================
// Search
// =============================================================================

#[test]
fn test_straight_route_on_a_free_column() {
    let doc = sample();
    let config = RouterConfig::default();
    let req = request((40.0, 5.0), (40.0, 35.0), 4);
    let grid = ObstacleGrid::from_board(&doc, &copper(&doc), &config, &req);

    let route = Pathfinder::new(config).find_path(&grid, &req).expect("route should exist");
    assert_eq!(route.waypoints.len(), 2);
    assert_eq!(route.segments().len(), 1);
    assert!(route.vias().is_empty());
    assert!(approx_eq(route.cost, 30.0, 1e-9));
    assert!(approx_eq(route.length(), 30.0, 1e-9));
}

#[test]
fn test_route_detours_around_foreign_via() {
    let doc = sample();
    let config = RouterConfig::default();
    let req = request((30.0, 22.0), (30.0, 28.0), 4);
    let grid = ObstacleGrid::from_board(&doc, &copper(&doc), &config, &req);

    let route = Pathfinder::new(config).find_path(&grid, &req).expect("route should exist");
    assert!(route.length() > 6.0);
    assert!(route.segments().len() > 1);
    assert!(route.vias().is_empty());
    for wp in &route.waypoints {
        let cell = grid.cell_at(wp.point(), &wp.layer).expect("waypoint in bounds");
        assert!(!grid.is_blocked(cell));
    }
}

#[test]
fn test_route_passes_through_own_via() {
    let doc = sample();
    let config = RouterConfig::default();
    let req = request((30.0, 22.0), (30.0, 28.0), 1);
    let grid = ObstacleGrid::from_board(&doc, &copper(&doc), &config, &req);

    let route = Pathfinder::new(config).find_path(&grid, &req).expect("route should exist");
    assert_eq!(route.segments().len(), 1);
    assert!(approx_eq(route.length(), 6.0, 1e-9));
}

#[test]
fn test_layer_change_costs_one_via() {
    let doc = sample();
    let config = RouterConfig::default();
    let mut req = request((45.0, 5.0), (45.0, 10.0), 4);
    req.end_layer = "B.Cu".to_string();
    let grid = ObstacleGrid::from_board(&doc, &copper(&doc), &config, &req);

    let route = Pathfinder::new(config).find_path(&grid, &req).expect("route should exist");
    let vias = route.vias();
    assert_eq!(vias.len(), 1);
    assert_eq!(vias[0].from_layer, "F.Cu");
    assert_eq!(vias[0].to_layer, "B.Cu");
    assert!(approx_eq(route.cost, 5.0 + DEFAULT_VIA_COST, 1e-9));
    assert_eq!(route.waypoints.first().map(|w| w.layer.as_str()), Some("F.Cu"));
    assert_eq!(route.waypoints.last().map(|w| w.layer.as_str()), Some("B.Cu"));
}

#[test]
fn test_wall_forces_a_detour_through_the_other_layer() {
    let bounds = BoundingBox {
        min_x: 0.0,
        min_y: 0.0,
        max_x: 10.0,
        max_y: 10.0,
    };
    let mut grid = ObstacleGrid::new(bounds, 1.0, vec!["F.Cu".into(), "B.Cu".into()]);
    grid.block_segment(0, Point::new(5.0, 0.0), Point::new(5.0, 10.0), 0.1, None);

    let config = RouterConfig {
        resolution: 1.0,
        ..RouterConfig::default()
    };
    let req = request((1.0, 5.0), (9.0, 5.0), 0);
    let route = Pathfinder::new(config).find_path(&grid, &req).expect("route should exist");

    assert_eq!(route.vias().len(), 2);
    assert!(approx_eq(route.cost, 8.0 + 2.0 * DEFAULT_VIA_COST, 1e-9));
}

#[test]
fn test_blocked_endpoint_is_reported() {
    let doc = sample();
    let config = RouterConfig::default();
    let req = request((30.0, 25.0), (40.0, 25.0), 4);
    let grid = ObstacleGrid::from_board(&doc, &copper(&doc), &config, &req);

    let err = Pathfinder::new(config)
        .find_path(&grid, &req)
        .expect_err("endpoint sits on a foreign via");
    assert!(matches!(err, RoutingError::EndpointBlocked { .. }));
}

#[test]
fn test_fully_walled_goal_has_no_path() {
    let bounds = BoundingBox {
        min_x: 0.0,
        min_y: 0.0,
        max_x: 10.0,
        max_y: 10.0,
    };
    let mut grid = ObstacleGrid::new(bounds, 1.0, vec!["F.Cu".into()]);
    grid.block_segment(0, Point::new(5.0, 0.0), Point::new(5.0, 10.0), 0.1, None);

    let req = request((1.0, 5.0), (9.0, 5.0), 0);
    let err = Pathfinder::new(RouterConfig::default())
        .find_path(&grid, &req)
        .expect_err("goal is unreachable");
    assert_eq!(err, RoutingError::PathNotFound);
}

#[test]
fn test_iteration_ceiling_is_enforced() {
    let doc = sample();
    let config = RouterConfig {
        max_iterations: 10,
        ..RouterConfig::default()
    };
    let req = request((40.0, 5.0), (40.0, 35.0), 4);
    let grid = ObstacleGrid::from_board(&doc, &copper(&doc), &config, &req);

    let err = Pathfinder::new(config)
        .find_path(&grid, &req)
        .expect_err("ten expansions cannot cover thirty millimetres");
    assert_eq!(err, RoutingError::IterationLimit { limit: 10 });
}

#[test]
fn test_identical_requests_give_identical_routes() {
    let doc = sample();
    let config = RouterConfig::default();
    let req = request((30.0, 22.0), (30.0, 28.0), 4);
    let grid = ObstacleGrid::from_board(&doc, &copper(&doc), &config, &req);
    let pathfinder = Pathfinder::new(config);

    let first = pathfinder.find_path(&grid, &req).expect("route should exist");
    let second = pathfinder.find_path(&grid, &req).expect("route should exist");
    assert_eq!(first, second);
}
