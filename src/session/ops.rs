//! Operation parameters and planning.
//!
//! Every operation is split in two: a planning step that normalises and
//! validates its parameters against a read-only view of the document and
//! produces a list of [`Mutation`]s, and an application step (in the session
//! manager) that runs those mutations. A plan that fails leaves nothing to
//! undo.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::cache::LruCache;
use crate::kicad::board::{self, Point, EDGE_CUTS};
use crate::kicad::layers;
use crate::kicad::sexpr::{Document, Expr, NodeId, NodeKind, NodeRef};
use crate::routing::{ObstacleGrid, Pathfinder, Route, RouteRequest, RoutingError};

use super::SessionConfig;

/// Memoised pathfinder results keyed by session, revision and parameters.
pub type RouteMemo = LruCache<String, Result<Route, RoutingError>>;

/// Why an operation was rejected. Always reported through the operation
/// record, never as a hard error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OperationError {
    /// The parameters do not fit the document.
    #[error("{0}")]
    Validation(String),

    /// The pathfinder could not produce a route.
    #[error("Routing failed: {0}")]
    Routing(#[from] RoutingError),
}

fn invalid(message: impl Into<String>) -> OperationError {
    OperationError::Validation(message.into())
}

/// One document edit.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Mutation {
    Append { parent: NodeId, expr: Expr },
    Insert { parent: NodeId, position: usize, expr: Expr },
    Replace { target: NodeId, expr: Expr },
    Remove { target: NodeId },
}

/// The validated outcome of planning an operation.
#[derive(Debug, Clone, PartialEq, Default)]
pub(super) struct Plan {
    pub mutations: Vec<Mutation>,
    pub target: Option<String>,
    pub details: Option<Value>,
}

/// What a planning step may read.
pub(super) struct PlanContext<'a> {
    pub doc: &'a Document,
    pub config: &'a SessionConfig,
    pub route_memo: &'a mut RouteMemo,
    pub memo_prefix: String,
}

fn default_text_layer() -> String {
    "F.SilkS".to_string()
}

fn default_trace_layer() -> String {
    "F.Cu".to_string()
}

/// Parameters for placing board text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddBoardTextParams {
    /// The text.
    pub text: String,
    /// X in mm.
    pub x: f64,
    /// Y in mm.
    pub y: f64,
    /// Layer (display names accepted).
    #[serde(default = "default_text_layer")]
    pub layer: String,
    /// Font height in mm; the configured default when absent.
    #[serde(default)]
    pub size: Option<f64>,
    /// Rotation in degrees.
    #[serde(default)]
    pub angle: f64,
}

/// Parameters for routing a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteTraceParams {
    /// Start X in mm.
    pub start_x: f64,
    /// Start Y in mm.
    pub start_y: f64,
    /// End X in mm.
    pub end_x: f64,
    /// End Y in mm.
    pub end_y: f64,
    /// Track width in mm.
    pub width: f64,
    /// Start layer (display names accepted).
    #[serde(default = "default_trace_layer")]
    pub layer: String,
    /// End layer; same as `layer` when absent.
    #[serde(default)]
    pub end_layer: Option<String>,
    /// Layers the pathfinder may use; the start and end layers when absent.
    #[serde(default)]
    pub routing_layers: Option<Vec<String>>,
    /// Net number.
    pub net: u32,
    /// Route around existing copper instead of drawing a straight segment.
    #[serde(default)]
    pub avoid_obstacles: bool,
}

/// Parameters for placing a via.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddViaParams {
    /// X in mm.
    pub x: f64,
    /// Y in mm.
    pub y: f64,
    /// Net number.
    pub net: u32,
    /// Pad diameter in mm; the configured default when absent.
    #[serde(default)]
    pub size: Option<f64>,
    /// Drill diameter in mm; the configured default when absent.
    #[serde(default)]
    pub drill: Option<f64>,
    /// The two layers connected; `F.Cu`/`B.Cu` when absent.
    #[serde(default)]
    pub layers: Option<Vec<String>>,
}

/// Parameters for moving a footprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveComponentParams {
    /// Reference designator.
    pub reference: String,
    /// New X in mm.
    pub x: f64,
    /// New Y in mm.
    pub y: f64,
    /// New rotation in degrees; unchanged when absent.
    #[serde(default)]
    pub angle: Option<f64>,
}

/// Parameters for connecting a footprint pad to a net.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignNetParams {
    /// Reference designator.
    pub reference: String,
    /// Pad number as written on the pad (`"1"`, `"A3"`).
    pub pad: String,
    /// Name of a declared net; the empty name (net 0) disconnects the pad.
    pub net_name: String,
}

fn default_zone_layer() -> String {
    "F.Cu".to_string()
}

/// Parameters for a copper pour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateZoneParams {
    /// Name of a declared net.
    pub net_name: String,
    /// Copper layer (display names accepted).
    #[serde(default = "default_zone_layer")]
    pub layer: String,
    /// Polygon corners, at least three.
    pub points: Vec<Point>,
    /// Minimum copper width in mm; the configured default when absent.
    #[serde(default)]
    pub min_thickness: Option<f64>,
    /// Fill priority; higher pours win where zones overlap.
    #[serde(default)]
    pub priority: u32,
}

fn finite(name: &str, value: f64) -> Result<f64, OperationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(invalid(format!("{name} must be a finite number")))
    }
}

fn positive(name: &str, value: f64) -> Result<f64, OperationError> {
    if finite(name, value)? > 0.0 {
        Ok(value)
    } else {
        Err(invalid(format!("{name} must be positive, got {value}")))
    }
}

/// Rejects layers missing from the board's layer table. Boards without a
/// table accept any layer.
fn check_layer(doc: &Document, layer: &str) -> Result<(), OperationError> {
    if layer.is_empty() {
        return Err(invalid("layer name must not be empty"));
    }
    let table = board::layers(doc);
    if table.is_empty() || table.iter().any(|l| l.name == layer) {
        Ok(())
    } else {
        Err(invalid(format!("layer '{layer}' is not defined on this board")))
    }
}

/// Like [`check_layer`], and the layer must be copper.
fn check_copper(doc: &Document, layer: &str) -> Result<(), OperationError> {
    check_layer(doc, layer)?;
    if layers::is_copper(layer) {
        Ok(())
    } else {
        Err(invalid(format!("layer '{layer}' is not a copper layer")))
    }
}

/// Net 0 (unconnected) is always valid; any other net must be declared.
fn check_net(doc: &Document, net: u32) -> Result<(), OperationError> {
    if net == 0 || board::find_net(doc, net).is_some() {
        Ok(())
    } else {
        Err(invalid(format!("net {net} does not exist")))
    }
}

fn normalize(config: &SessionConfig, layer: &str) -> String {
    config.layer_aliases.normalize(layer).to_string()
}

fn new_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn uuid_expr(uuid: &str) -> Expr {
    Expr::node("uuid", [Expr::string(uuid)])
}

fn layer_expr(layer: &str) -> Expr {
    Expr::node("layer", [Expr::string(layer)])
}

fn at_expr(x: f64, y: f64, angle: f64) -> Expr {
    let mut items = vec![Expr::number(x), Expr::number(y)];
    if angle != 0.0 {
        items.push(Expr::number(angle));
    }
    Expr::node("at", items)
}

fn segment_expr(start: Point, end: Point, width: f64, layer: &str, net: u32, uuid: &str) -> Expr {
    Expr::node(
        "segment",
        [
            Expr::point("start", start.x, start.y),
            Expr::point("end", end.x, end.y),
            Expr::node("width", [Expr::number(width)]),
            layer_expr(layer),
            Expr::node("net", [Expr::integer(i64::from(net))]),
            uuid_expr(uuid),
        ],
    )
}

fn via_expr(at: Point, size: f64, drill: f64, layers: [&str; 2], net: u32, uuid: &str) -> Expr {
    Expr::node(
        "via",
        [
            Expr::point("at", at.x, at.y),
            Expr::node("size", [Expr::number(size)]),
            Expr::node("drill", [Expr::number(drill)]),
            Expr::node("layers", layers.map(Expr::string)),
            Expr::node("net", [Expr::integer(i64::from(net))]),
            uuid_expr(uuid),
        ],
    )
}

/// Normalises an angle into `[0, 360)`.
fn wrap_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    if (wrapped - 360.0).abs() < 1e-9 || wrapped.abs() < 1e-9 {
        0.0
    } else {
        wrapped
    }
}

pub(super) fn plan_add_board_text(
    ctx: &mut PlanContext<'_>,
    params: &AddBoardTextParams,
) -> Result<Plan, OperationError> {
    if params.text.is_empty() {
        return Err(invalid("text must not be empty"));
    }
    let x = finite("x", params.x)?;
    let y = finite("y", params.y)?;
    let angle = finite("angle", params.angle)?;
    let size = positive("size", params.size.unwrap_or(ctx.config.text_size))?;
    let layer = normalize(ctx.config, &params.layer);
    check_layer(ctx.doc, &layer)?;

    let uuid = new_uuid();
    let mut effects = vec![Expr::node(
        "font",
        [
            Expr::node("size", [Expr::number(size), Expr::number(size)]),
            Expr::node("thickness", [Expr::number(size * 0.15)]),
        ],
    )];
    if layer.starts_with("B.") {
        effects.push(Expr::node("justify", [Expr::symbol("mirror")]));
    }
    let expr = Expr::node(
        "gr_text",
        [
            Expr::string(params.text.clone()),
            at_expr(x, y, angle),
            layer_expr(&layer),
            uuid_expr(&uuid),
            Expr::node("effects", effects),
        ],
    );
    Ok(Plan {
        mutations: vec![Mutation::Append {
            parent: ctx.doc.root().id(),
            expr,
        }],
        target: Some(format!("gr_text:{uuid}")),
        details: None,
    })
}

/// Orders `names` by copper stack position; names not in the stack keep
/// their relative order after the stack layers.
fn stack_order(doc: &Document, names: &mut Vec<String>) {
    let stack = board::copper_layers(doc);
    names.sort_by_key(|name| stack.iter().position(|l| l == name).unwrap_or(usize::MAX));
    let mut seen = Vec::with_capacity(names.len());
    names.retain(|name| {
        if seen.contains(name) {
            false
        } else {
            seen.push(name.clone());
            true
        }
    });
}

pub(super) fn plan_route_trace(
    ctx: &mut PlanContext<'_>,
    params: &RouteTraceParams,
) -> Result<Plan, OperationError> {
    let start = Point::new(finite("start_x", params.start_x)?, finite("start_y", params.start_y)?);
    let end = Point::new(finite("end_x", params.end_x)?, finite("end_y", params.end_y)?);
    let width = positive("width", params.width)?;
    let start_layer = normalize(ctx.config, &params.layer);
    let end_layer = params
        .end_layer
        .as_deref()
        .map_or_else(|| start_layer.clone(), |l| normalize(ctx.config, l));
    check_copper(ctx.doc, &start_layer)?;
    check_copper(ctx.doc, &end_layer)?;
    check_net(ctx.doc, params.net)?;
    if start == end && start_layer == end_layer {
        return Err(invalid("start and end points are identical"));
    }

    if !params.avoid_obstacles && start_layer == end_layer && params.routing_layers.is_none() {
        let uuid = new_uuid();
        let expr = segment_expr(start, end, width, &start_layer, params.net, &uuid);
        return Ok(Plan {
            mutations: vec![Mutation::Append {
                parent: ctx.doc.root().id(),
                expr,
            }],
            target: Some(format!("segment:{uuid}")),
            details: Some(json!({
                "mode": "direct",
                "segments": 1,
                "vias": 0,
                "length": start.distance(end),
            })),
        });
    }

    let mut layers = match &params.routing_layers {
        Some(given) => {
            let mut layers = Vec::with_capacity(given.len());
            for layer in given {
                let layer = normalize(ctx.config, layer);
                check_copper(ctx.doc, &layer)?;
                layers.push(layer);
            }
            for required in [&start_layer, &end_layer] {
                if !layers.contains(required) {
                    return Err(invalid(format!(
                        "routing_layers must include '{required}'"
                    )));
                }
            }
            layers
        }
        None => vec![start_layer.clone(), end_layer.clone()],
    };
    stack_order(ctx.doc, &mut layers);

    let request = RouteRequest {
        start,
        end,
        start_layer,
        end_layer,
        width,
        net: params.net,
    };
    let memo_key = format!(
        "{}:{}",
        ctx.memo_prefix,
        serde_json::to_string(params).unwrap_or_default()
    );
    let cached = ctx.route_memo.get(&memo_key).cloned();
    let route = match cached {
        Some(result) => {
            tracing::debug!("Reusing memoised route");
            result
        }
        None => {
            let grid = ObstacleGrid::from_board(ctx.doc, &layers, &ctx.config.router, &request);
            let result = Pathfinder::new(ctx.config.router.clone()).find_path(&grid, &request);
            ctx.route_memo.set(memo_key, result.clone());
            result
        }
    }?;

    let root = ctx.doc.root().id();
    let mut mutations = Vec::new();
    let mut uuids = Vec::new();
    for pair in route.waypoints.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let uuid = new_uuid();
        if a.layer == b.layer {
            if a.point() == b.point() {
                continue;
            }
            mutations.push(Mutation::Append {
                parent: root,
                expr: segment_expr(a.point(), b.point(), width, &a.layer, params.net, &uuid),
            });
        } else {
            let mut pair = [a.layer.as_str(), b.layer.as_str()];
            let position = |name: &str| layers.iter().position(|l| l == name);
            if position(pair[1]) < position(pair[0]) {
                pair.swap(0, 1);
            }
            mutations.push(Mutation::Append {
                parent: root,
                expr: via_expr(
                    b.point(),
                    ctx.config.via_size,
                    ctx.config.via_drill,
                    pair,
                    params.net,
                    &uuid,
                ),
            });
        }
        uuids.push(uuid);
    }

    if mutations.is_empty() {
        return Err(invalid("route produced no geometry"));
    }

    let segments = route.segments().len();
    let vias = route.vias().len();
    Ok(Plan {
        mutations,
        target: Some(format!("net:{}", params.net)),
        details: Some(json!({
            "mode": "pathfinder",
            "segments": segments,
            "vias": vias,
            "length": route.length(),
            "cost": route.cost,
            "iterations": route.iterations,
            "waypoints": route.waypoints,
            "uuids": uuids,
        })),
    })
}

pub(super) fn plan_add_via(
    ctx: &mut PlanContext<'_>,
    params: &AddViaParams,
) -> Result<Plan, OperationError> {
    let x = finite("x", params.x)?;
    let y = finite("y", params.y)?;
    let size = positive("size", params.size.unwrap_or(ctx.config.via_size))?;
    let drill = positive("drill", params.drill.unwrap_or(ctx.config.via_drill))?;
    if drill >= size {
        return Err(invalid(format!(
            "drill ({drill}) must be smaller than via size ({size})"
        )));
    }
    let layers: Vec<String> = params.layers.as_ref().map_or_else(
        || vec!["F.Cu".to_string(), "B.Cu".to_string()],
        |given| given.iter().map(|l| normalize(ctx.config, l)).collect(),
    );
    let [first, second] = layers.as_slice() else {
        return Err(invalid(format!(
            "a via connects exactly two layers, got {}",
            layers.len()
        )));
    };
    if first == second {
        return Err(invalid(format!("via layers must differ, got '{first}' twice")));
    }
    check_copper(ctx.doc, first)?;
    check_copper(ctx.doc, second)?;
    check_net(ctx.doc, params.net)?;

    let uuid = new_uuid();
    let expr = via_expr(
        Point::new(x, y),
        size,
        drill,
        [first.as_str(), second.as_str()],
        params.net,
        &uuid,
    );
    Ok(Plan {
        mutations: vec![Mutation::Append {
            parent: ctx.doc.root().id(),
            expr,
        }],
        target: Some(format!("via:{uuid}")),
        details: None,
    })
}

pub(super) fn plan_create_net(
    ctx: &mut PlanContext<'_>,
    name: &str,
) -> Result<Plan, OperationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(invalid("net name must not be empty"));
    }
    let nets = board::nets(ctx.doc);
    if nets.iter().any(|n| n.name == name) {
        return Err(invalid(format!("net '{name}' already exists")));
    }
    let number = nets.iter().map(|n| n.number).max().map_or(1, |max| max + 1);

    let root = ctx.doc.root();
    let children: Vec<NodeRef<'_>> = root.children().collect();
    let position = children
        .iter()
        .rposition(|c| c.is("net"))
        .or_else(|| children.iter().position(|c| c.is("layers")))
        .map_or(children.len(), |i| i + 1);

    Ok(Plan {
        mutations: vec![Mutation::Insert {
            parent: root.id(),
            position,
            expr: Expr::node("net", [Expr::integer(i64::from(number)), Expr::string(name)]),
        }],
        target: Some(format!("net:{number}")),
        details: Some(json!({ "number": number, "name": name })),
    })
}

fn footprint<'a>(doc: &'a Document, reference: &str) -> Result<NodeRef<'a>, OperationError> {
    board::find_footprint(doc, reference)
        .ok_or_else(|| invalid(format!("component '{reference}' not found")))
}

pub(super) fn plan_move_component(
    ctx: &mut PlanContext<'_>,
    params: &MoveComponentParams,
) -> Result<Plan, OperationError> {
    let x = finite("x", params.x)?;
    let y = finite("y", params.y)?;
    let fp = footprint(ctx.doc, &params.reference)?;
    let at = fp.child("at");
    let old = at.map(|n| n.numbers()).unwrap_or_default();
    let (old_x, old_y) = (old.first().copied().unwrap_or(0.0), old.get(1).copied().unwrap_or(0.0));
    let old_angle = old.get(2).copied().unwrap_or(0.0);
    let angle = wrap_angle(finite("angle", params.angle.unwrap_or(old_angle))?);

    let new_at = at_expr(x, y, angle);
    let mut mutations = vec![match at {
        Some(node) => Mutation::Replace {
            target: node.id(),
            expr: new_at,
        },
        None => Mutation::Append {
            parent: fp.id(),
            expr: new_at,
        },
    }];

    // Pad and text angles inside a footprint are absolute, so a rotation
    // has to be carried into them.
    let delta = angle - wrap_angle(old_angle);
    if delta.abs() > 1e-9 {
        for child in fp
            .children()
            .filter(|c| c.is("pad") || c.is("property") || c.is("fp_text"))
        {
            let Some(child_at) = child.child("at") else {
                continue;
            };
            let values = child_at.numbers();
            let (cx, cy) = (values.first().copied().unwrap_or(0.0), values.get(1).copied().unwrap_or(0.0));
            let child_angle = wrap_angle(values.get(2).copied().unwrap_or(0.0) + delta);
            let mut expr = at_expr(cx, cy, child_angle);
            if let Expr::List(items) = &mut expr {
                items.extend(
                    child_at
                        .children()
                        .filter(|c| c.kind() == NodeKind::Symbol)
                        .skip(1)
                        .filter_map(|c| c.atom())
                        .map(Expr::symbol),
                );
            }
            mutations.push(Mutation::Replace {
                target: child_at.id(),
                expr,
            });
        }
    }

    Ok(Plan {
        mutations,
        target: Some(format!("footprint:{}", params.reference)),
        details: Some(json!({
            "from": { "x": old_x, "y": old_y, "angle": wrap_angle(old_angle) },
            "to": { "x": x, "y": y, "angle": angle },
        })),
    })
}

pub(super) fn plan_delete_component(
    ctx: &mut PlanContext<'_>,
    reference: &str,
) -> Result<Plan, OperationError> {
    let fp = footprint(ctx.doc, reference)?;
    Ok(Plan {
        mutations: vec![Mutation::Remove { target: fp.id() }],
        target: Some(format!("footprint:{reference}")),
        details: None,
    })
}

fn plan_delete_by_uuid(
    ctx: &PlanContext<'_>,
    head: &str,
    label: &str,
    uuid: &str,
) -> Result<Plan, OperationError> {
    let node = board::find_by_uuid(ctx.doc, head, uuid)
        .ok_or_else(|| invalid(format!("{label} with uuid '{uuid}' not found")))?;
    Ok(Plan {
        mutations: vec![Mutation::Remove { target: node.id() }],
        target: Some(format!("{head}:{uuid}")),
        details: None,
    })
}

pub(super) fn plan_delete_trace(
    ctx: &mut PlanContext<'_>,
    uuid: &str,
) -> Result<Plan, OperationError> {
    plan_delete_by_uuid(ctx, "segment", "segment", uuid)
}

pub(super) fn plan_delete_via(
    ctx: &mut PlanContext<'_>,
    uuid: &str,
) -> Result<Plan, OperationError> {
    plan_delete_by_uuid(ctx, "via", "via", uuid)
}

pub(super) fn plan_set_board_outline(
    ctx: &mut PlanContext<'_>,
    points: &[Point],
) -> Result<Plan, OperationError> {
    if points.len() < 3 {
        return Err(invalid(format!(
            "an outline needs at least 3 points, got {}",
            points.len()
        )));
    }
    for (i, p) in points.iter().enumerate() {
        finite(&format!("points[{i}].x"), p.x)?;
        finite(&format!("points[{i}].y"), p.y)?;
    }
    for (i, p) in points.iter().enumerate() {
        let next = points[(i + 1) % points.len()];
        if *p == next {
            return Err(invalid(format!("outline point {i} repeats its successor")));
        }
    }

    let root = ctx.doc.root();
    let mut mutations: Vec<Mutation> = root
        .children()
        .filter(|c| board::is_outline_element(*c))
        .map(|c| Mutation::Remove { target: c.id() })
        .collect();
    let removed = mutations.len();

    let width = ctx.config.outline_stroke_width;
    for (i, start) in points.iter().enumerate() {
        let end = points[(i + 1) % points.len()];
        mutations.push(Mutation::Append {
            parent: root.id(),
            expr: Expr::node(
                "gr_line",
                [
                    Expr::point("start", start.x, start.y),
                    Expr::point("end", end.x, end.y),
                    Expr::node(
                        "stroke",
                        [
                            Expr::node("width", [Expr::number(width)]),
                            Expr::node("type", [Expr::symbol("default")]),
                        ],
                    ),
                    layer_expr(EDGE_CUTS),
                    uuid_expr(&new_uuid()),
                ],
            ),
        });
    }

    Ok(Plan {
        mutations,
        target: Some(EDGE_CUTS.to_string()),
        details: Some(json!({ "removed": removed, "edges": points.len() })),
    })
}

/// Swaps every side-specific layer reference inside a footprint (its own
/// layer, pads, graphics, fields) to the other side. Positions are kept.
pub(super) fn plan_flip_component(
    ctx: &mut PlanContext<'_>,
    reference: &str,
) -> Result<Plan, OperationError> {
    let fp = footprint(ctx.doc, reference)?;
    let from = fp.child("layer").and_then(|l| l.first_value()).unwrap_or("F.Cu");
    let to = layers::opposite_side(from);
    if to == from {
        return Err(invalid(format!(
            "component '{reference}' sits on '{from}', which has no opposite side"
        )));
    }

    let layer_nodes = ctx
        .doc
        .find_from(fp.id(), |n| n.is("layer") || n.is("layers"))
        .map_err(|err| invalid(err.to_string()))?;
    let mut mutations = Vec::new();
    for node in layer_nodes {
        for atom in node.children().skip(1) {
            let Some(name) = atom.atom() else {
                continue;
            };
            let flipped = layers::opposite_side(name);
            if flipped == name {
                continue;
            }
            let expr = match atom.kind() {
                NodeKind::String => Expr::string(flipped),
                NodeKind::Symbol => Expr::symbol(flipped),
                _ => continue,
            };
            mutations.push(Mutation::Replace {
                target: atom.id(),
                expr,
            });
        }
    }

    Ok(Plan {
        mutations,
        target: Some(format!("footprint:{reference}")),
        details: Some(json!({ "from": from, "to": to })),
    })
}

fn net_by_name(doc: &Document, name: &str) -> Result<board::Net, OperationError> {
    board::nets(doc)
        .into_iter()
        .find(|n| n.name == name)
        .ok_or_else(|| invalid(format!("net '{name}' does not exist")))
}

pub(super) fn plan_delete_net(
    ctx: &mut PlanContext<'_>,
    name: &str,
) -> Result<Plan, OperationError> {
    let net = net_by_name(ctx.doc, name)?;
    if net.number == 0 {
        return Err(invalid("net 0 cannot be deleted"));
    }
    let root = ctx.doc.root();
    let declaration = root
        .children_named("net")
        .find(|n| n.values().get(1).copied() == Some(name))
        .ok_or_else(|| invalid(format!("net '{name}' does not exist")))?;

    // Declarations sit directly under the root; anything deeper is a use.
    let number = net.number;
    let users = ctx
        .doc
        .find(|n| {
            n.is("net")
                && n.parent().is_some_and(|p| p.id() != root.id())
                && n.first_value().and_then(|v| v.parse::<u32>().ok()) == Some(number)
        })
        .count();
    if users > 0 {
        return Err(invalid(format!(
            "net '{name}' is still used by {users} item(s)"
        )));
    }

    Ok(Plan {
        mutations: vec![Mutation::Remove {
            target: declaration.id(),
        }],
        target: Some(format!("net:{number}")),
        details: Some(json!({ "number": number, "name": name })),
    })
}

pub(super) fn plan_assign_net(
    ctx: &mut PlanContext<'_>,
    params: &AssignNetParams,
) -> Result<Plan, OperationError> {
    let net = net_by_name(ctx.doc, &params.net_name)?;
    let fp = footprint(ctx.doc, &params.reference)?;
    let pad = fp
        .children_named("pad")
        .find(|p| p.first_value() == Some(params.pad.as_str()))
        .ok_or_else(|| {
            invalid(format!(
                "pad '{}' not found on '{}'",
                params.pad, params.reference
            ))
        })?;

    let existing = pad.child("net");
    let previous = existing
        .and_then(|n| n.first_value())
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0);
    let expr = Expr::node(
        "net",
        [Expr::integer(i64::from(net.number)), Expr::string(net.name.clone())],
    );
    if existing.is_none() && net.number == 0 {
        return Err(invalid(format!(
            "pad '{}' of '{}' is already unconnected",
            params.pad, params.reference
        )));
    }
    let mutation = match (existing, net.number) {
        (Some(node), 0) => Mutation::Remove { target: node.id() },
        (Some(node), _) => Mutation::Replace {
            target: node.id(),
            expr,
        },
        (None, _) => {
            // Pads carry their net ahead of the uuid.
            let children: Vec<NodeRef<'_>> = pad.children().collect();
            match children.iter().position(|c| c.is("uuid")) {
                Some(position) => Mutation::Insert {
                    parent: pad.id(),
                    position,
                    expr,
                },
                None => Mutation::Append {
                    parent: pad.id(),
                    expr,
                },
            }
        }
    };

    Ok(Plan {
        mutations: vec![mutation],
        target: Some(format!("pad:{}:{}", params.reference, params.pad)),
        details: Some(json!({ "from": previous, "to": net.number })),
    })
}

pub(super) fn plan_create_zone(
    ctx: &mut PlanContext<'_>,
    params: &CreateZoneParams,
) -> Result<Plan, OperationError> {
    if params.points.len() < 3 {
        return Err(invalid(format!(
            "a zone needs at least 3 points, got {}",
            params.points.len()
        )));
    }
    for (i, p) in params.points.iter().enumerate() {
        finite(&format!("points[{i}].x"), p.x)?;
        finite(&format!("points[{i}].y"), p.y)?;
    }
    let min_thickness = positive(
        "min_thickness",
        params.min_thickness.unwrap_or(ctx.config.zone_min_thickness),
    )?;
    let layer = normalize(ctx.config, &params.layer);
    check_copper(ctx.doc, &layer)?;
    let net = net_by_name(ctx.doc, &params.net_name)?;
    if net.number == 0 {
        return Err(invalid("a zone needs a net other than 0"));
    }

    let uuid = new_uuid();
    let mut items = vec![
        Expr::node("net", [Expr::integer(i64::from(net.number))]),
        Expr::node("net_name", [Expr::string(net.name.clone())]),
        layer_expr(&layer),
        uuid_expr(&uuid),
        Expr::node("hatch", [Expr::symbol("edge"), Expr::number(0.5)]),
    ];
    if params.priority > 0 {
        items.push(Expr::node("priority", [Expr::integer(i64::from(params.priority))]));
    }
    items.extend([
        Expr::node("connect_pads", [Expr::node("clearance", [Expr::number(0.5)])]),
        Expr::node("min_thickness", [Expr::number(min_thickness)]),
        Expr::node(
            "fill",
            [
                Expr::symbol("yes"),
                Expr::node("thermal_gap", [Expr::number(0.5)]),
                Expr::node("thermal_bridge_width", [Expr::number(0.5)]),
            ],
        ),
        Expr::node(
            "polygon",
            [Expr::node(
                "pts",
                params.points.iter().map(|p| Expr::point("xy", p.x, p.y)),
            )],
        ),
    ]);

    Ok(Plan {
        mutations: vec![Mutation::Append {
            parent: ctx.doc.root().id(),
            expr: Expr::node("zone", items),
        }],
        target: Some(format!("zone:{uuid}")),
        details: Some(json!({
            "net": net.number,
            "layer": layer,
            "corners": params.points.len(),
        })),
    })
}
