//! Read-only structured views of a board document.
//!
//! These views recognise the elements the editing session reads and return
//! plain serialisable data. Anything they do not recognise is skipped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::layers::is_copper;
use super::sexpr::{Document, NodeRef};

/// Layer used for the board outline.
pub const EDGE_CUTS: &str = "Edge.Cuts";

/// Graphic element keywords that may carry board outline geometry.
const OUTLINE_ELEMENTS: &[&str] = &["gr_line", "gr_rect", "gr_poly", "gr_arc", "gr_circle"];

/// A point in board coordinates (millimetres, Y down).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate in mm.
    pub x: f64,
    /// Y coordinate in mm.
    pub y: f64,
}

impl Point {
    /// Creates a point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    /// Minimum X.
    pub min_x: f64,
    /// Minimum Y.
    pub min_y: f64,
    /// Maximum X.
    pub max_x: f64,
    /// Maximum Y.
    pub max_y: f64,
}

impl BoundingBox {
    /// A box containing a single point.
    #[must_use]
    pub const fn at(point: Point) -> Self {
        Self {
            min_x: point.x,
            min_y: point.y,
            max_x: point.x,
            max_y: point.y,
        }
    }

    /// Grows the box to contain `point`.
    pub fn include(&mut self, point: Point) {
        self.min_x = self.min_x.min(point.x);
        self.min_y = self.min_y.min(point.y);
        self.max_x = self.max_x.max(point.x);
        self.max_y = self.max_y.max(point.y);
    }

    /// Returns the box grown by `margin` on every side.
    #[must_use]
    pub fn expanded(self, margin: f64) -> Self {
        Self {
            min_x: self.min_x - margin,
            min_y: self.min_y - margin,
            max_x: self.max_x + margin,
            max_y: self.max_y + margin,
        }
    }

    /// Width in mm.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height in mm.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Returns `true` if `point` lies inside or on the box.
    #[must_use]
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.min_x
            && point.x <= self.max_x
            && point.y >= self.min_y
            && point.y <= self.max_y
    }

    fn from_points(points: impl IntoIterator<Item = Point>) -> Option<Self> {
        let mut points = points.into_iter();
        let mut bbox = Self::at(points.next()?);
        for point in points {
            bbox.include(point);
        }
        Some(bbox)
    }
}

/// A net declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Net {
    /// Net number.
    pub number: u32,
    /// Net name (empty for the unconnected net 0).
    pub name: String,
}

/// An entry of the board layer table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Layer {
    /// Layer ordinal as written in the file.
    pub ordinal: i64,
    /// Canonical layer name.
    pub name: String,
    /// Layer type (`signal`, `power`, `user`, ...).
    pub kind: String,
    /// Display name, when the file carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

/// A footprint pad with absolute position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pad {
    /// Pad number (`"1"`, `"A3"`, or empty for mechanical pads).
    pub number: String,
    /// Pad type (`smd`, `thru_hole`, `np_thru_hole`, `connect`).
    pub kind: String,
    /// Pad shape (`rect`, `roundrect`, `circle`, `oval`, ...).
    pub shape: String,
    /// Absolute X in mm.
    pub x: f64,
    /// Absolute Y in mm.
    pub y: f64,
    /// Width in mm.
    pub width: f64,
    /// Height in mm.
    pub height: f64,
    /// Absolute rotation in degrees.
    pub angle: f64,
    /// Layer patterns (`F.Cu`, `*.Cu`, `*.Mask`, ...).
    pub layers: Vec<String>,
    /// Net number, if the pad is connected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net: Option<u32>,
    /// Net name, if the pad is connected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_name: Option<String>,
}

/// A placed footprint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Component {
    /// Reference designator (`R1`, `U3`).
    pub reference: String,
    /// Value (`10k`, `STM32F103C8Tx`).
    pub value: String,
    /// Library identifier (`Resistor_SMD:R_0603_1608Metric`).
    pub library: String,
    /// Placement side layer (`F.Cu` or `B.Cu`).
    pub layer: String,
    /// X in mm.
    pub x: f64,
    /// Y in mm.
    pub y: f64,
    /// Rotation in degrees.
    pub angle: f64,
    /// Pads with absolute positions.
    pub pads: Vec<Pad>,
}

/// A routed track segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    /// Element uuid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Start point.
    pub start: Point,
    /// End point.
    pub end: Point,
    /// Track width in mm.
    pub width: f64,
    /// Copper layer.
    pub layer: String,
    /// Net number.
    pub net: u32,
}

/// A via.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Via {
    /// Element uuid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Position.
    pub at: Point,
    /// Pad diameter in mm.
    pub size: f64,
    /// Drill diameter in mm.
    pub drill: f64,
    /// Start and end copper layers.
    pub layers: Vec<String>,
    /// Net number.
    pub net: u32,
}

/// Overview of a board.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardSummary {
    /// File format version.
    pub version: Option<String>,
    /// Generator that last wrote the file.
    pub generator: Option<String>,
    /// Board thickness in mm.
    pub thickness: Option<f64>,
    /// All layer names in the layer table.
    pub layers: Vec<String>,
    /// Copper layer names in stack order.
    pub copper_layers: Vec<String>,
    /// Number of declared nets.
    pub net_count: usize,
    /// Number of footprints.
    pub component_count: usize,
    /// Number of track segments.
    pub segment_count: usize,
    /// Number of vias.
    pub via_count: usize,
    /// Number of zones.
    pub zone_count: usize,
    /// Bounding box of the Edge.Cuts outline.
    pub outline: Option<BoundingBox>,
}

/// A pad waiting to be connected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatsnestPad {
    /// Owning footprint reference.
    pub reference: String,
    /// Pad number.
    pub pad: String,
    /// Absolute X in mm.
    pub x: f64,
    /// Absolute Y in mm.
    pub y: f64,
}

/// A net with pads but no routed copper.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatsnestNet {
    /// Net number.
    pub net: u32,
    /// Net name.
    pub net_name: String,
    /// Number of pads on the net.
    pub pad_count: usize,
    /// The pads.
    pub pads: Vec<RatsnestPad>,
}

fn number_at(node: Option<NodeRef<'_>>, index: usize) -> Option<f64> {
    node?.numbers().get(index).copied()
}

fn point_of(node: Option<NodeRef<'_>>) -> Option<Point> {
    let values = node?.numbers();
    match values.as_slice() {
        [x, y, ..] => Some(Point::new(*x, *y)),
        _ => None,
    }
}

fn net_of(node: NodeRef<'_>) -> Option<u32> {
    node.child("net")?.first_value()?.parse().ok()
}

fn uuid_of(node: NodeRef<'_>) -> Option<String> {
    node.child("uuid")
        .or_else(|| node.child("tstamp"))
        .and_then(|n| n.first_value())
        .map(str::to_string)
}

fn layer_of(node: NodeRef<'_>) -> Option<&str> {
    node.child("layer")?.first_value()
}

/// Rotates a footprint-local offset into board coordinates.
///
/// Board Y grows downwards, so a positive angle turns counter-clockwise on
/// screen.
#[must_use]
pub fn rotate(offset: Point, angle_deg: f64) -> Point {
    if angle_deg == 0.0 {
        return offset;
    }
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    Point::new(
        offset.x.mul_add(cos, offset.y * sin),
        (-offset.x).mul_add(sin, offset.y * cos),
    )
}

/// Declared nets, in file order.
#[must_use]
pub fn nets(doc: &Document) -> Vec<Net> {
    doc.root()
        .children_named("net")
        .filter_map(|node| {
            let values = node.values();
            let number = values.first()?.parse().ok()?;
            let name = values.get(1).map_or_else(String::new, |s| (*s).to_string());
            Some(Net { number, name })
        })
        .collect()
}

/// Returns the declared net with the given number.
#[must_use]
pub fn find_net(doc: &Document, number: u32) -> Option<Net> {
    nets(doc).into_iter().find(|net| net.number == number)
}

/// Entries of the layer table, in file order.
#[must_use]
pub fn layers(doc: &Document) -> Vec<Layer> {
    let Some(table) = doc.root().child("layers") else {
        return Vec::new();
    };
    table
        .children()
        .filter(NodeRef::is_list)
        .filter_map(|entry| {
            let values = entry.values();
            match values.as_slice() {
                [ordinal, name, kind, rest @ ..] => Some(Layer {
                    ordinal: ordinal.parse().ok()?,
                    name: (*name).to_string(),
                    kind: (*kind).to_string(),
                    user_name: rest.first().map(|s| (*s).to_string()),
                }),
                _ => None,
            }
        })
        .collect()
}

/// Copper layer names in stack order (front to back).
///
/// Boards without a layer table are treated as two-layer boards.
#[must_use]
pub fn copper_layers(doc: &Document) -> Vec<String> {
    let names: Vec<String> = layers(doc)
        .into_iter()
        .map(|layer| layer.name)
        .filter(|name| is_copper(name))
        .collect();
    if names.is_empty() {
        vec!["F.Cu".to_string(), "B.Cu".to_string()]
    } else {
        names
    }
}

fn property(footprint: NodeRef<'_>, key: &str) -> Option<String> {
    let from_property = footprint
        .children_named("property")
        .find(|p| p.first_value() == Some(key))
        .and_then(|p| p.values().get(1).map(|s| (*s).to_string()));
    from_property.or_else(|| {
        let kind = key.to_ascii_lowercase();
        footprint
            .children_named("fp_text")
            .find(|t| t.first_value() == Some(kind.as_str()))
            .and_then(|t| t.values().get(1).map(|s| (*s).to_string()))
    })
}

/// Reference designator of a footprint node.
#[must_use]
pub fn reference_of(footprint: NodeRef<'_>) -> Option<String> {
    property(footprint, "Reference")
}

fn pad_of(node: NodeRef<'_>, origin: Point, fp_angle: f64) -> Pad {
    let values = node.values();
    let at = node.child("at");
    let local = point_of(at).unwrap_or(Point::new(0.0, 0.0));
    let offset = rotate(local, fp_angle);
    let size = node.child("size");
    let net = node.child("net");
    Pad {
        number: values.first().map_or_else(String::new, |s| (*s).to_string()),
        kind: values.get(1).map_or_else(String::new, |s| (*s).to_string()),
        shape: values.get(2).map_or_else(String::new, |s| (*s).to_string()),
        x: origin.x + offset.x,
        y: origin.y + offset.y,
        width: number_at(size, 0).unwrap_or(0.0),
        height: number_at(size, 1).or_else(|| number_at(size, 0)).unwrap_or(0.0),
        angle: number_at(at, 2).unwrap_or(fp_angle),
        layers: node
            .child("layers")
            .map(|l| l.values().into_iter().map(str::to_string).collect())
            .unwrap_or_default(),
        net: net.and_then(|n| n.first_value()?.parse().ok()),
        net_name: net.and_then(|n| n.values().get(1).map(|s| (*s).to_string())),
    }
}

fn component_of(node: NodeRef<'_>) -> Component {
    let at = node.child("at");
    let origin = point_of(at).unwrap_or(Point::new(0.0, 0.0));
    let angle = number_at(at, 2).unwrap_or(0.0);
    Component {
        reference: reference_of(node).unwrap_or_default(),
        value: property(node, "Value").unwrap_or_default(),
        library: node.first_value().unwrap_or_default().to_string(),
        layer: layer_of(node).unwrap_or("F.Cu").to_string(),
        x: origin.x,
        y: origin.y,
        angle,
        pads: node
            .children_named("pad")
            .map(|pad| pad_of(pad, origin, angle))
            .collect(),
    }
}

/// Placed footprints, in file order.
#[must_use]
pub fn components(doc: &Document) -> Vec<Component> {
    doc.root()
        .children_named("footprint")
        .chain(doc.root().children_named("module"))
        .map(component_of)
        .collect()
}

/// Returns the footprint node with the given reference designator.
#[must_use]
pub fn find_footprint<'a>(doc: &'a Document, reference: &str) -> Option<NodeRef<'a>> {
    doc.root()
        .children()
        .filter(|n| n.is("footprint") || n.is("module"))
        .find(|n| reference_of(*n).as_deref() == Some(reference))
}

/// Routed track segments.
#[must_use]
pub fn segments(doc: &Document) -> Vec<Segment> {
    doc.root()
        .children_named("segment")
        .filter_map(|node| {
            Some(Segment {
                uuid: uuid_of(node),
                start: point_of(node.child("start"))?,
                end: point_of(node.child("end"))?,
                width: number_at(node.child("width"), 0).unwrap_or(0.0),
                layer: layer_of(node)?.to_string(),
                net: net_of(node).unwrap_or(0),
            })
        })
        .collect()
}

/// Vias.
#[must_use]
pub fn vias(doc: &Document) -> Vec<Via> {
    doc.root()
        .children_named("via")
        .filter_map(|node| {
            Some(Via {
                uuid: uuid_of(node),
                at: point_of(node.child("at"))?,
                size: number_at(node.child("size"), 0).unwrap_or(0.0),
                drill: number_at(node.child("drill"), 0).unwrap_or(0.0),
                layers: node
                    .child("layers")
                    .map(|l| l.values().into_iter().map(str::to_string).collect())
                    .unwrap_or_default(),
                net: net_of(node).unwrap_or(0),
            })
        })
        .collect()
}

/// Returns the top-level element with the given keyword and uuid.
#[must_use]
pub fn find_by_uuid<'a>(doc: &'a Document, head: &str, uuid: &str) -> Option<NodeRef<'a>> {
    doc.root()
        .children_named(head)
        .find(|n| uuid_of(*n).as_deref() == Some(uuid))
}

/// Returns `true` if a top-level graphic element lies on Edge.Cuts.
#[must_use]
pub fn is_outline_element(node: NodeRef<'_>) -> bool {
    OUTLINE_ELEMENTS.iter().any(|h| node.is(h)) && layer_of(node) == Some(EDGE_CUTS)
}

/// Bounding box of the Edge.Cuts outline.
#[must_use]
pub fn outline_bbox(doc: &Document) -> Option<BoundingBox> {
    let mut points = Vec::new();
    for node in doc.root().children().filter(|n| is_outline_element(*n)) {
        for key in ["start", "end", "mid", "center"] {
            points.extend(point_of(node.child(key)));
        }
        if let Some(pts) = node.child("pts") {
            points.extend(pts.children_named("xy").filter_map(|xy| point_of(Some(xy))));
        }
    }
    BoundingBox::from_points(points)
}

/// Bounding box of footprints, pads, tracks and vias.
#[must_use]
pub fn content_bbox(doc: &Document) -> Option<BoundingBox> {
    let mut points = Vec::new();
    for component in components(doc) {
        points.push(Point::new(component.x, component.y));
        points.extend(component.pads.iter().map(|p| Point::new(p.x, p.y)));
    }
    for segment in segments(doc) {
        points.push(segment.start);
        points.push(segment.end);
    }
    points.extend(vias(doc).into_iter().map(|v| v.at));
    BoundingBox::from_points(points)
}

/// Board overview.
#[must_use]
pub fn summary(doc: &Document) -> BoardSummary {
    let root = doc.root();
    let general = root.child("general");
    BoardSummary {
        version: root
            .child("version")
            .and_then(|n| n.first_value())
            .map(str::to_string),
        generator: root
            .child("generator")
            .and_then(|n| n.first_value())
            .map(str::to_string),
        thickness: number_at(general.and_then(|g| g.child("thickness")), 0),
        layers: layers(doc).into_iter().map(|l| l.name).collect(),
        copper_layers: copper_layers(doc),
        net_count: root.children_named("net").count(),
        component_count: root.children_named("footprint").count()
            + root.children_named("module").count(),
        segment_count: root.children_named("segment").count(),
        via_count: root.children_named("via").count(),
        zone_count: root.children_named("zone").count(),
        outline: outline_bbox(doc),
    }
}

/// Nets that have at least two pads and no routed segment.
#[must_use]
pub fn ratsnest(doc: &Document) -> Vec<RatsnestNet> {
    let mut pads_by_net: BTreeMap<u32, Vec<RatsnestPad>> = BTreeMap::new();
    for component in components(doc) {
        for pad in &component.pads {
            let Some(net) = pad.net.filter(|&n| n != 0) else {
                continue;
            };
            pads_by_net.entry(net).or_default().push(RatsnestPad {
                reference: component.reference.clone(),
                pad: pad.number.clone(),
                x: pad.x,
                y: pad.y,
            });
        }
    }
    let routed: Vec<u32> = segments(doc).into_iter().map(|s| s.net).collect();
    let names = nets(doc);

    pads_by_net
        .into_iter()
        .filter(|(net, pads)| pads.len() >= 2 && !routed.contains(net))
        .map(|(net, pads)| RatsnestNet {
            net,
            net_name: names
                .iter()
                .find(|n| n.number == net)
                .map(|n| n.name.clone())
                .unwrap_or_default(),
            pad_count: pads.len(),
            pads,
        })
        .collect()
}
