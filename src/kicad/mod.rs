//! KiCad board file handling.
//!
//! This module provides formatting-preserving read/write access to KiCad
//! board files (`.kicad_pcb`):
//!
//! - [`sexpr`] — the S-expression document model (parse, navigate, mutate, serialise)
//! - [`layers`] — display-name to internal-name layer normalisation
//! - [`board`] — read-only structured views (nets, footprints, tracks, summary)
//! - [`drc`] — classification of design-rule-check reports
//!
//! # File Format
//!
//! A board file is a single nested list headed by `kicad_pcb`. Elements are
//! lists whose first item is a keyword (`net`, `footprint`, `segment`, `via`,
//! `gr_line`, ...). The document model does not interpret the format; it only
//! preserves it. The views in [`board`] recognise the handful of elements the
//! editing session needs and ignore everything else.

pub mod board;
pub mod drc;
pub mod error;
pub mod layers;
pub mod sexpr;

pub use drc::{DrcReport, DrcResult};
pub use error::{DocumentError, DocumentResult};
pub use layers::LayerAliases;
pub use sexpr::{Document, Expr, NodeId, NodeKind, NodeRef};
