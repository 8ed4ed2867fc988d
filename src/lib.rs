//! kicad-pcb-mcp: MCP server for incremental editing of KiCad board files
//!
//! Boards are edited in sessions. A session holds a formatting-preserving
//! parse of a `.kicad_pcb` file; every edit is validated before it touches
//! the document, is recorded with before/after snapshots, and can be undone.
//! Saving writes the edited text back with untouched elements byte-identical
//! to the input.
//!
//! # Modules
//!
//! - [`kicad`] — S-expression document model, board views, layer names, DRC reports
//! - [`routing`] — Grid A* pathfinder for obstacle-aware traces
//! - [`session`] — Editing sessions, operations and undo
//! - [`cache`] — LRU cache with per-entry TTL
//! - [`config`] — Configuration loading and validation
//! - [`error`] — Configuration error types
//! - [`mcp`] — MCP protocol implementation

pub mod cache;
pub mod config;
pub mod error;
pub mod kicad;
pub mod mcp;
pub mod routing;
pub mod session;
