//! Editing sessions over board documents.
//!
//! A [`SessionManager`] owns one [`Document`] per session and exposes named
//! operations (`route_trace`, `add_via`, ...). Every operation follows the
//! same contract:
//!
//! 1. normalise layer names and validate parameters against the document
//! 2. plan the edit (consulting the pathfinder for obstacle-aware routes)
//! 3. snapshot, mutate, snapshot
//! 4. return an [`OperationRecord`]
//!
//! Invalid parameters and routing failures never surface as `Err`: they
//! produce a record with `applied == false`, identical snapshots and a
//! reason. Only an unknown or inactive session, or a structural document
//! error, is a hard failure.

mod ops;
mod record;

pub use ops::{
    AddBoardTextParams, AddViaParams, AssignNetParams, CreateZoneParams, MoveComponentParams,
    OperationError, RouteMemo, RouteTraceParams,
};
pub use record::{OperationRecord, RecordSummary};

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::cache::{CacheStats, LruCache};
use crate::kicad::board::{
    self, BoardSummary, Component, Net, Point, RatsnestNet, Segment, Via,
};
use crate::kicad::error::DocumentError;
use crate::kicad::layers::LayerAliases;
use crate::kicad::sexpr::Document;
use crate::routing::RouterConfig;

use ops::{Mutation, Plan, PlanContext};
use record::new_record_id;

/// Default stroke width for generated board outline lines, in mm.
pub const DEFAULT_OUTLINE_STROKE_WIDTH: f64 = 0.05;

/// Default via pad diameter, in mm.
pub const DEFAULT_VIA_SIZE: f64 = 0.8;

/// Default via drill diameter, in mm.
pub const DEFAULT_VIA_DRILL: f64 = 0.4;

/// Default board text height, in mm.
pub const DEFAULT_TEXT_SIZE: f64 = 1.0;

/// Default minimum copper width of new zones, in mm.
pub const DEFAULT_ZONE_MIN_THICKNESS: f64 = 0.25;

/// Settings shared by all sessions of a manager.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Pathfinder parameters.
    pub router: RouterConfig,
    /// Display-name layer aliases.
    pub layer_aliases: LayerAliases,
    /// Stroke width of outline lines created by `set_board_outline`.
    pub outline_stroke_width: f64,
    /// Via diameter used when none is given and for routed vias.
    pub via_size: f64,
    /// Via drill used when none is given and for routed vias.
    pub via_drill: f64,
    /// Text height used when none is given.
    pub text_size: f64,
    /// Zone minimum width used when none is given.
    pub zone_min_thickness: f64,
    /// Capacity of the route memo.
    pub route_cache_size: usize,
    /// Lifetime of memoised routes.
    pub route_cache_ttl: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            router: RouterConfig::default(),
            layer_aliases: LayerAliases::default(),
            outline_stroke_width: DEFAULT_OUTLINE_STROKE_WIDTH,
            via_size: DEFAULT_VIA_SIZE,
            via_drill: DEFAULT_VIA_DRILL,
            text_size: DEFAULT_TEXT_SIZE,
            zone_min_thickness: DEFAULT_ZONE_MIN_THICKNESS,
            route_cache_size: 64,
            route_cache_ttl: Some(Duration::from_secs(60)),
        }
    }
}

/// Session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The id as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Accepting operations.
    Active,
    /// Closed by the caller.
    Discarded,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("active"),
            Self::Discarded => f.write_str("discarded"),
        }
    }
}

/// Hard failures of session calls.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No session with this id.
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    /// The session no longer accepts operations.
    #[error("Session {id} is {state}, not active")]
    NotActive {
        /// The session.
        id: SessionId,
        /// Its state.
        state: SessionState,
    },

    /// The document rejected a structural operation.
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),
}

/// One editing session.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    state: SessionState,
    document: Document,
    source: Option<String>,
    records: Vec<OperationRecord>,
    /// Indices into `records` of applied operations that can still be undone.
    undo_stack: Vec<usize>,
    revision: u64,
}

impl Session {
    /// Session id.
    #[must_use]
    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    /// Lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// The working document.
    #[must_use]
    pub const fn document(&self) -> &Document {
        &self.document
    }

    /// Where the document came from (usually a file path).
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// The operation log, oldest first.
    #[must_use]
    pub fn records(&self) -> &[OperationRecord] {
        &self.records
    }

    /// Number of document changes so far (undo counts as a change).
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of operations that can be undone.
    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    /// Checks that the session still accepts work.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotActive`] once the session is discarded.
    pub fn require_active(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Active => Ok(()),
            state => Err(SessionError::NotActive {
                id: self.id.clone(),
                state,
            }),
        }
    }

    fn push_record(
        &mut self,
        operation: &str,
        params: Value,
        before: String,
        outcome: Result<Plan, String>,
    ) -> OperationRecord {
        let applied = outcome.is_ok();
        let (reason, target, details) = match outcome {
            Ok(plan) => (None, plan.target, plan.details),
            Err(reason) => (Some(reason), None, None),
        };
        let after = if applied {
            self.document.serialize()
        } else {
            before.clone()
        };
        let record = OperationRecord {
            id: new_record_id(),
            sequence: self.records.len() + 1,
            operation: operation.to_string(),
            params,
            applied,
            before_snapshot: before,
            after_snapshot: after,
            reason,
            target,
            details,
        };
        self.records.push(record.clone());
        record
    }
}

/// Checks that every node a plan touches is still attached, so that no
/// mutation fails halfway through.
fn preflight(doc: &Document, plan: &Plan) -> Result<(), DocumentError> {
    for mutation in &plan.mutations {
        let id = match mutation {
            Mutation::Append { parent, .. } | Mutation::Insert { parent, .. } => {
                if !doc.node(*parent)?.is_list() {
                    return Err(DocumentError::invalid_target(*parent, "not a list"));
                }
                continue;
            }
            Mutation::Replace { target, .. } | Mutation::Remove { target } => *target,
        };
        doc.node(id)?;
    }
    Ok(())
}

fn apply_mutations(doc: &mut Document, mutations: Vec<Mutation>) -> Result<(), DocumentError> {
    for mutation in mutations {
        match mutation {
            Mutation::Append { parent, expr } => {
                doc.append_child(parent, expr)?;
            }
            Mutation::Insert {
                parent,
                position,
                expr,
            } => {
                doc.insert_child(parent, position, expr)?;
            }
            Mutation::Replace { target, expr } => {
                doc.replace(target, expr)?;
            }
            Mutation::Remove { target } => doc.remove(target)?,
        }
    }
    Ok(())
}

fn to_params<T: Serialize>(params: &T) -> Value {
    serde_json::to_value(params).unwrap_or(Value::Null)
}

/// Owns the editing sessions.
#[derive(Debug)]
pub struct SessionManager {
    config: SessionConfig,
    sessions: HashMap<SessionId, Session>,
    route_memo: RouteMemo,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl SessionManager {
    /// Creates a manager.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        let route_memo = LruCache::new(config.route_cache_size, config.route_cache_ttl);
        Self {
            config,
            sessions: HashMap::new(),
            route_memo,
        }
    }

    /// The shared settings.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Starts a session over an already parsed document.
    pub fn start_session(&mut self, document: Document, source: Option<String>) -> SessionId {
        let id = SessionId::generate();
        info!(session = %id, source = source.as_deref().unwrap_or("-"), "Session started");
        self.sessions.insert(
            id.clone(),
            Session {
                id: id.clone(),
                state: SessionState::Active,
                document,
                source,
                records: Vec::new(),
                undo_stack: Vec::new(),
                revision: 0,
            },
        );
        id
    }

    /// Parses `text` and starts a session over it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Document`] if the text does not parse.
    pub fn open(&mut self, text: &str, source: Option<String>) -> Result<SessionId, SessionError> {
        let document = Document::parse(text)?;
        Ok(self.start_session(document, source))
    }

    /// Looks up a session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] for unknown ids.
    pub fn session(&self, id: &SessionId) -> Result<&Session, SessionError> {
        self.sessions
            .get(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))
    }

    /// All sessions, in no particular order.
    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    fn active_session(&self, id: &SessionId) -> Result<&Session, SessionError> {
        let session = self.session(id)?;
        session.require_active()?;
        Ok(session)
    }

    /// Serialised text of the session's current document.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] or [`SessionError::NotActive`].
    pub fn snapshot(&self, id: &SessionId) -> Result<String, SessionError> {
        Ok(self.active_session(id)?.document.serialize())
    }

    /// Ends a session. Further operations fail with
    /// [`SessionError::NotActive`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] or [`SessionError::NotActive`].
    pub fn discard(&mut self, id: &SessionId) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))?;
        session.require_active()?;
        session.state = SessionState::Discarded;
        info!(session = %id, operations = session.records.len(), "Session discarded");
        Ok(())
    }

    /// Validates, plans and applies one operation.
    fn apply<F>(
        &mut self,
        id: &SessionId,
        operation: &str,
        params: Value,
        plan: F,
    ) -> Result<OperationRecord, SessionError>
    where
        F: FnOnce(&mut PlanContext<'_>) -> Result<Plan, OperationError>,
    {
        let Self {
            config,
            sessions,
            route_memo,
        } = self;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))?;
        session.require_active()?;

        let mut ctx = PlanContext {
            doc: &session.document,
            config,
            route_memo,
            memo_prefix: format!("{id}:{}", session.revision),
        };
        let planned = plan(&mut ctx);
        let before = session.document.serialize();

        let mut plan = match planned {
            Ok(plan) => plan,
            Err(err) => {
                info!(session = %id, operation, reason = %err, "Operation rejected");
                return Ok(session.push_record(operation, params, before, Err(err.to_string())));
            }
        };

        preflight(&session.document, &plan)?;
        apply_mutations(&mut session.document, std::mem::take(&mut plan.mutations))?;
        session.revision += 1;
        let record = session.push_record(operation, params, before, Ok(plan));
        session.undo_stack.push(session.records.len() - 1);
        info!(
            session = %id,
            operation,
            target = record.target.as_deref().unwrap_or("-"),
            "Operation applied"
        );
        Ok(record)
    }

    /// Places a text item on the board.
    ///
    /// # Errors
    ///
    /// Hard failures only; see [`SessionError`].
    pub fn add_board_text(
        &mut self,
        id: &SessionId,
        params: &AddBoardTextParams,
    ) -> Result<OperationRecord, SessionError> {
        self.apply(id, "add_board_text", to_params(params), |ctx| {
            ops::plan_add_board_text(ctx, params)
        })
    }

    /// Routes a trace, as a straight segment or through the pathfinder.
    ///
    /// # Errors
    ///
    /// Hard failures only; see [`SessionError`].
    pub fn route_trace(
        &mut self,
        id: &SessionId,
        params: &RouteTraceParams,
    ) -> Result<OperationRecord, SessionError> {
        self.apply(id, "route_trace", to_params(params), |ctx| {
            ops::plan_route_trace(ctx, params)
        })
    }

    /// Places a via.
    ///
    /// # Errors
    ///
    /// Hard failures only; see [`SessionError`].
    pub fn add_via(
        &mut self,
        id: &SessionId,
        params: &AddViaParams,
    ) -> Result<OperationRecord, SessionError> {
        self.apply(id, "add_via", to_params(params), |ctx| {
            ops::plan_add_via(ctx, params)
        })
    }

    /// Declares a new net with the next free number.
    ///
    /// # Errors
    ///
    /// Hard failures only; see [`SessionError`].
    pub fn create_net(&mut self, id: &SessionId, name: &str) -> Result<OperationRecord, SessionError> {
        self.apply(id, "create_net", json!({ "name": name }), |ctx| {
            ops::plan_create_net(ctx, name)
        })
    }

    /// Moves (and optionally rotates) a footprint.
    ///
    /// # Errors
    ///
    /// Hard failures only; see [`SessionError`].
    pub fn move_component(
        &mut self,
        id: &SessionId,
        params: &MoveComponentParams,
    ) -> Result<OperationRecord, SessionError> {
        self.apply(id, "move_component", to_params(params), |ctx| {
            ops::plan_move_component(ctx, params)
        })
    }

    /// Removes a footprint.
    ///
    /// # Errors
    ///
    /// Hard failures only; see [`SessionError`].
    pub fn delete_component(
        &mut self,
        id: &SessionId,
        reference: &str,
    ) -> Result<OperationRecord, SessionError> {
        self.apply(id, "delete_component", json!({ "reference": reference }), |ctx| {
            ops::plan_delete_component(ctx, reference)
        })
    }

    /// Removes a track segment by uuid.
    ///
    /// # Errors
    ///
    /// Hard failures only; see [`SessionError`].
    pub fn delete_trace(&mut self, id: &SessionId, uuid: &str) -> Result<OperationRecord, SessionError> {
        self.apply(id, "delete_trace", json!({ "uuid": uuid }), |ctx| {
            ops::plan_delete_trace(ctx, uuid)
        })
    }

    /// Removes a via by uuid.
    ///
    /// # Errors
    ///
    /// Hard failures only; see [`SessionError`].
    pub fn delete_via(&mut self, id: &SessionId, uuid: &str) -> Result<OperationRecord, SessionError> {
        self.apply(id, "delete_via", json!({ "uuid": uuid }), |ctx| {
            ops::plan_delete_via(ctx, uuid)
        })
    }

    /// Moves a footprint to the other side of the board.
    ///
    /// # Errors
    ///
    /// Hard failures only; see [`SessionError`].
    pub fn flip_component(
        &mut self,
        id: &SessionId,
        reference: &str,
    ) -> Result<OperationRecord, SessionError> {
        self.apply(id, "flip_component", json!({ "reference": reference }), |ctx| {
            ops::plan_flip_component(ctx, reference)
        })
    }

    /// Removes a net declaration that nothing refers to any more.
    ///
    /// # Errors
    ///
    /// Hard failures only; see [`SessionError`].
    pub fn delete_net(&mut self, id: &SessionId, name: &str) -> Result<OperationRecord, SessionError> {
        self.apply(id, "delete_net", json!({ "name": name }), |ctx| {
            ops::plan_delete_net(ctx, name)
        })
    }

    /// Connects a footprint pad to a net.
    ///
    /// # Errors
    ///
    /// Hard failures only; see [`SessionError`].
    pub fn assign_net(
        &mut self,
        id: &SessionId,
        params: &AssignNetParams,
    ) -> Result<OperationRecord, SessionError> {
        self.apply(id, "assign_net", to_params(params), |ctx| {
            ops::plan_assign_net(ctx, params)
        })
    }

    /// Adds a copper pour.
    ///
    /// # Errors
    ///
    /// Hard failures only; see [`SessionError`].
    pub fn create_zone(
        &mut self,
        id: &SessionId,
        params: &CreateZoneParams,
    ) -> Result<OperationRecord, SessionError> {
        self.apply(id, "create_zone", to_params(params), |ctx| {
            ops::plan_create_zone(ctx, params)
        })
    }

    /// Replaces the Edge.Cuts outline with a closed polygon.
    ///
    /// # Errors
    ///
    /// Hard failures only; see [`SessionError`].
    pub fn set_board_outline(
        &mut self,
        id: &SessionId,
        points: &[Point],
    ) -> Result<OperationRecord, SessionError> {
        self.apply(id, "set_board_outline", json!({ "points": points }), |ctx| {
            ops::plan_set_board_outline(ctx, points)
        })
    }

    /// Reverts the most recent applied operation that has not been undone.
    ///
    /// The undo is itself recorded. With nothing to undo, the record is
    /// rejected.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] or [`SessionError::NotActive`], or
    /// [`SessionError::Document`] if the stored snapshot no longer parses.
    pub fn undo(&mut self, id: &SessionId) -> Result<OperationRecord, SessionError> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))?;
        session.require_active()?;
        let before = session.document.serialize();

        let Some(index) = session.undo_stack.last().copied() else {
            return Ok(session.push_record(
                "undo",
                json!({}),
                before,
                Err("nothing to undo".to_string()),
            ));
        };
        let undone = &session.records[index];
        let restored = Document::parse(&undone.before_snapshot)?;
        let plan = Plan {
            mutations: Vec::new(),
            target: Some(format!("operation:{}", undone.id)),
            details: Some(json!({ "undone": undone.operation, "undone_id": undone.id })),
        };
        let params = json!({ "operation_id": undone.id });

        session.undo_stack.pop();
        session.document = restored;
        session.revision += 1;
        debug!(session = %id, "Restored snapshot");
        let record = session.push_record("undo", params, before, Ok(plan));
        info!(session = %id, target = record.target.as_deref().unwrap_or("-"), "Operation undone");
        Ok(record)
    }

    /// Board overview.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] or [`SessionError::NotActive`].
    pub fn summary(&self, id: &SessionId) -> Result<BoardSummary, SessionError> {
        Ok(board::summary(&self.active_session(id)?.document))
    }

    /// Placed footprints.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] or [`SessionError::NotActive`].
    pub fn components(&self, id: &SessionId) -> Result<Vec<Component>, SessionError> {
        Ok(board::components(&self.active_session(id)?.document))
    }

    /// Declared nets.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] or [`SessionError::NotActive`].
    pub fn nets(&self, id: &SessionId) -> Result<Vec<Net>, SessionError> {
        Ok(board::nets(&self.active_session(id)?.document))
    }

    /// Track segments.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] or [`SessionError::NotActive`].
    pub fn segments(&self, id: &SessionId) -> Result<Vec<Segment>, SessionError> {
        Ok(board::segments(&self.active_session(id)?.document))
    }

    /// Vias.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] or [`SessionError::NotActive`].
    pub fn vias(&self, id: &SessionId) -> Result<Vec<Via>, SessionError> {
        Ok(board::vias(&self.active_session(id)?.document))
    }

    /// Hit/miss counters of the route memo.
    #[must_use]
    pub fn route_cache_stats(&self) -> CacheStats {
        self.route_memo.stats()
    }

    /// Nets still waiting to be routed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] or [`SessionError::NotActive`].
    pub fn ratsnest(&self, id: &SessionId) -> Result<Vec<RatsnestNet>, SessionError> {
        Ok(board::ratsnest(&self.active_session(id)?.document))
    }

    /// The operation log without snapshots.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`].
    pub fn history(&self, id: &SessionId) -> Result<Vec<RecordSummary>, SessionError> {
        Ok(self
            .session(id)?
            .records
            .iter()
            .map(OperationRecord::summary)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOARD: &str = "(kicad_pcb\n\t(version 20241229)\n\t(layers\n\t\t(0 \"F.Cu\" signal)\n\t\t(31 \"B.Cu\" signal)\n\t\t(37 \"F.SilkS\" user \"F.Silkscreen\")\n\t)\n\t(net 0 \"\")\n\t(net 1 \"GND\")\n)\n";

    fn manager() -> (SessionManager, SessionId) {
        let mut manager = SessionManager::default();
        let id = manager.open(BOARD, None).unwrap();
        (manager, id)
    }

    fn via(net: u32) -> AddViaParams {
        AddViaParams {
            x: 5.0,
            y: 5.0,
            net,
            size: None,
            drill: None,
            layers: None,
        }
    }

    #[test]
    fn applied_operation_changes_snapshot() {
        let (mut m, id) = manager();
        let record = m.add_via(&id, &via(1)).unwrap();
        assert!(record.applied);
        assert_eq!(record.before_snapshot, BOARD);
        assert!(record.after_snapshot.contains("(via (at 5 5) (size 0.8) (drill 0.4) (layers \"F.Cu\" \"B.Cu\") (net 1)"));
        assert_eq!(m.snapshot(&id).unwrap(), record.after_snapshot);
        assert_eq!(m.session(&id).unwrap().revision(), 1);
    }

    #[test]
    fn unknown_net_is_rejected_without_change() {
        let (mut m, id) = manager();
        let record = m.add_via(&id, &via(7)).unwrap();
        assert!(!record.applied);
        assert_eq!(record.before_snapshot, record.after_snapshot);
        assert_eq!(record.reason.as_deref(), Some("net 7 does not exist"));
        assert_eq!(m.snapshot(&id).unwrap(), BOARD);
        assert_eq!(m.session(&id).unwrap().revision(), 0);
    }

    #[test]
    fn undo_restores_previous_state() {
        let (mut m, id) = manager();
        m.add_via(&id, &via(1)).unwrap();
        m.create_net(&id, "VCC").unwrap();
        let undo = m.undo(&id).unwrap();
        assert!(undo.applied);
        assert!(!m.snapshot(&id).unwrap().contains("VCC"));
        assert!(m.snapshot(&id).unwrap().contains("(via"));
        m.undo(&id).unwrap();
        assert_eq!(m.snapshot(&id).unwrap(), BOARD);
        let nothing = m.undo(&id).unwrap();
        assert!(!nothing.applied);
        assert_eq!(nothing.reason.as_deref(), Some("nothing to undo"));
    }

    #[test]
    fn discarded_session_rejects_operations() {
        let (mut m, id) = manager();
        m.discard(&id).unwrap();
        assert!(matches!(
            m.add_via(&id, &via(1)),
            Err(SessionError::NotActive { .. })
        ));
        assert!(matches!(m.discard(&id), Err(SessionError::NotActive { .. })));
        assert_eq!(m.history(&id).unwrap().len(), 0);
    }

    #[test]
    fn unknown_session() {
        let (mut m, _) = manager();
        let missing = SessionId::from("nope");
        assert!(matches!(
            m.create_net(&missing, "X"),
            Err(SessionError::NotFound(_))
        ));
    }

    #[test]
    fn create_net_inserts_after_last_net() {
        let (mut m, id) = manager();
        let record = m.create_net(&id, "VCC").unwrap();
        assert!(record.applied);
        assert!(record
            .after_snapshot
            .contains("\t(net 1 \"GND\")\n\t(net 2 \"VCC\")\n)"));
        assert_eq!(record.details.unwrap()["number"], 2);
        let duplicate = m.create_net(&id, "VCC").unwrap();
        assert!(!duplicate.applied);
    }

    #[test]
    fn records_are_numbered() {
        let (mut m, id) = manager();
        m.add_via(&id, &via(9)).unwrap();
        m.add_via(&id, &via(1)).unwrap();
        let history = m.history(&id).unwrap();
        assert_eq!(history.iter().map(|r| r.sequence).collect::<Vec<_>>(), [1, 2]);
        assert!(!history[0].applied);
        assert!(history[1].applied);
    }
}
