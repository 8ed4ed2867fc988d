//! Operation records.

use serde::Serialize;
use serde_json::Value;

/// The outcome of one operation on a session.
///
/// Records are created by the [`super::SessionManager`] and only handed out
/// by shared reference or clone, so they never change after creation.
/// `after_snapshot` is the document text at the moment the record was made;
/// for a rejected operation it equals `before_snapshot`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationRecord {
    /// Short unique id.
    pub id: String,
    /// Position in the session log, starting at 1.
    pub sequence: usize,
    /// Operation name (`route_trace`, `add_via`, `undo`, ...).
    pub operation: String,
    /// Input parameters as given.
    pub params: Value,
    /// Whether the document was changed.
    pub applied: bool,
    /// Document text before the operation.
    pub before_snapshot: String,
    /// Document text after the operation.
    pub after_snapshot: String,
    /// Why the operation was rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// What the operation touched (`segment:<uuid>`, `footprint:R1`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Operation-specific extras (route statistics, assigned net number).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// An [`OperationRecord`] without its snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSummary {
    /// Short unique id.
    pub id: String,
    /// Position in the session log.
    pub sequence: usize,
    /// Operation name.
    pub operation: String,
    /// Input parameters.
    pub params: Value,
    /// Whether the document was changed.
    pub applied: bool,
    /// Why the operation was rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// What the operation touched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Operation-specific extras.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl OperationRecord {
    /// Returns the record without snapshots.
    #[must_use]
    pub fn summary(&self) -> RecordSummary {
        RecordSummary {
            id: self.id.clone(),
            sequence: self.sequence,
            operation: self.operation.clone(),
            params: self.params.clone(),
            applied: self.applied,
            reason: self.reason.clone(),
            target: self.target.clone(),
            details: self.details.clone(),
        }
    }

    /// Returns `true` if the snapshots differ.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.before_snapshot != self.after_snapshot
    }
}

pub(super) fn new_record_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}
