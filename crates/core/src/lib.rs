pub mod catalog;
pub mod conflict;
pub mod index;
pub mod store;
pub mod summary;

use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use catalog::{capable_rooms, room_fits, Capability, Catalog};
pub use conflict::{check, is_room_overloaded};
pub use store::{StoreError, TimetableStore};
pub use types::{
    ConflictKind, ConflictReport, GenerateRequest, Generated, Horizon, Placement, Room, Session,
    SessionId, SlotGrid, Timetable, UnplacedReason, UnplacedSession,
};

fn join_ids(ids: &[SessionId]) -> String {
    ids.iter().map(|s| s.0.as_str()).collect::<Vec<_>>().join(", ")
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerateError {
    #[error("room catalog is empty")]
    EmptyRoomCatalog,
    #[error("invalid catalog: {}", .0.join("; "))]
    InvalidCatalog(Vec<String>),
    #[error("invalid slot grid: {}", .0.join("; "))]
    InvalidGrid(Vec<String>),
    #[error("no room in the catalog can host: {}", join_ids(.0))]
    UnsatisfiableCapability(Vec<SessionId>),
    #[error("generation cancelled")]
    Cancelled,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GenerateError {
    /// Errors caused by the catalogs themselves rather than by the run.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            GenerateError::EmptyRoomCatalog
                | GenerateError::InvalidCatalog(_)
                | GenerateError::InvalidGrid(_)
                | GenerateError::UnsatisfiableCapability(_)
        )
    }
}

/// Structural checks run before any placement is attempted.
///
/// All problems are collected; the run is refused if any is found.
pub fn validate(
    sessions: &[Session],
    rooms: &[Room],
    strict_capabilities: bool,
) -> Result<(), GenerateError> {
    if rooms.is_empty() {
        return Err(GenerateError::EmptyRoomCatalog);
    }

    let mut errors: Vec<String> = Vec::new();

    fn chk_unique<'a>(name: &str, ids: impl Iterator<Item = &'a str>, errors: &mut Vec<String>) {
        let mut seen = HashSet::new();
        for id in ids {
            if !seen.insert(id) {
                errors.push(format!("duplicate {name} id: {id}"));
            }
        }
    }
    chk_unique("session", sessions.iter().map(|s| s.id.0.as_str()), &mut errors);
    chk_unique("room", rooms.iter().map(|r| r.id.0.as_str()), &mut errors);

    let room_ids: HashSet<_> = rooms.iter().map(|r| &r.id).collect();
    for s in sessions {
        if s.duration_minutes == 0 {
            errors.push(format!("session {} has zero duration", s.id));
        }
        if let Some(iv) = &s.pin.interval {
            if iv.duration() != s.duration() {
                errors.push(format!(
                    "session {} is pinned to {} which does not last {} minutes",
                    s.id, iv, s.duration_minutes
                ));
            }
        }
        for w in s.allowed.iter().chain(&s.forbidden) {
            if w.start >= w.end {
                errors.push(format!(
                    "session {} has an empty time window {}-{}",
                    s.id, w.start, w.end
                ));
            }
        }
        if let Some(r) = &s.pin.room_id {
            if !room_ids.contains(r) {
                errors.push(format!("session {} is pinned to missing room {}", s.id, r));
            }
        }
    }

    if !errors.is_empty() {
        return Err(GenerateError::InvalidCatalog(errors));
    }

    if strict_capabilities {
        let hopeless: Vec<SessionId> = sessions
            .iter()
            .filter(|s| !matches!(capable_rooms(s, rooms), Capability::Rooms(_)))
            .map(|s| s.id.clone())
            .collect();
        if !hopeless.is_empty() {
            return Err(GenerateError::UnsatisfiableCapability(hopeless));
        }
    }
    Ok(())
}

pub fn validate_grid(grid: &SlotGrid) -> Result<(), GenerateError> {
    let errors = grid.problems();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(GenerateError::InvalidGrid(errors))
    }
}

#[async_trait]
pub trait Allocator: Send + Sync + 'static {
    async fn generate(
        &self,
        request: GenerateRequest,
        cancel: CancellationToken,
    ) -> Result<Generated, GenerateError>;
}
