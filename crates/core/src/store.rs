use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use types::{
    ConflictReport, Horizon, Placement, RoomId, SessionId, TimeInterval, Timetable,
};

use crate::catalog::Catalog;
use crate::conflict::{is_room_overloaded, pair_conflicts};
use crate::index::ConflictIndex;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("unknown session {0}")]
    UnknownSession(SessionId),
    #[error("unknown room {0}")]
    UnknownRoom(RoomId),
    #[error("session {0} is already placed")]
    AlreadyPlaced(SessionId),
    #[error("session {0} has no placement")]
    NotPlaced(SessionId),
}

/// Committed placements of one horizon plus the index used to check them.
///
/// Every write re-derives the conflict flags of the placements it can
/// affect, so flags are always consistent with the committed set.
#[derive(Clone, Debug)]
pub struct TimetableStore {
    horizon: Horizon,
    catalog: Arc<Catalog>,
    placements: Vec<Placement>,
    index: ConflictIndex,
}

impl TimetableStore {
    pub fn new(horizon: Horizon, catalog: Arc<Catalog>) -> Self {
        Self {
            horizon,
            catalog,
            placements: Vec::new(),
            index: ConflictIndex::default(),
        }
    }

    /// Rebuilds a store from a published timetable, recomputing all flags.
    pub fn from_timetable(catalog: Arc<Catalog>, timetable: Timetable) -> Result<Self, StoreError> {
        let mut seen = BTreeSet::new();
        for p in &timetable.placements {
            if catalog.session(&p.session_id).is_none() {
                return Err(StoreError::UnknownSession(p.session_id.clone()));
            }
            if catalog.room(&p.room_id).is_none() {
                return Err(StoreError::UnknownRoom(p.room_id.clone()));
            }
            if !seen.insert(p.session_id.clone()) {
                return Err(StoreError::AlreadyPlaced(p.session_id.clone()));
            }
        }
        let index = ConflictIndex::build(&catalog, &timetable.placements);
        let mut store = Self {
            horizon: timetable.horizon,
            catalog,
            placements: timetable.placements,
            index,
        };
        store.revalidate(0..store.placements.len());
        Ok(store)
    }

    pub fn horizon(&self) -> &Horizon {
        &self.horizon
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    pub fn get(&self, session_id: &SessionId) -> Option<&Placement> {
        self.index
            .position(session_id)
            .map(|pos| &self.placements[pos])
    }

    /// Indexed equivalent of [`crate::conflict::check`] over this store.
    pub fn check(&self, candidate: &Placement) -> ConflictReport {
        let session = self.catalog.session(&candidate.session_id);
        let mut reasons = BTreeSet::new();
        let mut with = BTreeSet::new();
        for pos in self.index.neighbours(&self.catalog, candidate) {
            let other = &self.placements[pos];
            let kinds = pair_conflicts(
                candidate,
                session,
                other,
                self.catalog.session(&other.session_id),
            );
            if !kinds.is_empty() {
                reasons.extend(kinds);
                with.insert(other.session_id.clone());
            }
        }
        ConflictReport::from_parts(reasons, with)
    }

    pub fn is_overloaded(&self, placement: &Placement) -> bool {
        is_room_overloaded(&self.catalog, placement)
    }

    /// Commits a placement and flags every placement it clashes with.
    pub fn commit(&mut self, mut placement: Placement) -> Result<ConflictReport, StoreError> {
        self.known(&placement.session_id, &placement.room_id)?;
        if self.index.position(&placement.session_id).is_some() {
            return Err(StoreError::AlreadyPlaced(placement.session_id));
        }

        let report = if placement.cancelled {
            ConflictReport::default()
        } else {
            self.check(&placement)
        };
        let overloaded = self.is_overloaded(&placement);
        placement.apply(&report, overloaded);

        let pos = self.placements.len();
        self.index.insert(&self.catalog, pos, &placement);
        self.placements.push(placement);

        let partners: Vec<usize> = report
            .conflicts_with
            .iter()
            .filter_map(|id| self.index.position(id))
            .collect();
        self.revalidate(partners);
        Ok(report)
    }

    /// Moves a placement to another room and/or interval and marks it
    /// as modified.
    pub fn edit(
        &mut self,
        session_id: &SessionId,
        room_id: RoomId,
        interval: TimeInterval,
    ) -> Result<ConflictReport, StoreError> {
        self.known(session_id, &room_id)?;
        let pos = self.position(session_id)?;
        let old = self.placements[pos].clone();

        self.index.remove(&self.catalog, pos, &old);
        self.placements[pos].room_id = room_id;
        self.placements[pos].interval = interval;
        self.placements[pos].is_modified = true;
        self.index.insert(&self.catalog, pos, &self.placements[pos]);

        let mut affected = self.overlapping(&[old.interval, interval]);
        affected.insert(pos);
        debug!(session = %session_id, affected = affected.len(), "placement edited");
        self.revalidate(affected);
        Ok(self.report_at(pos))
    }

    pub fn remove(&mut self, session_id: &SessionId) -> Result<Placement, StoreError> {
        let pos = self.position(session_id)?;
        let removed = self.placements.remove(pos);
        self.index = ConflictIndex::build(&self.catalog, &self.placements);

        let affected = self.overlapping(&[removed.interval]);
        debug!(session = %session_id, affected = affected.len(), "placement removed");
        self.revalidate(affected);
        Ok(removed)
    }

    /// A cancelled placement stays in the timetable but holds no resource.
    pub fn set_cancelled(&mut self, session_id: &SessionId, cancelled: bool) -> Result<(), StoreError> {
        let pos = self.position(session_id)?;
        let old = self.placements[pos].clone();
        if old.cancelled == cancelled {
            return Ok(());
        }
        self.index.remove(&self.catalog, pos, &old);
        self.placements[pos].cancelled = cancelled;
        self.index.insert(&self.catalog, pos, &self.placements[pos]);

        let mut affected = self.overlapping(&[old.interval]);
        affected.insert(pos);
        self.revalidate(affected);
        Ok(())
    }

    pub fn snapshot(&self) -> Timetable {
        Timetable {
            horizon: self.horizon.clone(),
            placements: self.placements.clone(),
        }
    }

    pub fn into_timetable(self) -> Timetable {
        Timetable {
            horizon: self.horizon,
            placements: self.placements,
        }
    }

    fn known(&self, session_id: &SessionId, room_id: &RoomId) -> Result<(), StoreError> {
        if self.catalog.session(session_id).is_none() {
            return Err(StoreError::UnknownSession(session_id.clone()));
        }
        if self.catalog.room(room_id).is_none() {
            return Err(StoreError::UnknownRoom(room_id.clone()));
        }
        Ok(())
    }

    fn position(&self, session_id: &SessionId) -> Result<usize, StoreError> {
        self.index
            .position(session_id)
            .ok_or_else(|| StoreError::NotPlaced(session_id.clone()))
    }

    fn overlapping(&self, intervals: &[TimeInterval]) -> BTreeSet<usize> {
        self.placements
            .iter()
            .enumerate()
            .filter(|(_, p)| intervals.iter().any(|iv| iv.overlaps(&p.interval)))
            .map(|(i, _)| i)
            .collect()
    }

    fn report_at(&self, pos: usize) -> ConflictReport {
        let p = &self.placements[pos];
        if p.cancelled {
            ConflictReport::default()
        } else {
            self.check(p)
        }
    }

    fn revalidate(&mut self, positions: impl IntoIterator<Item = usize>) {
        for pos in positions {
            let report = self.report_at(pos);
            let overloaded = self.is_overloaded(&self.placements[pos]);
            self.placements[pos].apply(&report, overloaded);
        }
    }
}
