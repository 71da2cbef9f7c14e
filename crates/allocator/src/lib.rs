mod config;
mod grid;

pub use config::{config_from_env, overlay};
pub use grid::{candidate_intervals, grid_days};

use async_trait::async_trait;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use sched_core::summary::{summary_line, tally};
use sched_core::{
    capable_rooms, validate, validate_grid, Allocator, Capability, Catalog, GenerateError,
    TimetableStore,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use types::{
    AllocatorConfig, ConflictReport, GenerateRequest, Generated, Placement, Room, Session,
    SlotGrid, UnplacedReason, UnplacedSession,
};

/// Greedy slot-grid allocator.
///
/// Sessions are taken by priority, then catalog order. Each one goes to the
/// earliest clean (interval, room) candidate, rooms ordered by id; when none
/// is clean the least-conflicting candidate is committed with its flags set.
pub struct SlotAllocator {
    config: AllocatorConfig,
    pool: Option<ThreadPool>,
}

impl Default for SlotAllocator {
    fn default() -> Self {
        Self {
            config: AllocatorConfig::default(),
            pool: None,
        }
    }
}

enum Proposal {
    Commit(Placement),
    Conflicted(Placement, ConflictReport),
    Rejected(UnplacedReason, String),
}

impl SlotAllocator {
    pub fn new(config: AllocatorConfig) -> Result<Self, ThreadPoolBuildError> {
        let pool = match config.threads {
            Some(n) if n > 1 => Some(
                ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("slot-eval-{i}"))
                    .build()?,
            ),
            _ => None,
        };
        Ok(Self { config, pool })
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Builds a complete timetable for the request's horizon.
    ///
    /// Only structural problems and cancellation fail the run; everything
    /// else ends up in the result.
    pub fn run(
        &self,
        request: &GenerateRequest,
        cancel: &CancellationToken,
    ) -> Result<Generated, GenerateError> {
        validate(
            &request.sessions,
            &request.rooms,
            self.config.strict_capabilities,
        )?;
        validate_grid(&request.grid)?;

        let catalog = Arc::new(Catalog::new(
            request.sessions.clone(),
            request.rooms.clone(),
        ));
        let mut store = TimetableStore::new(request.horizon.clone(), catalog.clone());
        info!(
            horizon = %request.horizon,
            sessions = catalog.sessions().len(),
            rooms = catalog.rooms().len(),
            "generation started"
        );

        let mut order: Vec<&Session> = catalog.sessions().iter().collect();
        order.sort_by_key(|s| s.priority);

        let mut placed_with_conflict = Vec::new();
        let mut unplaced = Vec::new();
        let mut candidates_seen = 0usize;

        for session in order {
            if cancel.is_cancelled() {
                info!(horizon = %request.horizon, "generation cancelled");
                return Err(GenerateError::Cancelled);
            }

            match self.propose(&store, session, catalog.rooms(), &request.grid, &mut candidates_seen) {
                Proposal::Commit(p) => {
                    debug!(session = %session.id, room = %p.room_id, interval = %p.interval, "committed");
                    store.commit(p)?;
                }
                Proposal::Conflicted(p, report) => {
                    let kinds = report
                        .reasons
                        .iter()
                        .map(|k| k.to_string())
                        .collect::<Vec<_>>()
                        .join(", ");
                    if self.config.allow_conflicting_fallback {
                        warn!(session = %session.id, room = %p.room_id, interval = %p.interval, %kinds, "committed with conflict");
                        store.commit(p)?;
                        placed_with_conflict.push(session.id.clone());
                    } else {
                        warn!(session = %session.id, %kinds, "rejected: no conflict-free slot");
                        unplaced.push(UnplacedSession {
                            session_id: session.id.clone(),
                            reason: UnplacedReason::ExhaustedSlotGrid,
                            detail: format!("every candidate slot clashes ({kinds})"),
                        });
                    }
                }
                Proposal::Rejected(reason, detail) => {
                    warn!(session = %session.id, %reason, %detail, "rejected");
                    unplaced.push(UnplacedSession {
                        session_id: session.id.clone(),
                        reason,
                        detail,
                    });
                }
            }
        }

        let timetable = store.into_timetable();
        let t = tally(&timetable, &unplaced);
        let stats = serde_json::json!({
            "method": "slot-grid",
            "sessions": catalog.sessions().len(),
            "rooms": catalog.rooms().len(),
            "candidates": candidates_seen,
            "tally": t,
        });
        let generated = Generated {
            timetable,
            placed_with_conflict,
            unplaced,
            stats,
        };
        info!(summary = %summary_line(&generated), "generation finished");
        Ok(generated)
    }

    fn propose(
        &self,
        store: &TimetableStore,
        session: &Session,
        rooms: &[Room],
        grid: &SlotGrid,
        candidates_seen: &mut usize,
    ) -> Proposal {
        let capable = match capable_rooms(session, rooms) {
            Capability::Rooms(r) => r,
            Capability::NoRoomCatalog => {
                return Proposal::Rejected(
                    UnplacedReason::NoRoomCatalog,
                    format!(
                        "campus {} has no rooms",
                        session.campus.as_deref().unwrap_or("?")
                    ),
                )
            }
            Capability::NoCapableRoom => {
                return Proposal::Rejected(
                    UnplacedReason::NoCapableRoom,
                    format!(
                        "no room seats {} with {:?}",
                        session.demand(),
                        session.needs
                    ),
                )
            }
        };

        // A pinned interval is an operator decision and skips the windows.
        let intervals = match &session.pin.interval {
            Some(iv) => vec![*iv],
            None => candidate_intervals(grid, session.duration())
                .into_iter()
                .filter(|iv| session.admits(iv))
                .collect(),
        };
        let candidates: Vec<Placement> = intervals
            .iter()
            .flat_map(|iv| {
                capable
                    .iter()
                    .filter(move |r| !r.is_unavailable_during(iv))
                    .map(move |r| Placement::candidate(session.id.clone(), r.id.clone(), *iv))
            })
            .collect();
        *candidates_seen += candidates.len();

        if candidates.is_empty() {
            return Proposal::Rejected(
                UnplacedReason::ExhaustedSlotGrid,
                format!(
                    "no {}-minute slot of the grid is open in a capable room",
                    session.duration_minutes
                ),
            );
        }

        match self.choose(store, &candidates) {
            Some((i, report)) if !report.has_conflict => Proposal::Commit(candidates[i].clone()),
            Some((i, report)) => Proposal::Conflicted(candidates[i].clone(), report),
            None => Proposal::Rejected(
                UnplacedReason::ExhaustedSlotGrid,
                "no candidate slot".to_string(),
            ),
        }
    }

    /// Leftmost candidate with no conflict and no overload; failing that,
    /// the one with the fewest conflict kinds, earliest first.
    ///
    /// Each candidate is checked at most once. Below the parallel threshold
    /// the scan stops at the first clean candidate.
    fn choose(
        &self,
        store: &TimetableStore,
        candidates: &[Placement],
    ) -> Option<(usize, ConflictReport)> {
        let score = |c: &Placement| (store.check(c), store.is_overloaded(c));
        let scored: Vec<(ConflictReport, bool)> =
            if candidates.len() < self.config.parallel_threshold {
                let mut scored = Vec::with_capacity(candidates.len());
                for c in candidates {
                    let s = score(c);
                    let clean = is_clean(&s);
                    scored.push(s);
                    if clean {
                        break;
                    }
                }
                scored
            } else {
                let run = || -> Vec<(ConflictReport, bool)> {
                    candidates.par_iter().map(&score).collect()
                };
                match &self.pool {
                    Some(pool) => pool.install(run),
                    None => run(),
                }
            };

        let pick = scored.iter().position(is_clean).or_else(|| {
            scored
                .iter()
                .enumerate()
                .min_by_key(|(i, (report, _))| (report.reasons.len(), *i))
                .map(|(i, _)| i)
        })?;
        scored.into_iter().nth(pick).map(|(report, _)| (pick, report))
    }
}

fn is_clean((report, overloaded): &(ConflictReport, bool)) -> bool {
    !report.has_conflict && !overloaded
}

#[async_trait]
impl Allocator for SlotAllocator {
    async fn generate(
        &self,
        request: GenerateRequest,
        cancel: CancellationToken,
    ) -> Result<Generated, GenerateError> {
        self.run(&request, &cancel)
    }
}
