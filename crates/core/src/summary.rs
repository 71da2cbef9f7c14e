use serde::Serialize;
use std::collections::BTreeMap;
use types::{ConflictKind, Generated, Timetable, UnplacedReason, UnplacedSession};

#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    pub placements: usize,
    pub with_conflict: usize,
    pub overloaded: usize,
    pub cancelled: usize,
    pub modified: usize,
    pub by_kind: BTreeMap<ConflictKind, usize>,
    pub unplaced: usize,
    pub unplaced_by_reason: BTreeMap<UnplacedReason, usize>,
}

pub fn tally(timetable: &Timetable, unplaced: &[UnplacedSession]) -> Tally {
    let mut t = Tally {
        placements: timetable.placements.len(),
        unplaced: unplaced.len(),
        ..Tally::default()
    };
    for p in &timetable.placements {
        if p.cancelled {
            t.cancelled += 1;
        }
        if p.is_modified {
            t.modified += 1;
        }
        if p.has_conflict {
            t.with_conflict += 1;
        }
        if p.is_room_overloaded {
            t.overloaded += 1;
        }
        for k in &p.reasons {
            *t.by_kind.entry(*k).or_default() += 1;
        }
    }
    for u in unplaced {
        *t.unplaced_by_reason.entry(u.reason).or_default() += 1;
    }
    t
}

/// One-line outcome of a run, e.g. for an operator notice.
pub fn summary_line(generated: &Generated) -> String {
    let t = tally(&generated.timetable, &generated.unplaced);
    format!(
        "{}: generated {} placements ({} with conflicts, {} overloaded), {} unplaced",
        generated.timetable.horizon, t.placements, t.with_conflict, t.overloaded, t.unplaced
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use types::{Horizon, Placement, TimeInterval};

    fn generated() -> Generated {
        let d = NaiveDate::from_ymd_opt(2025, 9, 15).unwrap();
        let iv = TimeInterval::new(
            d.and_hms_opt(8, 0, 0).unwrap(),
            d.and_hms_opt(10, 0, 0).unwrap(),
        )
        .unwrap();
        let mut clash = Placement::candidate("s2".into(), "r1".into(), iv);
        clash.has_conflict = true;
        clash.reasons = vec![ConflictKind::Room, ConflictKind::Teacher];
        let mut big = Placement::candidate("s3".into(), "r2".into(), iv);
        big.is_room_overloaded = true;
        big.is_modified = true;
        Generated {
            timetable: Timetable {
                horizon: Horizon::new("2025-2026", "S1"),
                placements: vec![Placement::candidate("s1".into(), "r3".into(), iv), clash, big],
            },
            placed_with_conflict: vec!["s2".into()],
            unplaced: vec![UnplacedSession {
                session_id: "s4".into(),
                reason: UnplacedReason::NoCapableRoom,
                detail: "needs computers".into(),
            }],
            stats: serde_json::json!({}),
        }
    }

    #[test]
    fn summary_reads_as_one_line() {
        insta::assert_snapshot!(
            summary_line(&generated()),
            @"2025-2026/S1: generated 3 placements (1 with conflicts, 1 overloaded), 1 unplaced"
        );
    }

    #[test]
    fn tally_counts_kinds_and_reasons() {
        let g = generated();
        let t = tally(&g.timetable, &g.unplaced);
        assert_eq!(t.by_kind.get(&ConflictKind::Room), Some(&1));
        assert_eq!(t.by_kind.get(&ConflictKind::Teacher), Some(&1));
        assert_eq!(t.unplaced_by_reason.get(&UnplacedReason::NoCapableRoom), Some(&1));
        assert_eq!(t.modified, 1);

        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["byKind"]["TeacherConflict"], 1);
        assert_eq!(v["unplacedByReason"]["NoCapableRoom"], 1);
    }
}
