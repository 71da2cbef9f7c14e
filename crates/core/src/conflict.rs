use std::collections::BTreeSet;
use types::{ConflictKind, ConflictReport, Placement, Session};

use crate::catalog::Catalog;

/// Resources two placements share while their intervals overlap.
///
/// Cancelled placements and a placement compared with itself (same session)
/// never clash.
pub fn pair_conflicts(
    a: &Placement,
    a_session: Option<&Session>,
    b: &Placement,
    b_session: Option<&Session>,
) -> BTreeSet<ConflictKind> {
    let mut kinds = BTreeSet::new();
    if a.cancelled || b.cancelled || a.session_id == b.session_id {
        return kinds;
    }
    if !a.interval.overlaps(&b.interval) {
        return kinds;
    }
    if a.room_id == b.room_id {
        kinds.insert(ConflictKind::Room);
    }
    if let (Some(sa), Some(sb)) = (a_session, b_session) {
        if let (Some(ta), Some(tb)) = (&sa.teacher_id, &sb.teacher_id) {
            if ta == tb {
                kinds.insert(ConflictKind::Teacher);
            }
        }
        if !sa.students.is_disjoint(&sb.students) {
            kinds.insert(ConflictKind::Student);
        }
    }
    kinds
}

/// Checks `candidate` against every committed placement by linear scan.
///
/// The result does not depend on the order of `committed`.
pub fn check(catalog: &Catalog, candidate: &Placement, committed: &[Placement]) -> ConflictReport {
    let session = catalog.session(&candidate.session_id);
    let mut reasons = BTreeSet::new();
    let mut with = BTreeSet::new();
    for other in committed {
        let kinds = pair_conflicts(
            candidate,
            session,
            other,
            catalog.session(&other.session_id),
        );
        if !kinds.is_empty() {
            reasons.extend(kinds);
            with.insert(other.session_id.clone());
        }
    }
    ConflictReport::from_parts(reasons, with)
}

/// True when the session needs more seats than the assigned room has.
pub fn is_room_overloaded(catalog: &Catalog, placement: &Placement) -> bool {
    match (
        catalog.session(&placement.session_id),
        catalog.room(&placement.room_id),
    ) {
        (Some(s), Some(r)) => s.demand() > r.capacity,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use types::{Room, RoomId, SessionId, StudentId, TeacherId, TimeInterval};

    fn iv(h0: u32, m0: u32, h1: u32, m1: u32) -> TimeInterval {
        let d = NaiveDate::from_ymd_opt(2025, 9, 15).unwrap();
        TimeInterval::new(
            d.and_hms_opt(h0, m0, 0).unwrap(),
            d.and_hms_opt(h1, m1, 0).unwrap(),
        )
        .unwrap()
    }

    fn place(s: &str, r: &str, interval: TimeInterval) -> Placement {
        Placement::candidate(SessionId::from(s), RoomId::from(r), interval)
    }

    fn catalog() -> Catalog {
        let mut s1 = Session::new("s1", "algebra", 90);
        s1.teacher_id = Some(TeacherId::from("t-ahmed"));
        s1.students = ["st1", "st2"].into_iter().map(StudentId::from).collect();
        s1.required_capacity = 40;
        let mut s2 = Session::new("s2", "physics", 60);
        s2.teacher_id = Some(TeacherId::from("t-ahmed"));
        let mut s3 = Session::new("s3", "chemistry", 60);
        s3.students = ["st2", "st9"].into_iter().map(StudentId::from).collect();
        let s4 = Session::new("s4", "history", 120);
        Catalog::new(
            vec![s1, s2, s3, s4],
            vec![Room::new("r30", 30), Room::new("r50", 50)],
        )
    }

    #[test]
    fn same_teacher_in_different_rooms() {
        let cat = catalog();
        let committed = vec![place("s1", "r50", iv(9, 0, 10, 30))];
        let report = check(&cat, &place("s2", "r30", iv(10, 0, 11, 0)), &committed);
        assert!(report.has_conflict);
        assert_eq!(report.reasons, vec![ConflictKind::Teacher]);
        assert_eq!(report.conflicts_with, vec![SessionId::from("s1")]);
    }

    #[test]
    fn shared_student_conflicts() {
        let cat = catalog();
        let committed = vec![place("s1", "r50", iv(9, 0, 10, 30))];
        let report = check(&cat, &place("s3", "r30", iv(10, 0, 11, 0)), &committed);
        assert_eq!(report.reasons, vec![ConflictKind::Student]);
    }

    #[test]
    fn same_room_conflicts_and_reasons_accumulate() {
        let cat = catalog();
        let committed = vec![
            place("s1", "r50", iv(9, 0, 10, 30)),
            place("s4", "r30", iv(8, 0, 12, 0)),
        ];
        let report = check(&cat, &place("s3", "r30", iv(10, 0, 11, 0)), &committed);
        assert_eq!(report.reasons, vec![ConflictKind::Room, ConflictKind::Student]);
        assert_eq!(
            report.conflicts_with,
            vec![SessionId::from("s1"), SessionId::from("s4")]
        );
    }

    #[test]
    fn disjoint_intervals_in_one_room_are_clean() {
        let cat = catalog();
        let committed = vec![place("s4", "r30", iv(8, 0, 10, 0))];
        let report = check(&cat, &place("s1", "r30", iv(10, 0, 12, 0)), &committed);
        assert!(!report.has_conflict);
        assert!(report.reasons.is_empty());
    }

    #[test]
    fn cancelled_and_self_are_ignored() {
        let cat = catalog();
        let mut cancelled = place("s4", "r30", iv(9, 0, 11, 0));
        cancelled.cancelled = true;
        let committed = vec![cancelled, place("s1", "r30", iv(9, 0, 10, 30))];
        let report = check(&cat, &place("s1", "r30", iv(9, 30, 11, 0)), &committed);
        assert_eq!(report, ConflictReport::default());
    }

    #[test]
    fn unknown_session_still_gets_room_check() {
        let cat = catalog();
        let committed = vec![place("s4", "r30", iv(9, 0, 11, 0))];
        let report = check(&cat, &place("ghost", "r30", iv(10, 0, 11, 0)), &committed);
        assert_eq!(report.reasons, vec![ConflictKind::Room]);
    }

    #[test]
    fn capacity_overload_ignores_time() {
        let cat = catalog();
        assert!(is_room_overloaded(&cat, &place("s1", "r30", iv(8, 0, 9, 30))));
        assert!(!is_room_overloaded(&cat, &place("s1", "r50", iv(8, 0, 9, 30))));
        assert!(!is_room_overloaded(&cat, &place("s2", "r30", iv(8, 0, 9, 0))));
    }
}
