use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use types::{Placement, RoomId, SessionId, StudentId, TeacherId};

use crate::catalog::Catalog;

/// Positions of committed placements keyed by the resources they hold.
///
/// Cancelled placements are reachable by session id only.
#[derive(Clone, Debug, Default)]
pub struct ConflictIndex {
    by_session: HashMap<SessionId, usize>,
    by_room: HashMap<RoomId, Vec<usize>>,
    by_teacher: HashMap<TeacherId, Vec<usize>>,
    by_student: HashMap<StudentId, Vec<usize>>,
}

fn push<K: Hash + Eq + Clone>(map: &mut HashMap<K, Vec<usize>>, key: &K, pos: usize) {
    map.entry(key.clone()).or_default().push(pos);
}

fn drop_pos<K: Hash + Eq>(map: &mut HashMap<K, Vec<usize>>, key: &K, pos: usize) {
    if let Some(v) = map.get_mut(key) {
        v.retain(|&p| p != pos);
        if v.is_empty() {
            map.remove(key);
        }
    }
}

impl ConflictIndex {
    pub fn build(catalog: &Catalog, placements: &[Placement]) -> Self {
        let mut idx = Self::default();
        for (pos, p) in placements.iter().enumerate() {
            idx.insert(catalog, pos, p);
        }
        idx
    }

    pub fn insert(&mut self, catalog: &Catalog, pos: usize, p: &Placement) {
        self.by_session.insert(p.session_id.clone(), pos);
        if p.cancelled {
            return;
        }
        push(&mut self.by_room, &p.room_id, pos);
        if let Some(s) = catalog.session(&p.session_id) {
            if let Some(t) = &s.teacher_id {
                push(&mut self.by_teacher, t, pos);
            }
            for st in &s.students {
                push(&mut self.by_student, st, pos);
            }
        }
    }

    pub fn remove(&mut self, catalog: &Catalog, pos: usize, p: &Placement) {
        self.by_session.remove(&p.session_id);
        drop_pos(&mut self.by_room, &p.room_id, pos);
        if let Some(s) = catalog.session(&p.session_id) {
            if let Some(t) = &s.teacher_id {
                drop_pos(&mut self.by_teacher, t, pos);
            }
            for st in &s.students {
                drop_pos(&mut self.by_student, st, pos);
            }
        }
    }

    pub fn position(&self, session_id: &SessionId) -> Option<usize> {
        self.by_session.get(session_id).copied()
    }

    /// Positions sharing a room, teacher or student with `p`, regardless of time.
    pub fn neighbours(&self, catalog: &Catalog, p: &Placement) -> BTreeSet<usize> {
        let mut out = BTreeSet::new();
        if let Some(v) = self.by_room.get(&p.room_id) {
            out.extend(v.iter().copied());
        }
        if let Some(s) = catalog.session(&p.session_id) {
            if let Some(v) = s.teacher_id.as_ref().and_then(|t| self.by_teacher.get(t)) {
                out.extend(v.iter().copied());
            }
            for st in &s.students {
                if let Some(v) = self.by_student.get(st) {
                    out.extend(v.iter().copied());
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use types::{Room, Session, TimeInterval};

    fn iv(h0: u32, h1: u32) -> TimeInterval {
        let d = NaiveDate::from_ymd_opt(2025, 9, 15).unwrap();
        TimeInterval::new(
            d.and_hms_opt(h0, 0, 0).unwrap(),
            d.and_hms_opt(h1, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn neighbours_follow_shared_keys() {
        let mut a = Session::new("a", "c", 60);
        a.teacher_id = Some(TeacherId::from("t1"));
        let mut b = Session::new("b", "c", 60);
        b.teacher_id = Some(TeacherId::from("t1"));
        let mut c = Session::new("c", "c", 60);
        c.students = [StudentId::from("x")].into_iter().collect();
        let cat = Catalog::new(vec![a, b, c], vec![Room::new("r1", 10), Room::new("r2", 10)]);

        let placements = vec![
            Placement::candidate("a".into(), "r1".into(), iv(8, 9)),
            Placement::candidate("c".into(), "r2".into(), iv(8, 9)),
        ];
        let idx = ConflictIndex::build(&cat, &placements);

        let query = Placement::candidate("b".into(), "r2".into(), iv(14, 15));
        let n: Vec<_> = idx.neighbours(&cat, &query).into_iter().collect();
        assert_eq!(n, vec![0, 1]);
        assert_eq!(idx.position(&SessionId::from("c")), Some(1));
    }

    #[test]
    fn removal_and_cancellation_drop_keys() {
        let cat = Catalog::new(vec![Session::new("a", "c", 60)], vec![Room::new("r1", 10)]);
        let mut p = Placement::candidate("a".into(), "r1".into(), iv(8, 9));
        let mut idx = ConflictIndex::default();
        idx.insert(&cat, 0, &p);
        idx.remove(&cat, 0, &p);
        assert!(idx.position(&p.session_id).is_none());
        assert!(idx.by_room.is_empty());

        p.cancelled = true;
        idx.insert(&cat, 0, &p);
        assert_eq!(idx.position(&p.session_id), Some(0));
        assert!(idx.by_room.is_empty());
    }
}
