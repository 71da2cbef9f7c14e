use std::collections::HashMap;
use types::{Room, RoomId, Session, SessionId};

/// Sessions and rooms of one run, addressed by stable identifier.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    sessions: Vec<Session>,
    rooms: Vec<Room>,
    session_pos: HashMap<SessionId, usize>,
    room_pos: HashMap<RoomId, usize>,
}

impl Catalog {
    pub fn new(sessions: Vec<Session>, rooms: Vec<Room>) -> Self {
        let session_pos = sessions
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();
        let room_pos = rooms
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();
        Self {
            sessions,
            rooms,
            session_pos,
            room_pos,
        }
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn session(&self, id: &SessionId) -> Option<&Session> {
        self.session_pos.get(id).map(|&i| &self.sessions[i])
    }

    pub fn room(&self, id: &RoomId) -> Option<&Room> {
        self.room_pos.get(id).map(|&i| &self.rooms[i])
    }
}

/// Rooms a session may be placed in, or why there are none.
#[derive(Debug, PartialEq)]
pub enum Capability<'a> {
    Rooms(Vec<&'a Room>),
    NoRoomCatalog,
    NoCapableRoom,
}

pub fn room_fits(room: &Room, session: &Session) -> bool {
    if !room.is_in_service() {
        return false;
    }
    if let Some(campus) = &session.campus {
        if room.campus.as_ref() != Some(campus) {
            return false;
        }
    }
    if room.kind.is_some_and(|k| !k.hosts(session.kind)) {
        return false;
    }
    if room.capacity < session.demand() {
        return false;
    }
    session.needs.iter().all(|need| room.equip.contains(need))
}

/// Resolves the rooms a session can use, sorted by room id.
///
/// A pinned room overrides the capability filter; it only has to exist and
/// be in service.
pub fn capable_rooms<'a>(session: &Session, rooms: &'a [Room]) -> Capability<'a> {
    if let Some(pinned) = &session.pin.room_id {
        return match rooms.iter().find(|r| &r.id == pinned) {
            Some(r) if r.is_in_service() => Capability::Rooms(vec![r]),
            _ => Capability::NoCapableRoom,
        };
    }

    if let Some(campus) = &session.campus {
        if !rooms.iter().any(|r| r.campus.as_ref() == Some(campus)) {
            return Capability::NoRoomCatalog;
        }
    }

    let mut ok: Vec<&Room> = rooms.iter().filter(|r| room_fits(r, session)).collect();
    if ok.is_empty() {
        return Capability::NoCapableRoom;
    }
    ok.sort_by(|a, b| a.id.cmp(&b.id));
    Capability::Rooms(ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{Equip, RoomKind, RoomStatus, SessionKind};

    fn rooms() -> Vec<Room> {
        let mut lab = Room::new("B-lab", 24);
        lab.equip = vec![Equip::Computers, Equip::Projector];
        lab.campus = Some("north".into());
        let mut amphi = Room::new("A-amphi", 200);
        amphi.equip = vec![Equip::Projector];
        amphi.campus = Some("north".into());
        let mut closed = Room::new("C-closed", 300);
        closed.status = RoomStatus::Maintenance;
        vec![lab, amphi, closed]
    }

    #[test]
    fn filters_by_equipment_and_capacity() {
        let rooms = rooms();
        let mut s = Session::new("s1", "c1", 90);
        s.needs = vec![Equip::Computers];
        s.required_capacity = 20;
        let Capability::Rooms(ok) = capable_rooms(&s, &rooms) else {
            panic!("expected rooms");
        };
        assert_eq!(ok.len(), 1);
        assert_eq!(ok[0].id.0, "B-lab");

        s.required_capacity = 30;
        assert_eq!(capable_rooms(&s, &rooms), Capability::NoCapableRoom);
    }

    #[test]
    fn sorted_by_room_id_and_skips_rooms_out_of_service() {
        let rooms = rooms();
        let s = Session::new("s1", "c1", 90);
        let Capability::Rooms(ok) = capable_rooms(&s, &rooms) else {
            panic!("expected rooms");
        };
        let ids: Vec<_> = ok.iter().map(|r| r.id.0.as_str()).collect();
        assert_eq!(ids, vec!["A-amphi", "B-lab"]);
    }

    #[test]
    fn unknown_campus_has_no_catalog() {
        let rooms = rooms();
        let mut s = Session::new("s1", "c1", 90);
        s.campus = Some("south".into());
        assert_eq!(capable_rooms(&s, &rooms), Capability::NoRoomCatalog);
    }

    #[test]
    fn pinned_room_bypasses_capacity() {
        let rooms = rooms();
        let mut s = Session::new("s1", "c1", 90);
        s.required_capacity = 100;
        s.pin.room_id = Some(RoomId::from("B-lab"));
        let Capability::Rooms(ok) = capable_rooms(&s, &rooms) else {
            panic!("expected rooms");
        };
        assert_eq!(ok[0].id.0, "B-lab");

        s.pin.room_id = Some(RoomId::from("C-closed"));
        assert_eq!(capable_rooms(&s, &rooms), Capability::NoCapableRoom);
    }

    #[test]
    fn room_kind_must_host_the_session() {
        let mut rooms = rooms();
        rooms[0].kind = Some(RoomKind::Labo);
        rooms[1].kind = Some(RoomKind::Amphi);
        let mut s = Session::new("s1", "c1", 90);
        s.kind = SessionKind::Lab;
        let Capability::Rooms(ok) = capable_rooms(&s, &rooms) else {
            panic!("expected rooms");
        };
        assert_eq!(ok.len(), 1);
        assert_eq!(ok[0].id.0, "B-lab");

        s.kind = SessionKind::Tutorial;
        assert_eq!(capable_rooms(&s, &rooms), Capability::NoCapableRoom);
    }

    #[test]
    fn lookup_by_id() {
        let cat = Catalog::new(vec![Session::new("s1", "c1", 60)], rooms());
        assert!(cat.session(&SessionId::from("s1")).is_some());
        assert!(cat.session(&SessionId::from("nope")).is_none());
        assert_eq!(cat.room(&RoomId::from("A-amphi")).map(|r| r.capacity), Some(200));
    }
}
