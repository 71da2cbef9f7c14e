//! JSON schemas of the types exchanged with the administrative layer.

use schemars::schema::RootSchema;
use schemars::schema_for;
use std::collections::BTreeMap;

use crate::{AllocatorConfig, ConflictReport, GenerateRequest, Generated, Placement, Timetable};

pub fn boundary_schemas() -> BTreeMap<&'static str, RootSchema> {
    let mut out = BTreeMap::new();
    out.insert("GenerateRequest", schema_for!(GenerateRequest));
    out.insert("Generated", schema_for!(Generated));
    out.insert("Timetable", schema_for!(Timetable));
    out.insert("Placement", schema_for!(Placement));
    out.insert("ConflictReport", schema_for!(ConflictReport));
    out.insert("AllocatorConfig", schema_for!(AllocatorConfig));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement_schema_exposes_flags() {
        let schemas = boundary_schemas();
        let placement = serde_json::to_value(&schemas["Placement"]).unwrap();
        let props = &placement["properties"];
        assert!(props.get("hasConflict").is_some());
        assert!(props.get("isRoomOverloaded").is_some());
        assert!(props.get("sessionId").is_some());
    }

    #[test]
    fn covers_request_and_result() {
        let schemas = boundary_schemas();
        assert!(schemas.contains_key("GenerateRequest"));
        assert!(schemas.contains_key("Generated"));
    }
}
