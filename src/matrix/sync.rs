use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncResponse {
    pub next_batch: String,
    #[serde(default)]
    pub rooms: SyncRooms,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncRooms {
    #[serde(default)]
    pub join: BTreeMap<String, JoinedRoomSync>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinedRoomSync {
    #[serde(default)]
    pub timeline: SyncTimeline,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncTimeline {
    #[serde(default)]
    pub events: Vec<TimelineEvent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimelineEvent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub origin_server_ts: Option<i64>,
    #[serde(default)]
    pub content: Value,
}

impl TimelineEvent {
    pub fn body(&self) -> Option<&str> {
        self.content.get("body").and_then(Value::as_str)
    }
}

impl SyncResponse {
    pub fn timeline_events(&self, room_id: &str) -> &[TimelineEvent] {
        self.rooms
            .join
            .get(room_id)
            .map(|room| room.timeline.events.as_slice())
            .unwrap_or(&[])
    }
}
