use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const STATE_VERSION: u64 = 1;

/// Durable snapshot, persisted as a single pretty-printed JSON document.
/// Field names are camelCase on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorState {
    pub version: u64,
    #[serde(default)]
    pub workspace: WorkspaceState,
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectState>,
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskState>,
    #[serde(default)]
    pub event_index: BTreeMap<String, String>,
}

impl Default for OrchestratorState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            workspace: WorkspaceState::default(),
            projects: BTreeMap::new(),
            tasks: BTreeMap::new(),
            event_index: BTreeMap::new(),
        }
    }
}

impl OrchestratorState {
    pub fn event_key(room_id: &str, event_id: &str) -> String {
        format!("{room_id}:{event_id}")
    }

    pub fn has_processed_event(&self, room_id: &str, event_id: &str) -> bool {
        self.event_index
            .contains_key(&Self::event_key(room_id, event_id))
    }

    pub fn mark_event_processed(&mut self, room_id: &str, event_id: &str, marker: &str) {
        self.event_index
            .insert(Self::event_key(room_id, event_id), marker.to_string());
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceState {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectState {
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_space_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lobby_room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lobby_room_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spark: Option<SparkShape>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SparkShape {
    pub project: String,
    pub base: String,
    pub main_sandbox: String,
    pub work_volume: String,
    pub work_mount_path: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Waiting,
    Active,
    NeedsInput,
    Completed,
    Error,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::NeedsInput => "needs_input",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BridgeHandle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskState {
    pub id: String,
    pub project_key: String,
    pub lobby_room_id: String,
    pub lobby_event_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_room_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_name: Option<String>,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    #[serde(default)]
    pub bridge: BridgeHandle,
    pub initial_prompt: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}
