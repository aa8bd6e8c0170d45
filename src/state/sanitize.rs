use super::records::{OrchestratorState, ProjectState, TaskState, WorkspaceState, STATE_VERSION};
use serde_json::Value;
use std::collections::BTreeMap;

/// Rebuilds a state snapshot from untrusted JSON. Unknown keys are dropped,
/// records that fail to decode are discarded, and anything unusable yields
/// the empty default. Idempotent: sanitizing a sanitized snapshot is a no-op.
pub fn sanitize_state(raw: Value) -> OrchestratorState {
    let Value::Object(mut root) = raw else {
        return OrchestratorState::default();
    };

    let version = root
        .get("version")
        .and_then(Value::as_u64)
        .unwrap_or(STATE_VERSION);

    let workspace = root
        .remove("workspace")
        .and_then(|v| serde_json::from_value::<WorkspaceState>(v).ok())
        .unwrap_or_default();

    let mut projects = BTreeMap::new();
    if let Some(Value::Object(entries)) = root.remove("projects") {
        for (key, value) in entries {
            if let Ok(project) = serde_json::from_value::<ProjectState>(value) {
                projects.insert(key, project);
            }
        }
    }

    let mut tasks = BTreeMap::new();
    if let Some(Value::Object(entries)) = root.remove("tasks") {
        for (key, value) in entries {
            if let Ok(task) = serde_json::from_value::<TaskState>(value) {
                tasks.insert(key, task);
            }
        }
    }

    let mut event_index = BTreeMap::new();
    if let Some(Value::Object(entries)) = root.remove("eventIndex") {
        for (key, value) in entries {
            if let Value::String(marker) = value {
                event_index.insert(key, marker);
            }
        }
    }

    OrchestratorState {
        version,
        workspace,
        projects,
        tasks,
        event_index,
    }
}
