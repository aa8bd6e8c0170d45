use matrix_orchestrator::state::{
    sanitize_state, BridgeHandle, OrchestratorState, ProjectState, SparkShape, StateStore,
    TaskState, TaskStatus,
};
use std::fs;

fn populated_state() -> OrchestratorState {
    let mut state = OrchestratorState::default();
    state.workspace.name = "Engineering".to_string();
    state.workspace.space_id = Some("!space1:hs".to_string());
    state.projects.insert(
        "rc".to_string(),
        ProjectState {
            display_name: "Rate Cards".to_string(),
            project_space_id: Some("!space2:hs".to_string()),
            lobby_room_id: Some("!lobby:hs".to_string()),
            lobby_room_name: Some("rc-lobby".to_string()),
            spark: Some(SparkShape {
                project: "ratecards".to_string(),
                base: "dev-base".to_string(),
                main_sandbox: "rc-main".to_string(),
                work_volume: "rc-work".to_string(),
                work_mount_path: "/work".to_string(),
            }),
            updated_at: Some("2024-03-07T14:30:05Z".to_string()),
        },
    );
    state.tasks.insert(
        "rc-20240307143005-abc123".to_string(),
        TaskState {
            id: "rc-20240307143005-abc123".to_string(),
            project_key: "rc".to_string(),
            lobby_room_id: "!lobby:hs".to_string(),
            lobby_event_id: "$evt1".to_string(),
            task_room_id: Some("!task:hs".to_string()),
            task_room_name: Some("rc-task-implement-oauth-abc123".to_string()),
            sandbox_project: Some("ratecards".to_string()),
            sandbox_name: Some("task-20240307143005-implement-oauth-abc123".to_string()),
            status: TaskStatus::Active,
            status_reason: None,
            bridge: BridgeHandle {
                pid: Some(4242),
                process_id: Some("proc-1".to_string()),
                raw_output: Some("pid=4242".to_string()),
            },
            initial_prompt: "implement oauth".to_string(),
            created_at: "2024-03-07T14:30:05Z".to_string(),
            updated_at: "2024-03-07T14:30:06Z".to_string(),
        },
    );
    state.mark_event_processed("!lobby:hs", "$evt1", "rc-20240307143005-abc123");
    state.mark_event_processed("!lobby:hs", "$evt2", "failed-1709821805000");
    state
}

#[test]
fn save_then_load_equals_the_sanitized_original() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = StateStore::new(temp.path().join("state.json"));
    let state = populated_state();

    store.save(&state).expect("save");
    let loaded = store.load().expect("load");

    let sanitized = sanitize_state(serde_json::to_value(&state).expect("encode"));
    assert_eq!(loaded, sanitized);
    assert_eq!(loaded, state);
}

#[test]
fn sanitizer_is_idempotent_over_the_persisted_document() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = StateStore::new(temp.path().join("state.json"));
    store.save(&populated_state()).expect("save");

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(store.path()).expect("read")).expect("json");
    let once = sanitize_state(raw.clone());
    let twice = sanitize_state(serde_json::to_value(&once).expect("encode"));
    assert_eq!(once, twice);
}

#[test]
fn a_partially_garbage_file_loads_whatever_is_usable() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("state.json");
    fs::write(
        &path,
        r#"{
            "version": 1,
            "workspace": {"name": "Engineering", "spaceId": "!space1:hs"},
            "projects": {"rc": {"displayName": "Rate Cards"}, "junk": []},
            "tasks": {"broken": {"id": "broken"}},
            "eventIndex": {"!lobby:hs:$evt1": "rc-1"},
            "futureField": true
        }"#,
    )
    .expect("write");

    let loaded = StateStore::new(&path).load().expect("load");
    assert_eq!(loaded.workspace.space_id.as_deref(), Some("!space1:hs"));
    assert_eq!(loaded.projects.len(), 1);
    assert!(loaded.tasks.is_empty());
    assert_eq!(loaded.event_index.len(), 1);
}

#[test]
fn processed_event_queries_work_across_a_reload() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = StateStore::new(temp.path().join("state.json"));
    store.save(&populated_state()).expect("save");

    let loaded = store.load().expect("load");
    assert!(loaded.has_processed_event("!lobby:hs", "$evt1"));
    assert!(loaded.has_processed_event("!lobby:hs", "$evt2"));
    assert!(!loaded.has_processed_event("!lobby:hs", "$evt3"));
}
