use super::bridge_env::build_bridge_env;
use super::{Orchestrator, OrchestratorError};
use crate::matrix::{normalize_homeserver_url, ChatApi, TimelineEvent};
use crate::shared::ids::build_task_identifiers;
use crate::shared::{now_iso, now_millis, truncate_chars};
use crate::spark::{BridgeLaunchSpec, ForkSpec, SparkApi};
use crate::state::{BridgeHandle, OrchestratorState, TaskState, TaskStatus};
use chrono::Utc;

const PROMPT_NOTICE_MAX_CHARS: usize = 4_000;
const REASON_MAX_CHARS: usize = 500;

impl<C: ChatApi, S: SparkApi> Orchestrator<C, S> {
    /// Spawns one task for a qualifying lobby message: derive identifiers,
    /// commit the waiting record and event-index entry to disk, then create
    /// the task room, fork the sandbox, and launch the bridge. The early
    /// persist is the at-most-once guarantee: once the event is indexed, a
    /// retry can never double-create, whatever fails afterwards.
    pub(crate) fn spawn_task(
        &mut self,
        project_key: &str,
        room_id: &str,
        event: &TimelineEvent,
    ) -> Result<String, OrchestratorError> {
        let event_id = event
            .event_id
            .clone()
            .ok_or_else(|| OrchestratorError::Internal("lobby event without id".to_string()))?;
        let prompt = event.body().unwrap_or_default().trim().to_string();

        let project_cfg = self
            .config
            .projects
            .iter()
            .find(|p| p.key == project_key)
            .cloned()
            .ok_or_else(|| {
                OrchestratorError::Internal(format!("project `{project_key}` is not configured"))
            })?;
        let project_space_id = self
            .project_record(project_key)
            .and_then(|record| record.project_space_id.clone())
            .ok_or_else(|| {
                OrchestratorError::Internal(format!("project `{project_key}` has no space"))
            })?;

        let ids = build_task_identifiers(project_key, &prompt, &event_id, Utc::now());
        let created_at = now_iso();
        self.state.tasks.insert(
            ids.task_id.clone(),
            TaskState {
                id: ids.task_id.clone(),
                project_key: project_key.to_string(),
                lobby_room_id: room_id.to_string(),
                lobby_event_id: event_id.clone(),
                task_room_id: None,
                task_room_name: None,
                sandbox_project: None,
                sandbox_name: None,
                status: TaskStatus::Waiting,
                status_reason: None,
                bridge: BridgeHandle::default(),
                initial_prompt: prompt.clone(),
                created_at: created_at.clone(),
                updated_at: created_at,
            },
        );
        self.state
            .mark_event_processed(room_id, &event_id, &ids.task_id);
        self.store.save(&self.state)?;

        let room_name = format!("{}-{}", project_cfg.matrix.task_room_prefix, ids.room_label);
        let topic = format!("Task {} for {}", ids.task_id, project_cfg.display_name);
        let task_room_id = self.chat.create_room(
            &room_name,
            Some(&topic),
            &self.config.workspace.team_members,
        )?;
        if let Some(task) = self.state.tasks.get_mut(&ids.task_id) {
            task.task_room_id = Some(task_room_id.clone());
            task.task_room_name = Some(room_name);
            task.updated_at = now_iso();
        }
        self.chat
            .link_room_under_space(&project_space_id, &task_room_id)?;

        self.chat.send_notice(
            &task_room_id,
            &format!(
                "task: {}\nstatus: {}\nproject: {}\nlobby event: {}",
                ids.task_id,
                TaskStatus::Waiting.as_str(),
                project_key,
                event_id
            ),
        )?;
        self.chat
            .send_notice(&task_room_id, truncate_chars(&prompt, PROMPT_NOTICE_MAX_CHARS))?;

        let spark_cfg = &project_cfg.spark;
        self.spark.create_task_sandbox_fork(&ForkSpec {
            project: spark_cfg.project.clone(),
            task_sandbox: ids.sandbox_name.clone(),
            main_sandbox: spark_cfg.main_spark.clone(),
            tags: vec![
                ("matrix_room_id".to_string(), task_room_id.clone()),
                ("matrix_project".to_string(), project_key.to_string()),
                ("matrix_lobby_room_id".to_string(), room_id.to_string()),
                ("matrix_lobby_event_id".to_string(), event_id.clone()),
            ],
        })?;
        if let Some(task) = self.state.tasks.get_mut(&ids.task_id) {
            task.sandbox_project = Some(spark_cfg.project.clone());
            task.sandbox_name = Some(ids.sandbox_name.clone());
            task.updated_at = now_iso();
        }

        let fixed_env = [
            (
                "MATRIX_HOMESERVER_URL",
                normalize_homeserver_url(&self.config.homeserver_url),
            ),
            ("MATRIX_ACCESS_TOKEN", self.chat.access_token().to_string()),
            ("MATRIX_BOT_USER", self.config.bot_user_id.clone()),
            ("MATRIX_ROOM_ID", task_room_id.clone()),
            ("PROJECT_KEY", project_key.to_string()),
            ("SPARK_PROJECT", spark_cfg.project.clone()),
            ("SPARK_NAME", ids.sandbox_name.clone()),
            ("INITIAL_PROMPT", prompt.clone()),
        ];
        let env = build_bridge_env(
            std::env::vars(),
            fixed_env.map(|(key, value)| (key.to_string(), value)),
        );

        let launch = self.spark.launch_bridge_in_sandbox(&BridgeLaunchSpec {
            project: spark_cfg.project.clone(),
            sandbox_name: ids.sandbox_name.clone(),
            bridge_entrypoint: self.config.runtime.bridge_entrypoint.clone(),
            bridge_workdir: self.config.runtime.bridge_workdir.clone(),
            env,
        })?;
        if let Some(task) = self.state.tasks.get_mut(&ids.task_id) {
            task.bridge = BridgeHandle {
                pid: launch.pid,
                process_id: launch.process_id,
                raw_output: Some(launch.raw_output).filter(|raw| !raw.is_empty()),
            };
            task.status = TaskStatus::Active;
            task.updated_at = now_iso();
        }

        self.chat.send_notice(
            room_id,
            &format!(
                "Task created.\nid: {}\nroom: {} (https://matrix.to/#/{})\nsandbox: {}:{}",
                ids.task_id, task_room_id, task_room_id, spark_cfg.project, ids.sandbox_name
            ),
        )?;

        self.store.save(&self.state)?;
        Ok(ids.task_id)
    }

    /// Failure path: transition an existing task to `error` (optionally
    /// discarding its room), or index a sentinel so the event is never
    /// retried, then tell the lobby. Notice delivery is best-effort.
    pub(crate) fn mark_failed_event(
        &mut self,
        room_id: &str,
        event_id: &str,
        err: &OrchestratorError,
    ) {
        self.logger.error(&format!(
            "task spawn failed for {room_id}:{event_id}: {err}"
        ));

        let key = OrchestratorState::event_key(room_id, event_id);
        let existing_task = self
            .state
            .event_index
            .get(&key)
            .cloned()
            .filter(|task_id| self.state.tasks.contains_key(task_id));

        match existing_task {
            Some(task_id) => {
                let mut room_to_drop = None;
                if let Some(task) = self.state.tasks.get_mut(&task_id) {
                    task.status = TaskStatus::Error;
                    task.status_reason =
                        Some(truncate_chars(&err.to_string(), REASON_MAX_CHARS).to_string());
                    task.updated_at = now_iso();
                    if !self.config.runtime.keep_error_rooms {
                        room_to_drop = task.task_room_id.clone();
                    }
                }
                if let Some(task_room) = room_to_drop {
                    self.chat.leave_and_forget(&task_room);
                }
            }
            None => {
                self.state
                    .event_index
                    .insert(key, format!("failed-{}", now_millis()));
            }
        }

        let notice = format!(
            "Task creation failed. {}",
            truncate_chars(&err.to_string(), REASON_MAX_CHARS)
        );
        if let Err(send_err) = self.chat.send_notice(room_id, &notice) {
            self.logger.warn(&format!(
                "failed to post failure notice to {room_id}: {send_err}"
            ));
        }
    }
}
