use super::{Orchestrator, OrchestratorError};
use crate::matrix::{ChatApi, SyncResponse, TimelineEvent};
use crate::spark::SparkApi;
use crate::state::OrchestratorState;
use std::time::Duration;

pub const LOOP_ERROR_BACKOFF: Duration = Duration::from_millis(1500);

/// A lobby event qualifies as a work request iff it is a message event with
/// an id and a sender, the sender is not the bot itself, and the trimmed
/// body is non-empty and not a `/`-prefixed command.
pub fn is_work_request(event: &TimelineEvent, bot_user_id: &str) -> bool {
    if event.kind != "m.room.message" {
        return false;
    }
    let has_event_id = event
        .event_id
        .as_deref()
        .is_some_and(|id| !id.is_empty());
    let Some(sender) = event.sender.as_deref().filter(|s| !s.is_empty()) else {
        return false;
    };
    if !has_event_id || sender == bot_user_id {
        return false;
    }
    let body = event.body().unwrap_or_default().trim();
    !body.is_empty() && !body.starts_with('/')
}

impl<C: ChatApi, S: SparkApi> Orchestrator<C, S> {
    /// Verifies both external clients, reconciles, then takes a zero-timeout
    /// sync to obtain the starting resume token. Events returned by that
    /// first sync are discarded on purpose: messages posted while the
    /// orchestrator was offline are not work requests.
    pub fn initialize(&mut self) -> Result<(), OrchestratorError> {
        self.chat.verify_connection()?;
        self.spark.verify_availability()?;
        self.reconcile_workspace_and_projects()?;

        let rooms = self.lobby_room_ids();
        let response = self.chat.sync(None, 0, &rooms)?;
        self.since_token = Some(response.next_batch);
        self.logger.info(&format!(
            "initialized, watching {} lobby room(s)",
            rooms.len()
        ));
        Ok(())
    }

    /// Long-polls the homeserver until `should_continue` returns false. The
    /// resume token advances only after a batch is fully handled, so a
    /// transient failure re-presents the batch and deduplication absorbs the
    /// replay.
    pub fn run_loop(
        &mut self,
        mut should_continue: impl FnMut() -> bool,
    ) -> Result<(), OrchestratorError> {
        while should_continue() {
            let rooms = self.lobby_room_ids();
            let response = match self.chat.sync(
                self.since_token.as_deref(),
                self.config.runtime.sync_timeout_ms,
                &rooms,
            ) {
                Ok(response) => response,
                Err(err) => {
                    self.logger.warn(&format!("sync failed: {err}"));
                    std::thread::sleep(LOOP_ERROR_BACKOFF);
                    continue;
                }
            };

            let next_batch = response.next_batch.clone();
            match self.handle_sync(&response) {
                Ok(()) => self.since_token = Some(next_batch),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    self.logger.warn(&format!("sync batch handling failed: {err}"));
                    std::thread::sleep(LOOP_ERROR_BACKOFF);
                }
            }
        }
        self.logger.info("shutdown requested, leaving run loop");
        Ok(())
    }

    /// Processes one sync batch: rooms in declared project order, events in
    /// timeline order within each room.
    pub fn handle_sync(&mut self, response: &SyncResponse) -> Result<(), OrchestratorError> {
        for lobby in self.lobby_rooms.clone() {
            let events = response.timeline_events(&lobby.room_id).to_vec();
            for event in &events {
                if !is_work_request(event, &self.config.bot_user_id) {
                    continue;
                }
                self.handle_lobby_message(&lobby.project_key, &lobby.room_id, event)?;
            }
        }
        Ok(())
    }

    /// Deduplicates against the durable event index and the in-memory
    /// in-flight set, then runs the spawn pipeline. State is persisted on
    /// every exit path; only persistence failures escape.
    fn handle_lobby_message(
        &mut self,
        project_key: &str,
        room_id: &str,
        event: &TimelineEvent,
    ) -> Result<(), OrchestratorError> {
        let Some(event_id) = event.event_id.clone() else {
            return Ok(());
        };
        let key = OrchestratorState::event_key(room_id, &event_id);

        if self.state.event_index.contains_key(&key) {
            self.logger.debug(&format!("event {key} already processed"));
            return Ok(());
        }
        if self.in_flight.contains(&key) {
            return Ok(());
        }

        self.in_flight.insert(key.clone());
        let result = self.spawn_task(project_key, room_id, event);
        self.in_flight.remove(&key);

        match result {
            Ok(task_id) => self
                .logger
                .info(&format!("task {task_id} created for event {key}")),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => self.mark_failed_event(room_id, &event_id, &err),
        }

        self.store.save(&self.state)?;
        Ok(())
    }
}
