pub mod bridge_env;
pub mod error;
pub mod pipeline;
pub mod reconcile;
pub mod scheduler;

pub use bridge_env::{build_bridge_env, should_pass_through};
pub use error::OrchestratorError;
pub use scheduler::{is_work_request, LOOP_ERROR_BACKOFF};

use crate::config::Config;
use crate::matrix::ChatApi;
use crate::shared::Logger;
use crate::spark::SparkApi;
use crate::state::{OrchestratorState, StateError, StateStore};
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct LobbyRoom {
    pub project_key: String,
    pub room_id: String,
}

/// Owns the state store, both external clients, and the in-memory task
/// table. One instance, one writer; tests construct their own with fakes.
pub struct Orchestrator<C: ChatApi, S: SparkApi> {
    pub(crate) config: Config,
    pub(crate) chat: C,
    pub(crate) spark: S,
    pub(crate) store: StateStore,
    pub(crate) state: OrchestratorState,
    pub(crate) logger: Logger,
    pub(crate) in_flight: HashSet<String>,
    pub(crate) since_token: Option<String>,
    pub(crate) lobby_rooms: Vec<LobbyRoom>,
}

impl<C: ChatApi, S: SparkApi> Orchestrator<C, S> {
    pub fn new(config: Config, chat: C, spark: S, logger: Logger) -> Result<Self, StateError> {
        let store = StateStore::new(config.runtime.state_file.clone());
        let state = store.load()?;
        let mut orchestrator = Self {
            config,
            chat,
            spark,
            store,
            state,
            logger,
            in_flight: HashSet::new(),
            since_token: None,
            lobby_rooms: Vec::new(),
        };
        orchestrator.refresh_lobby_rooms();
        Ok(orchestrator)
    }

    pub fn state(&self) -> &OrchestratorState {
        &self.state
    }

    pub fn chat(&self) -> &C {
        &self.chat
    }

    pub fn spark(&self) -> &S {
        &self.spark
    }

    pub fn since_token(&self) -> Option<&str> {
        self.since_token.as_deref()
    }

    pub fn lobby_rooms(&self) -> &[LobbyRoom] {
        &self.lobby_rooms
    }

    /// Lobby rooms in declared project order, skipping projects that have not
    /// been provisioned yet.
    pub(crate) fn refresh_lobby_rooms(&mut self) {
        self.lobby_rooms = self
            .config
            .projects
            .iter()
            .filter_map(|project| {
                self.state
                    .projects
                    .get(&project.key)
                    .and_then(|record| record.lobby_room_id.clone())
                    .map(|room_id| LobbyRoom {
                        project_key: project.key.clone(),
                        room_id,
                    })
            })
            .collect();
    }

    pub(crate) fn lobby_room_ids(&self) -> Vec<String> {
        self.lobby_rooms
            .iter()
            .map(|lobby| lobby.room_id.clone())
            .collect()
    }
}
