use super::{Orchestrator, OrchestratorError};
use crate::config::ProjectConfig;
use crate::matrix::{ChatApi, ChatError};
use crate::shared::now_iso;
use crate::spark::{MainSandboxSpec, RepoSyncSpec, SandboxBootstrapSpec, SparkApi};
use crate::state::{ProjectState, SparkShape};

impl<C: ChatApi, S: SparkApi> Orchestrator<C, S> {
    /// Converges the chat hierarchy and sandbox fleet to the declared
    /// configuration. Idempotent: resource IDs persist across restarts, so
    /// repeated runs confirm rather than re-create. Persists state once, at
    /// the end.
    pub fn reconcile_workspace_and_projects(&mut self) -> Result<(), OrchestratorError> {
        let team = self.config.workspace.team_members.clone();

        let workspace_space_id = self.reconcile_workspace_space(&team)?;
        for project in self.config.projects.clone() {
            self.reconcile_project(&workspace_space_id, &project, &team)?;
        }

        self.store.save(&self.state)?;
        self.refresh_lobby_rooms();
        Ok(())
    }

    fn reconcile_workspace_space(&mut self, team: &[String]) -> Result<String, OrchestratorError> {
        let mut space_id = self.state.workspace.space_id.clone();
        if let Some(existing) = space_id.clone() {
            if let Err(err) = self.probe_existing_space(&existing, team) {
                self.logger.warn(&format!(
                    "workspace space {existing} is unreachable, re-creating: {err}"
                ));
                space_id = None;
            }
        }

        let space_id = match space_id {
            Some(id) => id,
            None => {
                let id = self.chat.create_space(
                    &self.config.workspace.name,
                    self.config.workspace.topic.as_deref(),
                    team,
                )?;
                self.logger
                    .info(&format!("created workspace space {id}"));
                id
            }
        };

        self.state.workspace.name = self.config.workspace.name.clone();
        self.state.workspace.topic = self.config.workspace.topic.clone();
        self.state.workspace.space_id = Some(space_id.clone());
        self.state.workspace.updated_at = Some(now_iso());
        Ok(space_id)
    }

    fn probe_existing_space(&self, room_id: &str, team: &[String]) -> Result<(), ChatError> {
        self.chat.ensure_joined_room(room_id)?;
        self.chat.ensure_invites(room_id, team)?;
        Ok(())
    }

    fn reconcile_project(
        &mut self,
        workspace_space_id: &str,
        project: &ProjectConfig,
        team: &[String],
    ) -> Result<(), OrchestratorError> {
        let mut record = self
            .state
            .projects
            .get(&project.key)
            .cloned()
            .unwrap_or_default();
        record.display_name = project.display_name.clone();

        let project_space_id = self.resolve_or_create_room(
            record.project_space_id.take(),
            &format!("project space for `{}`", project.key),
            || self.chat.create_space(&project.display_name, None, team),
        )?;
        self.chat
            .link_room_under_space(workspace_space_id, &project_space_id)?;
        self.chat.ensure_invites(&project_space_id, team)?;
        record.project_space_id = Some(project_space_id.clone());

        let lobby_room_id = self.resolve_or_create_room(
            record.lobby_room_id.take(),
            &format!("lobby for `{}`", project.key),
            || {
                self.chat.create_room(
                    &project.matrix.lobby_room_name,
                    Some(&format!("Work requests for {}", project.display_name)),
                    team,
                )
            },
        )?;
        self.chat
            .link_room_under_space(&project_space_id, &lobby_room_id)?;
        self.chat.ensure_invites(&lobby_room_id, team)?;
        record.lobby_room_id = Some(lobby_room_id);
        record.lobby_room_name = Some(project.matrix.lobby_room_name.clone());

        self.reconcile_project_sandbox(project)?;

        record.spark = Some(SparkShape {
            project: project.spark.project.clone(),
            base: project.spark.base.clone(),
            main_sandbox: project.spark.main_spark.clone(),
            work_volume: project.spark.work.volume.clone(),
            work_mount_path: project.spark.work.mount_path.clone(),
        });
        record.updated_at = Some(now_iso());
        self.state.projects.insert(project.key.clone(), record);
        Ok(())
    }

    /// Keeps an existing room if the bot can still join it; otherwise drops
    /// the stale ID and creates a fresh room. Creation failures propagate.
    fn resolve_or_create_room(
        &self,
        existing: Option<String>,
        label: &str,
        create: impl FnOnce() -> Result<String, ChatError>,
    ) -> Result<String, OrchestratorError> {
        if let Some(room_id) = existing {
            match self.chat.ensure_joined_room(&room_id) {
                Ok(()) => return Ok(room_id),
                Err(err) => {
                    self.logger.warn(&format!(
                        "{label} {room_id} is unreachable, re-creating: {err}"
                    ));
                }
            }
        }
        let room_id = create()?;
        self.logger.info(&format!("created {label}: {room_id}"));
        Ok(room_id)
    }

    fn reconcile_project_sandbox(&self, project: &ProjectConfig) -> Result<(), OrchestratorError> {
        let spark = &project.spark;
        self.spark
            .ensure_work_volume(&spark.project, &spark.work.volume)?;
        self.spark.ensure_main_sandbox(&MainSandboxSpec {
            project: spark.project.clone(),
            base: spark.base.clone(),
            main_sandbox: spark.main_spark.clone(),
            work_volume: spark.work.volume.clone(),
            work_mount_path: spark.work.mount_path.clone(),
        })?;

        let workdir = repo_workdir(&spark.work.mount_path);
        self.spark.ensure_repo_in_main_sandbox(&RepoSyncSpec {
            project: spark.project.clone(),
            sandbox_name: spark.main_spark.clone(),
            repo: project.repo.clone(),
            branch: project.default_branch.clone(),
            workdir: workdir.clone(),
        })?;

        if let Some(script_path) = &spark.bootstrap.script_if_exists {
            self.spark.run_bootstrap(&SandboxBootstrapSpec {
                project: spark.project.clone(),
                sandbox_name: spark.main_spark.clone(),
                workdir,
                script_path: script_path.clone(),
                timeout_sec: spark.bootstrap.timeout_sec,
                retries: spark.bootstrap.retries,
            })?;
        }
        Ok(())
    }

    pub(crate) fn project_record(&self, project_key: &str) -> Option<&ProjectState> {
        self.state.projects.get(project_key)
    }
}

/// The repo checkout lives at a fixed location under the work mount.
pub fn repo_workdir(mount_path: &str) -> String {
    format!("{}/repo", mount_path.trim_end_matches('/'))
}
