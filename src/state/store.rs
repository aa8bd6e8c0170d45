use super::records::OrchestratorState;
use super::sanitize::sanitize_state;
use super::StateError;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// An absent or corrupt file yields the empty default; individual bad
    /// records are dropped rather than poisoning startup.
    pub fn load(&self) -> Result<OrchestratorState, StateError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(OrchestratorState::default());
            }
            Err(source) => {
                return Err(StateError::Read {
                    path: self.path.display().to_string(),
                    source,
                });
            }
        };

        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(value) => Ok(sanitize_state(value)),
            Err(_) => Ok(OrchestratorState::default()),
        }
    }

    pub fn save(&self, state: &OrchestratorState) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| StateError::Write {
                    path: parent.display().to_string(),
                    source,
                })?;
            }
        }

        let mut body =
            serde_json::to_vec_pretty(state).map_err(|source| StateError::Serialize { source })?;
        body.push(b'\n');
        self.write_snapshot_durably(&body)
            .map_err(|source| StateError::Write {
                path: self.path.display().to_string(),
                source,
            })
    }

    /// Stages the snapshot beside the canonical file, fsyncs it, then renames
    /// it into place: a crash leaves either the previous snapshot or the new
    /// one, never a torn write. The staging name is keyed by pid alone since
    /// the orchestrator is the snapshot's only writer.
    fn write_snapshot_durably(&self, bytes: &[u8]) -> std::io::Result<()> {
        let staged = self.staging_path();
        {
            let mut file = fs::File::create(&staged)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&staged, &self.path)?;

        // Directory sync is opportunistic; not every filesystem allows it.
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if let Ok(handle) = fs::File::open(dir) {
                let _ = handle.sync_all();
            }
        }
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(format!(".{}.staged", std::process::id()));
        self.path.with_file_name(name)
    }
}
