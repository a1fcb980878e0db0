use crate::capability::AgentKind;
use crate::orchestration::engine::TraceEntry;
use crate::orchestration::orchestrator::{RunOutcome, RunPhase, TaskResponse};
use crate::planning::FinalResult;
use crate::shared::fs_atomic::write_once_atomic;
use crate::shared::ids::RequestId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum TraceStoreError {
    #[error("trace for request `{request_id}` is already persisted")]
    AlreadyPersisted { request_id: String },
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("json error at {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

fn io_error(path: &Path, source: std::io::Error) -> TraceStoreError {
    TraceStoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn json_error(path: &Path, source: serde_json::Error) -> TraceStoreError {
    TraceStoreError::Json {
        path: path.display().to_string(),
        source,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStepRecord {
    pub step_id: i64,
    pub agent: AgentKind,
    pub action: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// A persisted run as read back from disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub request_id: RequestId,
    pub task: String,
    #[serde(default)]
    pub context: Map<String, Value>,
    pub plan: Vec<PlanStepRecord>,
    pub trace: Vec<TraceEntry>,
    pub final_result: FinalResult,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub outcome: RunOutcome,
    pub phase: RunPhase,
    #[serde(default)]
    pub phases: Vec<RunPhase>,
    pub created_at: i64,
}

/// Write-once JSON records under `<state_root>/traces/<request_id>.json`.
#[derive(Debug, Clone)]
pub struct TraceStore {
    dir: PathBuf,
}

impl TraceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn for_state_root(state_root: &Path) -> Self {
        Self::new(state_root.join("traces"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, request_id: &RequestId) -> PathBuf {
        self.dir.join(format!("{}.json", request_id.as_str()))
    }

    pub fn persist(&self, response: &TaskResponse) -> Result<PathBuf, TraceStoreError> {
        let path = self.path_for(&response.request_id);
        let body = serde_json::to_vec_pretty(response).map_err(|err| json_error(&path, err))?;
        match write_once_atomic(&path, &body) {
            Ok(()) => Ok(path),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                Err(TraceStoreError::AlreadyPersisted {
                    request_id: response.request_id.to_string(),
                })
            }
            Err(err) => Err(io_error(&path, err)),
        }
    }

    pub fn load(&self, request_id: &RequestId) -> Result<Option<TraceRecord>, TraceStoreError> {
        let path = self.path_for(request_id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_error(&path, err)),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| json_error(&path, err))
    }

    /// Persisted request ids, oldest file name first.
    pub fn list(&self) -> Result<Vec<RequestId>, TraceStoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_error(&self.dir, err)),
        };
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| io_error(&self.dir, err))?;
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|name| name.strip_suffix(".json")) else {
                continue;
            };
            if let Ok(id) = RequestId::parse(stem) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}
