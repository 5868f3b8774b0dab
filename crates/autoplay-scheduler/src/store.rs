//! Execution record persistence.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::model::{JobExecution, JobExecutionResult};

/// Store for executions and their results.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Insert or update an execution.
    async fn save_execution(&self, execution: &JobExecution) -> Result<(), SchedulerError>;

    /// Insert a result with its host rows.
    async fn save_result(&self, result: &JobExecutionResult) -> Result<(), SchedulerError>;

    /// Load an execution by ID.
    async fn load_execution(&self, id: Uuid) -> Result<Option<JobExecution>, SchedulerError>;

    /// Load a result by ID.
    async fn load_result(&self, id: Uuid) -> Result<Option<JobExecutionResult>, SchedulerError>;

    /// All executions of a job, oldest first.
    async fn list_executions(&self, job_id: &str) -> Result<Vec<JobExecution>, SchedulerError>;
}

/// In-memory store for testing.
pub struct MemoryExecutionStore {
    executions: RwLock<HashMap<Uuid, JobExecution>>,
    results: RwLock<HashMap<Uuid, JobExecutionResult>>,
}

impl MemoryExecutionStore {
    /// Create a new memory store.
    pub fn new() -> Self {
        Self {
            executions: RwLock::new(HashMap::new()),
            results: RwLock::new(HashMap::new()),
        }
    }

    /// Every execution, oldest first.
    pub async fn all_executions(&self) -> Vec<JobExecution> {
        let executions = self.executions.read().await;
        let mut all: Vec<_> = executions.values().cloned().collect();
        all.sort_by_key(|e| e.created_at);
        all
    }
}

impl Default for MemoryExecutionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionStore for MemoryExecutionStore {
    async fn save_execution(&self, execution: &JobExecution) -> Result<(), SchedulerError> {
        let mut executions = self.executions.write().await;
        executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn save_result(&self, result: &JobExecutionResult) -> Result<(), SchedulerError> {
        let mut results = self.results.write().await;
        results.insert(result.id, result.clone());
        Ok(())
    }

    async fn load_execution(&self, id: Uuid) -> Result<Option<JobExecution>, SchedulerError> {
        let executions = self.executions.read().await;
        Ok(executions.get(&id).cloned())
    }

    async fn load_result(&self, id: Uuid) -> Result<Option<JobExecutionResult>, SchedulerError> {
        let results = self.results.read().await;
        Ok(results.get(&id).cloned())
    }

    async fn list_executions(&self, job_id: &str) -> Result<Vec<JobExecution>, SchedulerError> {
        Ok(self
            .all_executions()
            .await
            .into_iter()
            .filter(|e| e.job_id == job_id)
            .collect())
    }
}

/// File system based store: one JSON document per record.
pub struct FileExecutionStore {
    storage_path: PathBuf,
}

impl FileExecutionStore {
    /// Create a new file-based store below `storage_path`.
    pub async fn new(storage_path: impl Into<PathBuf>) -> Result<Self, SchedulerError> {
        let storage_path = storage_path.into();
        let store = Self { storage_path };

        for dir in [store.executions_dir(), store.results_dir()] {
            fs::create_dir_all(&dir).await.map_err(|e| {
                SchedulerError::Store(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }

        debug!("FileExecutionStore initialized at {:?}", store.storage_path);
        Ok(store)
    }

    fn executions_dir(&self) -> PathBuf {
        self.storage_path.join("executions")
    }

    fn results_dir(&self) -> PathBuf {
        self.storage_path.join("results")
    }

    fn execution_path(&self, id: Uuid) -> PathBuf {
        self.executions_dir().join(format!("{}.json", id))
    }

    fn result_path(&self, id: Uuid) -> PathBuf {
        self.results_dir().join(format!("{}.json", id))
    }

    async fn write_json<T: serde::Serialize>(
        path: PathBuf,
        value: &T,
    ) -> Result<(), SchedulerError> {
        let content = serde_json::to_string_pretty(value)?;
        fs::write(&path, content)
            .await
            .map_err(|e| SchedulerError::Store(format!("Failed to write {:?}: {}", path, e)))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        path: PathBuf,
    ) -> Result<Option<T>, SchedulerError> {
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SchedulerError::Store(format!(
                "Failed to read {:?}: {}",
                path, e
            ))),
        }
    }
}

#[async_trait]
impl ExecutionStore for FileExecutionStore {
    async fn save_execution(&self, execution: &JobExecution) -> Result<(), SchedulerError> {
        Self::write_json(self.execution_path(execution.id), execution).await?;
        debug!(
            "Saved execution {} of job '{}' ({})",
            execution.id, execution.job_id, execution.status
        );
        Ok(())
    }

    async fn save_result(&self, result: &JobExecutionResult) -> Result<(), SchedulerError> {
        Self::write_json(self.result_path(result.id), result).await
    }

    async fn load_execution(&self, id: Uuid) -> Result<Option<JobExecution>, SchedulerError> {
        Self::read_json(self.execution_path(id)).await
    }

    async fn load_result(&self, id: Uuid) -> Result<Option<JobExecutionResult>, SchedulerError> {
        Self::read_json(self.result_path(id)).await
    }

    async fn list_executions(&self, job_id: &str) -> Result<Vec<JobExecution>, SchedulerError> {
        let mut entries = fs::read_dir(self.executions_dir())
            .await
            .map_err(|e| SchedulerError::Store(format!("Failed to list executions: {}", e)))?;

        let mut executions = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match Self::read_json::<JobExecution>(path.clone()).await {
                Ok(Some(execution)) if execution.job_id == job_id => executions.push(execution),
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable execution file {:?}: {}", path, e),
            }
        }

        executions.sort_by_key(|e| e.created_at);
        Ok(executions)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
