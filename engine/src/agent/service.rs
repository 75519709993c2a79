//! Agent Service
//!
//! The task control API for an embedding UI or orchestrator. Operator calls
//! return the updated task snapshot at once; control loops run on spawned
//! tokio tasks.

use sdk::errors::EngineError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::{AgentCore, RunOutcome};
use crate::task::{CreateTask, Task, TaskManager};

type RunHandle = JoinHandle<Result<RunOutcome, EngineError>>;

pub struct AgentService {
    core: Arc<AgentCore>,
    runs: Mutex<HashMap<String, RunHandle>>,
}

impl AgentService {
    pub fn new(core: Arc<AgentCore>) -> Self {
        Self {
            core,
            runs: Mutex::new(HashMap::new()),
        }
    }

    fn tasks(&self) -> &Arc<TaskManager> {
        self.core.tasks()
    }

    /// Create a task and start its control loop.
    pub async fn create_task(&self, request: CreateTask) -> Result<Task, EngineError> {
        let task = self.tasks().create(request).await?;
        self.spawn_run(&task.id).await;
        Ok(task)
    }

    pub async fn take_over(&self, task_id: &str) -> Result<Task, EngineError> {
        self.tasks().take_over(task_id).await
    }

    /// Hand control back to the assistant and start a fresh attempt.
    pub async fn resume(
        &self,
        task_id: &str,
        guidance: Option<String>,
        model: Option<String>,
    ) -> Result<Task, EngineError> {
        let task = self.tasks().resume(task_id, guidance, model).await?;
        self.spawn_run(task_id).await;
        Ok(task)
    }

    pub async fn cancel(&self, task_id: &str) -> Result<Task, EngineError> {
        self.tasks().cancel(task_id).await
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Task, EngineError> {
        self.tasks().get(task_id).await
    }

    pub async fn list_tasks(&self) -> Vec<Task> {
        self.tasks().list().await
    }

    /// Wait for the most recently started control loop of a task.
    pub async fn wait(&self, task_id: &str) -> Result<RunOutcome, EngineError> {
        let handle = self.runs.lock().await.remove(task_id).ok_or_else(|| {
            EngineError::TaskNotFound(format!("no control loop running for {}", task_id))
        })?;

        handle
            .await
            .map_err(|e| EngineError::Fatal(format!("control loop panicked: {}", e)))?
    }

    async fn spawn_run(&self, task_id: &str) {
        let core = Arc::clone(&self.core);
        let id = task_id.to_string();
        let handle = tokio::spawn(async move {
            let result = core.run(&id).await;
            if let Err(e) = &result {
                error!(task_id = %id, error = %e, "Control loop failed");
            }
            result
        });

        // A previous handle belongs to a loop that already passed its exit
        // checkpoint; dropping it detaches the task.
        if self
            .runs
            .lock()
            .await
            .insert(task_id.to_string(), handle)
            .is_some()
        {
            debug!(task_id = %task_id, "Replaced handle of previous control loop");
        }
    }
}
