//! Task cache and task operations.

use std::sync::Arc;

use taskboard_api::{BackendApi, CreateTaskRequest, EscrowTransaction, Task};
use tracing::{debug, info, warn};

use crate::error::StoreResult;
use crate::reconcile::{EntityCache, ViewKey};
use crate::tracker::OperationTracker;

struct TaskStoreInner {
    api: Arc<dyn BackendApi>,
    page_size: u32,
    tasks: EntityCache<Task>,
    escrow: EntityCache<EscrowTransaction>,
    tracker: OperationTracker,
}

/// Store for tasks and the escrow movements pushed for them
#[derive(Clone)]
pub struct TaskStore {
    inner: Arc<TaskStoreInner>,
}

impl TaskStore {
    pub fn new(api: Arc<dyn BackendApi>, page_size: u32) -> Self {
        Self {
            inner: Arc::new(TaskStoreInner {
                api,
                page_size,
                tasks: EntityCache::new(),
                escrow: EntityCache::new(),
                tracker: OperationTracker::new(),
            }),
        }
    }

    /// Fetch the first page of open tasks and make it the open-task list
    pub async fn fetch_open_tasks(&self) -> StoreResult<Vec<Task>> {
        let tasks = self
            .inner
            .tracker
            .query("fetch_open_tasks", self.inner.api.open_tasks(self.inner.page_size, 0))
            .await?;
        debug!(count = tasks.len(), "open tasks fetched");
        self.inner.tasks.replace_view(ViewKey::OpenTasks, &tasks);
        Ok(tasks)
    }

    /// Fetch the first page of tasks owned by or claimed by this device
    pub async fn fetch_my_tasks(&self) -> StoreResult<Vec<Task>> {
        let tasks = self
            .inner
            .tracker
            .query("fetch_my_tasks", self.inner.api.my_tasks(self.inner.page_size, 0))
            .await?;
        debug!(count = tasks.len(), "my tasks fetched");
        self.inner.tasks.replace_view(ViewKey::MyTasks, &tasks);
        Ok(tasks)
    }

    pub async fn fetch_task(&self, task_id: &str) -> StoreResult<Task> {
        let task = self
            .inner
            .tracker
            .query("fetch_task", self.inner.api.task(task_id))
            .await?;
        self.inner.tasks.upsert(task.clone());
        Ok(task)
    }

    /// Create a task, then refresh both task lists it may now appear in
    pub async fn create_task(&self, request: &CreateTaskRequest) -> StoreResult<Task> {
        let task = self
            .inner
            .tracker
            .mutation("create_task", self.inner.api.create_task(request))
            .await?;
        info!(task_id = %task.id, "task created");

        self.refresh_lists().await;
        Ok(task)
    }

    /// Re-query the task itself after a claim-side mutation.
    pub(crate) async fn refresh_task(&self, task_id: &str) {
        if let Err(error) = self.fetch_task(task_id).await {
            warn!(task_id, %error, "task refresh failed");
        }
    }

    async fn refresh_lists(&self) {
        if let Err(error) = self.fetch_open_tasks().await {
            warn!(%error, "open task refresh failed");
        }
        if let Err(error) = self.fetch_my_tasks().await {
            warn!(%error, "my task refresh failed");
        }
    }

    pub fn task(&self, task_id: &str) -> Option<Task> {
        self.inner.tasks.get(task_id)
    }

    pub fn open_tasks(&self) -> Vec<Task> {
        self.inner.tasks.view(&ViewKey::OpenTasks)
    }

    pub fn my_tasks(&self) -> Vec<Task> {
        self.inner.tasks.view(&ViewKey::MyTasks)
    }

    /// Escrow movements pushed for `task_id`, oldest first
    pub fn escrow_for_task(&self, task_id: &str) -> Vec<EscrowTransaction> {
        self.inner.escrow.view(&ViewKey::TaskEscrow(task_id.to_string()))
    }

    /// Merge a pushed task snapshot. List membership is left to the next query.
    pub fn apply_task(&self, task: Task) {
        debug!(task_id = %task.id, status = ?task.status, "applying task snapshot");
        self.inner.tasks.upsert(task);
    }

    pub fn apply_escrow(&self, escrow: EscrowTransaction) {
        debug!(escrow_id = %escrow.id, task_id = %escrow.task_id, "applying escrow snapshot");
        self.inner
            .escrow
            .append_to_view(ViewKey::TaskEscrow(escrow.task_id.clone()), escrow);
    }

    pub fn cache(&self) -> &EntityCache<Task> {
        &self.inner.tasks
    }

    pub fn tracker(&self) -> &OperationTracker {
        &self.inner.tracker
    }
}
