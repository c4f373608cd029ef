//! Cancellable background tasks over a shared store.
//!
//! Every task runs on the blocking thread pool, bounded by a semaphore.
//! Expansions are computed under the read lock and swapped in under the write
//! lock, so readers are only held up for the swap. A plan that went stale in
//! between is recomputed under the write lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ocl_core::{
    CancelFlag, CoreError, ExpansionRequest, ReferenceOptions, TerminologyStore, WriteContext,
};
use ocl_types::{ContainerVersionKey, ExpansionKey, ReferenceExpression, ReferenceOutcome};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{WorkerError, WorkerResult};

/// Identifier of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Lifecycle of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for a free slot.
    Pending,
    /// Running.
    Started,
    /// Finished successfully.
    Succeeded,
    /// Finished with an error.
    Failed {
        /// Error description.
        message: String,
    },
    /// Stopped by a cancellation request.
    Cancelled,
}

impl TaskStatus {
    /// Returns true once the task has finished.
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Pending | Self::Started)
    }
}

/// What a finished task produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// A single computed expansion.
    Expansion(ExpansionKey),
    /// Per-expression outcomes of a reference batch.
    References(Vec<ReferenceOutcome>),
    /// Default expansions created by the maintenance job.
    Expansions(Vec<ExpansionKey>),
}

type SharedStore = Arc<RwLock<TerminologyStore>>;

struct TaskEntry {
    status: TaskStatus,
    cancel: CancelFlag,
    handle: Option<JoinHandle<WorkerResult<TaskOutcome>>>,
}

/// Runs store operations in the background.
#[derive(Clone)]
pub struct TaskRunner {
    store: SharedStore,
    permits: Arc<Semaphore>,
    tasks: Arc<Mutex<HashMap<TaskId, TaskEntry>>>,
    next_id: Arc<AtomicU64>,
}

impl TaskRunner {
    /// Creates a runner allowing `max_tasks` concurrent tasks.
    pub fn new(store: TerminologyStore, max_tasks: usize) -> Self {
        Self::with_shared_store(Arc::new(RwLock::new(store)), max_tasks)
    }

    /// Creates a runner over an already shared store.
    pub fn with_shared_store(store: SharedStore, max_tasks: usize) -> Self {
        Self {
            store,
            permits: Arc::new(Semaphore::new(max_tasks.max(1))),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// The shared store.
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Computes an expansion of a collection version.
    pub async fn submit_expand(
        &self,
        ctx: WriteContext,
        collection_version: ContainerVersionKey,
        request: ExpansionRequest,
    ) -> TaskId {
        self.submit("expand", move |store, cancel| {
            let request = request.with_cancel(cancel.clone());
            expand_in_two_phases(store, &ctx, collection_version, &request).map(TaskOutcome::Expansion)
        })
        .await
    }

    /// Adds references to a HEAD collection version.
    pub async fn submit_add_references(
        &self,
        ctx: WriteContext,
        collection_version: ContainerVersionKey,
        expressions: Vec<ReferenceExpression>,
        options: ReferenceOptions,
    ) -> TaskId {
        self.submit("add_references", move |store, _cancel| {
            let mut guard = store.blocking_write();
            let outcomes = guard.add_references(&ctx, collection_version, &expressions, &options)?;
            Ok(TaskOutcome::References(outcomes))
        })
        .await
    }

    /// Creates the default expansion of every auto-expanding collection
    /// version that lacks one.
    pub async fn submit_collection_expansions(&self, ctx: WriteContext) -> TaskId {
        self.submit("collection_expansions", move |store, cancel| {
            let missing = store.blocking_read().collections_missing_default_expansion();
            info!(count = missing.len(), "Creating missing default expansions");
            let request = ExpansionRequest::default().with_cancel(cancel.clone());
            let mut created = Vec::with_capacity(missing.len());
            for version in missing {
                created.push(expand_in_two_phases(store, &ctx, version, &request)?);
            }
            Ok(TaskOutcome::Expansions(created))
        })
        .await
    }

    /// Requests cancellation. Returns false for unknown or finished tasks.
    pub async fn cancel(&self, id: TaskId) -> bool {
        let tasks = self.tasks.lock().await;
        match tasks.get(&id) {
            Some(entry) if !entry.status.is_finished() => {
                entry.cancel.cancel();
                info!(task = %id, "Cancellation requested");
                true
            }
            _ => false,
        }
    }

    /// Current status of a task.
    pub async fn status(&self, id: TaskId) -> Option<TaskStatus> {
        self.tasks.lock().await.get(&id).map(|entry| entry.status.clone())
    }

    /// Waits for a task and takes its outcome. A second wait fails.
    pub async fn wait(&self, id: TaskId) -> WorkerResult<TaskOutcome> {
        let handle = {
            let mut tasks = self.tasks.lock().await;
            tasks
                .get_mut(&id)
                .and_then(|entry| entry.handle.take())
                .ok_or(WorkerError::UnknownTask(id))?
        };
        handle.await.map_err(|err| WorkerError::TaskAborted {
            id,
            message: err.to_string(),
        })?
    }

    async fn submit<F>(&self, kind: &'static str, job: F) -> TaskId
    where
        F: FnOnce(&SharedStore, &CancelFlag) -> WorkerResult<TaskOutcome> + Send + 'static,
    {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let cancel = CancelFlag::new();
        let mut tasks = self.tasks.lock().await;

        let runner = self.clone();
        let flag = cancel.clone();
        let handle = tokio::spawn(async move {
            let permit = runner
                .permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::Closed)?;
            runner.set_status(id, TaskStatus::Started).await;
            debug!(task = %id, kind, "Task started");

            let store = runner.store.clone();
            let result = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                flag.check()?;
                job(&store, &flag)
            })
            .await
            .map_err(|err| WorkerError::TaskAborted {
                id,
                message: err.to_string(),
            })
            .and_then(|result| result);

            let status = match &result {
                Ok(_) => TaskStatus::Succeeded,
                Err(err) if err.is_cancelled() => TaskStatus::Cancelled,
                Err(err) => {
                    warn!(task = %id, kind, error = %err, "Task failed");
                    TaskStatus::Failed {
                        message: err.to_string(),
                    }
                }
            };
            info!(task = %id, kind, ?status, "Task finished");
            runner.set_status(id, status).await;
            result
        });

        // registered before the spawned task can look itself up
        tasks.insert(
            id,
            TaskEntry {
                status: TaskStatus::Pending,
                cancel,
                handle: Some(handle),
            },
        );
        id
    }

    async fn set_status(&self, id: TaskId, status: TaskStatus) {
        if let Some(entry) = self.tasks.lock().await.get_mut(&id) {
            entry.status = status;
        }
    }
}

impl fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRunner")
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}

/// Plans under the read lock, applies under the write lock.
fn expand_in_two_phases(
    store: &SharedStore,
    ctx: &WriteContext,
    collection_version: ContainerVersionKey,
    request: &ExpansionRequest,
) -> WorkerResult<ExpansionKey> {
    let plan = store.blocking_read().plan_expansion(collection_version, request)?;
    if let Some(cancel) = &request.cancel {
        cancel.check()?;
    }
    let mut guard = store.blocking_write();
    match guard.apply_expansion(ctx, plan, request) {
        Err(CoreError::Conflict { message }) => {
            debug!(version = %collection_version, %message, "Expansion plan went stale; recomputing");
            Ok(guard.expand(ctx, collection_version, request)?)
        }
        other => Ok(other?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocl_types::{ConceptPayload, OwnerKind, RepositoryIdentity, RepositoryMetadata};

    fn make_store() -> (TerminologyStore, ContainerVersionKey) {
        let mut store = TerminologyStore::new();
        let ctx = WriteContext::new("tester");
        let source = RepositoryIdentity::source(OwnerKind::Organization, "org", "src");
        store
            .create_repository(&ctx, source.clone(), RepositoryMetadata::named("Source"))
            .unwrap();
        for code in ["c1", "c2", "c3"] {
            store
                .write_content(&ctx, &source, ConceptPayload::new(code, "Misc", code), None)
                .unwrap();
        }
        let collection = RepositoryIdentity::collection(OwnerKind::Organization, "org", "coll");
        store
            .create_repository(&ctx, collection.clone(), RepositoryMetadata::named("Collection"))
            .unwrap();
        let head = store.head_key(&collection).unwrap();
        (store, head)
    }

    #[tokio::test]
    async fn test_add_references_then_expand() {
        let (store, head) = make_store();
        let runner = TaskRunner::new(store, 2);
        let ctx = WriteContext::new("tester");

        let task = runner
            .submit_add_references(
                ctx.clone(),
                head,
                vec![ReferenceExpression::uri("/orgs/org/sources/src/concepts/")],
                ReferenceOptions::default(),
            )
            .await;
        match runner.wait(task).await.unwrap() {
            TaskOutcome::References(outcomes) => assert!(outcomes[0].added),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(runner.status(task).await, Some(TaskStatus::Succeeded));

        let task = runner.submit_expand(ctx, head, ExpansionRequest::default()).await;
        let TaskOutcome::Expansion(key) = runner.wait(task).await.unwrap() else {
            panic!("expected an expansion");
        };
        let store = runner.store().read().await;
        assert_eq!(store.graph().expansion_members().len(key), 3);
    }

    #[tokio::test]
    async fn test_failed_task_reports_error() {
        let (store, _) = make_store();
        let runner = TaskRunner::new(store, 1);
        let task = runner
            .submit_expand(WriteContext::system(), ContainerVersionKey(9999), ExpansionRequest::default())
            .await;
        assert!(matches!(runner.wait(task).await, Err(WorkerError::Core(_))));
        assert!(matches!(runner.status(task).await, Some(TaskStatus::Failed { .. })));
        assert!(matches!(runner.wait(task).await, Err(WorkerError::UnknownTask(_))));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (store, head) = make_store();
        let runner = TaskRunner::new(store, 1);

        // hold the only slot so the next task stays pending
        let guard = runner.store().clone().write_owned().await;
        let blocker = runner
            .submit_add_references(
                WriteContext::system(),
                head,
                vec![ReferenceExpression::uri("/orgs/org/sources/src/concepts/c1/")],
                ReferenceOptions::default(),
            )
            .await;
        let task = runner
            .submit_expand(WriteContext::system(), head, ExpansionRequest::default())
            .await;
        assert!(runner.cancel(task).await);
        drop(guard);

        assert!(runner.wait(blocker).await.is_ok());
        let result = runner.wait(task).await;
        assert!(result.is_err_and(|err| err.is_cancelled()));
        assert_eq!(runner.status(task).await, Some(TaskStatus::Cancelled));
        assert!(!runner.cancel(task).await);
    }

    #[tokio::test]
    async fn test_collection_expansions_job() {
        let (mut store, head) = make_store();
        let ctx = WriteContext::new("tester");
        store
            .add_references(
                &ctx,
                head,
                &[ReferenceExpression::uri("/orgs/org/sources/src/concepts/")],
                &ReferenceOptions::default(),
            )
            .unwrap();
        let manual = RepositoryIdentity::collection(OwnerKind::User, "jane", "manual");
        let mut metadata = RepositoryMetadata::named("Manual");
        metadata.autoexpand_head = false;
        store.create_repository(&ctx, manual, metadata).unwrap();

        // a graph restored without its default expansion
        let mut snapshot = store.graph().to_snapshot();
        snapshot.default_expansions.clear();
        let graph = ocl_core::ContentGraph::from_snapshot(snapshot).unwrap();
        let store = TerminologyStore::from_graph(graph, ocl_core::EngineConfig::default());
        assert_eq!(store.collections_missing_default_expansion(), vec![head]);

        let runner = TaskRunner::new(store, 2);
        let task = runner.submit_collection_expansions(ctx).await;
        match runner.wait(task).await.unwrap() {
            TaskOutcome::Expansions(created) => assert_eq!(created.len(), 1),
            other => panic!("unexpected outcome {other:?}"),
        }
        let store = runner.store().read().await;
        assert_eq!(store.graph().context_members(head).len(), 3);
        assert!(store.collections_missing_default_expansion().is_empty());
    }
}
