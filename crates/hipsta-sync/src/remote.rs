//! Queued adapter for the network-backed store.
//!
//! Every request goes through one ordered queue drained by a single worker
//! task, so at most one request is in flight against the service and
//! results come back in request order. The number of requests queued or
//! running is published through a `watch` channel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hipsta_core::{EntityStore, Item, ListQuery, StoreError, StoreRole, Tag, TagKey};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

/// Maximum requests waiting in the queue before callers wait for room.
const QUEUE_CAPACITY: usize = 1024;

type Reply<T> = oneshot::Sender<Result<T, StoreError>>;

enum Request {
    Create { template: Option<Item>, reply: Reply<Item> },
    Read { id: String, reply: Reply<Item> },
    Update { item: Item, reply: Reply<Item> },
    Delete { item: Item, reply: Reply<()> },
    List { query: ListQuery, reply: Reply<Vec<String>> },
    Tags { reply: Reply<Vec<Tag>> },
    EnsureTag { name: String, reply: Reply<Tag> },
    DeleteTag { key: TagKey, reply: Reply<()> },
}

impl Request {
    fn operation(&self) -> &'static str {
        match self {
            Request::Create { .. } => "create",
            Request::Read { .. } => "read",
            Request::Update { .. } => "update",
            Request::Delete { .. } => "delete",
            Request::List { .. } => "list",
            Request::Tags { .. } => "tags",
            Request::EnsureTag { .. } => "ensure_tag",
            Request::DeleteTag { .. } => "delete_tag",
        }
    }
}

/// Configuration for the remote adapter.
#[derive(Debug, Clone, Default)]
pub struct RemoteConfig {
    /// Delay applied before each request reaches the service.
    pub latency: Duration,
}

/// Remote store adapter: serializes all calls to the wrapped service.
pub struct RemoteStore {
    queue: mpsc::Sender<Request>,
    in_flight: Arc<watch::Sender<usize>>,
    service_name: String,
}

impl RemoteStore {
    /// Start the worker for `service`. Must be called within a Tokio runtime.
    pub fn spawn(service: Arc<dyn EntityStore>, config: RemoteConfig) -> Self {
        if service.role() != StoreRole::Remote {
            warn!(
                service = service.name(),
                role = service.role().as_str(),
                "remote adapter wraps a service that keys on the local identity"
            );
        }
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let (in_flight, _) = watch::channel(0usize);
        let in_flight = Arc::new(in_flight);
        let service_name = service.name().to_string();

        tokio::spawn(run_worker(service, rx, in_flight.clone(), config.latency));

        RemoteStore {
            queue: tx,
            in_flight,
            service_name,
        }
    }

    /// Requests queued or running right now.
    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Observe the in-flight count.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.in_flight.subscribe()
    }

    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Request) -> Result<T, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.in_flight.send_modify(|n| *n += 1);
        if self.queue.send(make(reply)).await.is_err() {
            self.in_flight.send_modify(|n| *n = n.saturating_sub(1));
            return Err(StoreError::Closed {
                store: StoreRole::Remote,
            });
        }
        rx.await.map_err(|_| StoreError::Closed {
            store: StoreRole::Remote,
        })?
    }
}

async fn run_worker(
    service: Arc<dyn EntityStore>,
    mut rx: mpsc::Receiver<Request>,
    in_flight: Arc<watch::Sender<usize>>,
    latency: Duration,
) {
    debug!(service = service.name(), "remote worker started");
    while let Some(request) = rx.recv().await {
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let operation = request.operation();
        debug!(operation, "remote request");
        handle(service.as_ref(), request).await;
        in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }
    debug!(service = service.name(), "remote worker stopped");
}

/// Service failures other than lookups and rejected input are transport
/// failures from the caller's point of view.
fn as_transport(operation: &str, err: StoreError) -> StoreError {
    match err {
        StoreError::NotFound { .. }
        | StoreError::Validation(_)
        | StoreError::Transport { .. }
        | StoreError::Closed { .. } => err,
        other => StoreError::transport(operation, other),
    }
}

async fn handle(service: &dyn EntityStore, request: Request) {
    let op = request.operation();
    // A dropped receiver means the caller stopped waiting; the work is
    // still done so the queue keeps its order.
    match request {
        Request::Create { template, reply } => {
            let _ = reply.send(service.create(template.as_ref()).await.map_err(|e| as_transport(op, e)));
        }
        Request::Read { id, reply } => {
            let _ = reply.send(service.read(&id).await.map_err(|e| as_transport(op, e)));
        }
        Request::Update { item, reply } => {
            let _ = reply.send(service.update(&item).await.map_err(|e| as_transport(op, e)));
        }
        Request::Delete { item, reply } => {
            let _ = reply.send(service.delete(&item).await.map_err(|e| as_transport(op, e)));
        }
        Request::List { query, reply } => {
            let _ = reply.send(service.list(&query).await.map_err(|e| as_transport(op, e)));
        }
        Request::Tags { reply } => {
            let _ = reply.send(service.tags().await.map_err(|e| as_transport(op, e)));
        }
        Request::EnsureTag { name, reply } => {
            let _ = reply.send(service.ensure_tag(&name).await.map_err(|e| as_transport(op, e)));
        }
        Request::DeleteTag { key, reply } => {
            let _ = reply.send(service.delete_tag(&key).await.map_err(|e| as_transport(op, e)));
        }
    }
}

#[async_trait]
impl EntityStore for RemoteStore {
    fn role(&self) -> StoreRole {
        StoreRole::Remote
    }

    fn name(&self) -> &str {
        &self.service_name
    }

    async fn create(&self, template: Option<&Item>) -> Result<Item, StoreError> {
        let template = template.cloned();
        self.call(|reply| Request::Create { template, reply }).await
    }

    async fn read(&self, id: &str) -> Result<Item, StoreError> {
        let id = id.to_string();
        self.call(|reply| Request::Read { id, reply }).await
    }

    async fn update(&self, item: &Item) -> Result<Item, StoreError> {
        let item = item.clone();
        self.call(|reply| Request::Update { item, reply }).await
    }

    async fn delete(&self, item: &Item) -> Result<(), StoreError> {
        let item = item.clone();
        self.call(|reply| Request::Delete { item, reply }).await
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<String>, StoreError> {
        let query = query.clone();
        self.call(|reply| Request::List { query, reply }).await
    }

    async fn tags(&self) -> Result<Vec<Tag>, StoreError> {
        self.call(|reply| Request::Tags { reply }).await
    }

    async fn ensure_tag(&self, name: &str) -> Result<Tag, StoreError> {
        let name = name.to_string();
        self.call(|reply| Request::EnsureTag { name, reply }).await
    }

    async fn delete_tag(&self, key: &TagKey) -> Result<(), StoreError> {
        let key = key.clone();
        self.call(|reply| Request::DeleteTag { key, reply }).await
    }
}
