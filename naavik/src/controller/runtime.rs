use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::serde::de::DeserializeOwned;
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Resource, ResourceExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::delegator::Handler;
use super::event_status::{EVENT_STATUS_CHANNEL_CAPACITY, EventProcessStatus, EventStatus, Terminal};
use super::rate_limiter::KeyRateLimiter;
use super::queue::WorkQueue;
use crate::cache::{ControllerHandle, ControllerRegistry};
use crate::context::EventContext;
use crate::executor::{EventRank, SharedExecutor};
use crate::util::resource::object_generation;

/// The three shapes of watch event the controller runtime reacts to
/// (spec.md §4.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Add,
    Update,
    Delete,
}

impl EventKind {
    fn as_str(&self) -> &'static str {
        match self {
            EventKind::Add => "Add",
            EventKind::Update => "Update",
            EventKind::Delete => "Delete",
        }
    }
}

/// The part of a queue item that survives a retry re-enqueue (spec.md §4.2:
/// "allocate a *new* status channel (never reuse the closed one)").
struct ItemTemplate<K> {
    key: String,
    kind: EventKind,
    obj: Arc<K>,
    old_obj: Option<Arc<K>>,
}

impl<K> Clone for ItemTemplate<K> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            kind: self.kind,
            obj: self.obj.clone(),
            old_obj: self.old_obj.clone(),
        }
    }
}

struct QueueItem<K> {
    template: ItemTemplate<K>,
    retry_count: u32,
    status_tx: mpsc::Sender<EventProcessStatus>,
    status_rx: mpsc::Receiver<EventProcessStatus>,
}

fn new_item<K>(template: ItemTemplate<K>, retry_count: u32) -> QueueItem<K> {
    let (status_tx, status_rx) = mpsc::channel(EVENT_STATUS_CHANNEL_CAPACITY);
    QueueItem {
        template,
        retry_count,
        status_tx,
        status_rx,
    }
}

fn meta_namespace_key<K: ResourceExt>(obj: &K) -> String {
    format!("{}/{}", obj.namespace().unwrap_or_default(), obj.name_any())
}

/// Configuration for one controller instance: the resource it watches (the
/// "informer factory"/delegator of spec.md §4.2) plus the handler that
/// reacts to it.
pub struct ControllerConfig<K> {
    pub name: String,
    pub concurrency: usize,
    pub api: Api<K>,
    pub watcher_config: watcher::Config,
    pub async_executor: Option<SharedExecutor>,
}

/// Binds an informer to a rate-limited work queue, dispatches events to
/// `handler` through a worker pool, and registers itself in `registry` for
/// graceful shutdown (spec.md §4.2, C8).
pub struct Controller<K> {
    config: ControllerConfig<K>,
    handler: Arc<dyn Handler<K>>,
    registry: Arc<ControllerRegistry>,
}

impl<K> Controller<K>
where
    K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(
        config: ControllerConfig<K>,
        handler: Arc<dyn Handler<K>>,
        registry: Arc<ControllerRegistry>,
    ) -> Self {
        Self {
            config,
            handler,
            registry,
        }
    }

    /// Spawns the informer and worker tasks, registers a [`ControllerHandle`]
    /// under `self.config.name`, and returns immediately. The controller
    /// keeps running until `registry` closes its stop channel.
    pub fn start(self) {
        let Controller {
            config,
            handler,
            registry,
        } = self;
        let name = config.name.clone();
        let handle = ControllerHandle::new(config.concurrency);
        registry.register(&name, handle.clone());

        let queue: Arc<WorkQueue<QueueItem<K>>> = Arc::new(WorkQueue::new());
        let rate_limiter = Arc::new(KeyRateLimiter::new());
        let synced = Arc::new(Mutex::new(false));

        tokio::spawn(run_informer(
            name.clone(),
            config.api,
            config.watcher_config,
            queue.clone(),
            rate_limiter.clone(),
            synced.clone(),
            handle.stop.clone(),
        ));

        for worker_id in 0..config.concurrency {
            let worker_cancel = handle.worker_cancels[worker_id].clone();
            tokio::spawn(run_worker(
                name.clone(),
                queue.clone(),
                rate_limiter.clone(),
                handler.clone(),
                config.async_executor.clone(),
                synced.clone(),
                handle.stop.clone(),
                worker_cancel,
            ));
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_informer<K>(
    controller_name: String,
    api: Api<K>,
    watcher_config: watcher::Config,
    queue: Arc<WorkQueue<QueueItem<K>>>,
    rate_limiter: Arc<KeyRateLimiter>,
    synced: Arc<Mutex<bool>>,
    stop: CancellationToken,
) where
    K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut stream = watcher(api, watcher_config).default_backoff().boxed();

    loop {
        let next = tokio::select! {
            _ = stop.cancelled() => break,
            next = stream.next() => next,
        };
        let Some(event) = next else { break };
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(controller_name, error = %err, "watch stream error, retrying");
                continue;
            }
        };

        match event {
            watcher::Event::Init => {}
            watcher::Event::InitApply(obj) => {
                let key = meta_namespace_key(&obj);
                seen.insert(key.clone());
                enqueue(&controller_name, &queue, &rate_limiter, key, EventKind::Add, Arc::new(obj), None)
                    .await;
            }
            watcher::Event::InitDone => {
                *synced.lock() = true;
            }
            watcher::Event::Apply(obj) => {
                let key = meta_namespace_key(&obj);
                let kind = if seen.insert(key.clone()) {
                    EventKind::Add
                } else {
                    EventKind::Update
                };
                enqueue(&controller_name, &queue, &rate_limiter, key, kind, Arc::new(obj), None).await;
            }
            watcher::Event::Delete(obj) => {
                let key = meta_namespace_key(&obj);
                seen.remove(&key);
                enqueue(&controller_name, &queue, &rate_limiter, key, EventKind::Delete, Arc::new(obj), None)
                    .await;
            }
        }
    }

    queue.shut_down();
}

async fn enqueue<K>(
    controller_name: &str,
    queue: &WorkQueue<QueueItem<K>>,
    rate_limiter: &KeyRateLimiter,
    key: String,
    kind: EventKind,
    obj: Arc<K>,
    old_obj: Option<Arc<K>>,
) {
    tracing::trace!(controller_name, key = %key, event_type = kind.as_str(), "enqueuing");
    let template = ItemTemplate {
        key: key.clone(),
        kind,
        obj,
        old_obj,
    };
    let item = new_item(template, 0);
    let delay = rate_limiter.next_delay(&key);
    if delay.is_zero() {
        queue.add(item).await;
    } else {
        queue.add_after(item, delay).await;
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_worker<K>(
    controller_name: String,
    queue: Arc<WorkQueue<QueueItem<K>>>,
    rate_limiter: Arc<KeyRateLimiter>,
    handler: Arc<dyn Handler<K>>,
    async_executor: Option<SharedExecutor>,
    synced: Arc<Mutex<bool>>,
    stop: CancellationToken,
    worker_done: CancellationToken,
) where
    K: Resource<DynamicType = ()> + Clone + Debug + Send + Sync + 'static,
{
    'outer: loop {
        while !*synced.lock() {
            tokio::select! {
                _ = stop.cancelled() => break 'outer,
                _ = tokio::time::sleep(std::time::Duration::from_millis(50)) => {}
            }
        }

        let Some(item) = queue.get().await else { break };
        process_item(&controller_name, &queue, &rate_limiter, &handler, &async_executor, item).await;
    }
    worker_done.cancel();
}

async fn process_item<K>(
    controller_name: &str,
    queue: &Arc<WorkQueue<QueueItem<K>>>,
    rate_limiter: &Arc<KeyRateLimiter>,
    handler: &Arc<dyn Handler<K>>,
    async_executor: &Option<SharedExecutor>,
    item: QueueItem<K>,
) where
    K: Resource<DynamicType = ()> + Clone + Debug + Send + Sync + 'static,
{
    let QueueItem {
        template,
        retry_count,
        status_tx,
        status_rx,
    } = item;

    let ctx = EventContext::with_fields(controller_name, &template.key, template.kind.as_str());

    tokio::spawn(drain_top_level(
        ctx.clone(),
        status_rx,
        RetrySink {
            queue: queue.clone(),
            rate_limiter: rate_limiter.clone(),
            handler: handler.clone(),
            template: template.clone(),
        },
    ));

    dispatch(ctx, template, retry_count, handler.clone(), async_executor.clone(), status_tx).await;
}

async fn dispatch<K>(
    ctx: EventContext,
    template: ItemTemplate<K>,
    retry_count: u32,
    handler: Arc<dyn Handler<K>>,
    async_executor: Option<SharedExecutor>,
    status_tx: mpsc::Sender<EventProcessStatus>,
) where
    K: Resource<DynamicType = ()> + Clone + Debug + Send + Sync + 'static,
{
    let Some(executor) = async_executor else {
        run_handler(ctx, template, retry_count, handler, status_tx).await;
        return;
    };

    let rank = if template.kind == EventKind::Delete {
        EventRank::Delete
    } else {
        match object_generation(template.obj.meta()) {
            Some(g) => EventRank::Generation(g),
            None => {
                tracing::warn!(key = %template.key, "object has no generation, skipping");
                EventProcessStatus::completed().skip_close(status_tx).await;
                return;
            }
        }
    };

    let key = template.key.clone();
    executor
        .submit(&key, rank, ctx, status_tx, move |ctx, tx| {
            Box::pin(async move { run_handler(ctx, template, retry_count, handler, tx).await })
        })
        .await;
}

/// Invokes the handler behind a forwarding channel that stamps every status
/// with the event's actual `retry_count` before it reaches the drain loop
/// (spec.md §3, `EventItem.retryCount`) — handlers report *that* they want a
/// retry via [`EventStatus::Retry`], not *which* retry attempt this is; the
/// queue item is the source of truth for that count.
async fn run_handler<K>(
    ctx: EventContext,
    template: ItemTemplate<K>,
    retry_count: u32,
    handler: Arc<dyn Handler<K>>,
    status_tx: mpsc::Sender<EventProcessStatus>,
) where
    K: Send + Sync + 'static,
{
    let (mid_tx, mid_rx) = mpsc::channel(EVENT_STATUS_CHANNEL_CAPACITY);
    tokio::spawn(forward_with_retry_count(mid_rx, status_tx, retry_count));

    match template.kind {
        EventKind::Add => handler.added(ctx, &template.key, template.obj, mid_tx).await,
        EventKind::Update => {
            let old = template.old_obj.unwrap_or_else(|| template.obj.clone());
            handler.updated(ctx, &template.key, old, template.obj, mid_tx).await
        }
        EventKind::Delete => handler.deleted(ctx, &template.key, template.obj, mid_tx).await,
    }
}

async fn forward_with_retry_count(
    mut rx: mpsc::Receiver<EventProcessStatus>,
    tx: mpsc::Sender<EventProcessStatus>,
    retry_count: u32,
) {
    while let Some(mut status) = rx.recv().await {
        status.retry_count = retry_count;
        if tx.send(status).await.is_err() {
            break;
        }
    }
}

struct RetrySink<K> {
    queue: Arc<WorkQueue<QueueItem<K>>>,
    rate_limiter: Arc<KeyRateLimiter>,
    handler: Arc<dyn Handler<K>>,
    template: ItemTemplate<K>,
}

/// Drains a top-level item's status channel, reacting to `Retry`/
/// `Create-child`/terminal statuses per spec.md §4.2. Exits (and forgets the
/// key's rate-limiter state) once the channel closes.
async fn drain_top_level<K>(
    ctx: EventContext,
    mut rx: mpsc::Receiver<EventProcessStatus>,
    sink: RetrySink<K>,
) where
    K: Send + Sync + 'static,
{
    while let Some(status) = rx.recv().await {
        if matches!(status.status, EventStatus::Terminal(Terminal::Skip)) {
            tracing::trace!(key = %sink.template.key, "event skipped");
            continue;
        }

        if matches!(status.status, EventStatus::Child { .. }) {
            let EventProcessStatus {
                status: EventStatus::Child { ctx: child_ctx, on_status, rx: child_rx },
                ..
            } = status
            else {
                unreachable!("just matched Child above")
            };
            tokio::spawn(drain_child(child_ctx, child_rx, on_status));
            continue;
        }

        if let EventStatus::Retry { after } = status.status {
            if status.retry_count < status.max_retry_count {
                sink.handler.on_status(&ctx, &status);
                let next = new_item(sink.template.clone(), status.retry_count + 1);
                match after {
                    Some(delay) => sink.queue.add_after(next, delay).await,
                    None => sink.queue.add(next).await,
                }
            } else {
                let max_status = EventProcessStatus {
                    status: EventStatus::Terminal(Terminal::MaxRetryReached),
                    ..status
                };
                sink.handler.on_status(&ctx, &max_status);
            }
            continue;
        }

        sink.handler.on_status(&ctx, &status);
    }
    sink.rate_limiter.forget(&sink.template.key);
}

/// Recursive child-channel handling (spec.md §9: "the recursive handling of
/// child channels must be preserved"). Children have no re-runnable queue
/// item behind them, so a child's own `Retry` is reported to its callback
/// but cannot itself be re-enqueued — that is the responsibility of whatever
/// code spawned the child work in the first place.
async fn drain_child(
    ctx: EventContext,
    mut rx: mpsc::Receiver<EventProcessStatus>,
    mut on_status: Option<super::event_status::OnStatusFn>,
) {
    while let Some(status) = rx.recv().await {
        if matches!(status.status, EventStatus::Terminal(Terminal::Skip)) {
            tracing::trace!("child event skipped");
            continue;
        }
        if matches!(status.status, EventStatus::Child { .. }) {
            let EventProcessStatus {
                status: EventStatus::Child { ctx: child_ctx, on_status: grandchild, rx: child_rx },
                ..
            } = status
            else {
                unreachable!("just matched Child above")
            };
            tokio::spawn(drain_child(child_ctx, child_rx, grandchild));
            continue;
        }
        if let Some(cb) = on_status.as_mut() {
            cb(ctx.clone(), status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct CountingHandler {
        calls: AtomicU32,
        terminal_statuses: parking_lot::Mutex<Vec<&'static str>>,
        max_retry_count: u32,
    }

    #[async_trait::async_trait]
    impl Handler<()> for CountingHandler {
        async fn added(&self, _ctx: EventContext, _key: &str, _obj: Arc<()>, status_tx: mpsc::Sender<EventProcessStatus>) {
            let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let eps = EventProcessStatus::completed().with_max_retry(self.max_retry_count);
            if calls <= self.max_retry_count + 1 {
                eps.with_status(EventStatus::Retry { after: None })
                    .send_close(status_tx)
                    .await;
            } else {
                eps.send_close(status_tx).await;
            }
        }

        async fn updated(&self, _ctx: EventContext, _key: &str, _old: Arc<()>, _new: Arc<()>, status_tx: mpsc::Sender<EventProcessStatus>) {
            EventProcessStatus::completed().send_close(status_tx).await;
        }

        async fn deleted(&self, _ctx: EventContext, _key: &str, _obj: Arc<()>, status_tx: mpsc::Sender<EventProcessStatus>) {
            EventProcessStatus::completed().send_close(status_tx).await;
        }

        fn on_status(&self, _ctx: &EventContext, status: &EventProcessStatus) {
            self.terminal_statuses.lock().push(status.status.tag());
        }
    }

    /// Invariant 8 / scenario E5: a handler that always requests `Retry` with
    /// `max_retry_count=5` gets exactly 6 invocations (initial + 5 retries)
    /// and a terminal `MaxRetryReached` `on_status` call. Retries are
    /// re-enqueued with zero delay (no `retryAfter`), so this drives the
    /// queue directly rather than exercising real wall-clock backoff.
    #[tokio::test]
    async fn retry_budget_exhausts_to_max_retry_reached() {
        let handler = Arc::new(CountingHandler {
            calls: AtomicU32::new(0),
            terminal_statuses: parking_lot::Mutex::new(Vec::new()),
            max_retry_count: 5,
        });
        let queue: Arc<WorkQueue<QueueItem<()>>> = Arc::new(WorkQueue::new());
        // Marking shutdown up front doesn't stop `add()` from accepting
        // retries; it only makes `get()` return `None` once the queue is
        // both empty and shut down, so the loop below terminates cleanly
        // once the retry budget is exhausted instead of blocking forever.
        queue.shut_down();
        let rate_limiter = Arc::new(KeyRateLimiter::new());
        let template = ItemTemplate {
            key: "ns/name".to_string(),
            kind: EventKind::Add,
            obj: Arc::new(()),
            old_obj: None,
        };

        let mut pending = Some(new_item(template.clone(), 0));
        // One initial invocation plus up to `max_retry_count` retries.
        for _ in 0..=handler.max_retry_count {
            let QueueItem { template, retry_count, status_tx, status_rx } = match pending.take() {
                Some(item) => item,
                None => break,
            };
            let ctx = EventContext::new();
            run_handler(ctx.clone(), template.clone(), retry_count, handler.clone(), status_tx).await;
            drain_top_level(
                ctx,
                status_rx,
                RetrySink {
                    queue: queue.clone(),
                    rate_limiter: rate_limiter.clone(),
                    handler: handler.clone(),
                    template,
                },
            )
            .await;
            pending = queue.get().await;
        }

        assert_eq!(handler.calls.load(Ordering::SeqCst), 6);
        let statuses = handler.terminal_statuses.lock();
        assert_eq!(statuses.last(), Some(&"MaxRetryReached"));
        assert!(pending.is_none(), "no further retry should be queued past the budget");
    }
}
