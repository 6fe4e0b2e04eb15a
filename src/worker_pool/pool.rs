//! A generic per-language worker pool: one actor task per language, each
//! processing exactly one message at a time from a bounded FIFO queue, with
//! per-task timeout, cancellation, and restart-with-backoff on fatal
//! backend errors.

use super::backend::LanguageWorkerBackend;
use super::types::{PoolErrorFactory, WorkerPoolConfig};
use crate::cancellation::CancellationToken;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

struct QueuedTask<B: LanguageWorkerBackend> {
    id: u64,
    request: B::Request,
    reply: oneshot::Sender<Result<B::Response, B::Error>>,
    partial: Option<mpsc::UnboundedSender<B::Response>>,
    cancel: CancellationToken,
}

enum Command<B: LanguageWorkerBackend> {
    Submit(QueuedTask<B>),
    CancelQueued(u64),
    Shutdown(oneshot::Sender<()>),
}

enum WorkerExit {
    ShutdownRequested,
    ChannelClosed,
    Crashed,
}

struct WorkerHandle<B: LanguageWorkerBackend> {
    sender: mpsc::UnboundedSender<Command<B>>,
    ready: Arc<AtomicBool>,
    queue_length: Arc<AtomicUsize>,
    next_task_id: Arc<AtomicU64>,
    max_queue_size: usize,
    supervisor: JoinHandle<()>,
}

/// Hosts one worker per language, monomorphized over a single backend type.
/// Translation and TTS each get their own `WorkerPool` instance.
pub struct WorkerPool<B: LanguageWorkerBackend> {
    workers: HashMap<String, WorkerHandle<B>>,
    config: WorkerPoolConfig,
}

impl<B: LanguageWorkerBackend> WorkerPool<B> {
    /// Spawns one worker per entry in `languages`, each built fresh from
    /// `factory` (also used to rebuild the backend on restart). Awaits every
    /// worker's first `initialize()` before returning; any failure there is
    /// surfaced to the caller without starting the pool.
    pub async fn new(
        languages: Vec<String>,
        factory: Arc<dyn Fn() -> B + Send + Sync>,
        config: WorkerPoolConfig,
    ) -> Result<Self, B::Error> {
        let mut workers = HashMap::new();
        let mut init_acks = Vec::new();

        for language in languages {
            let (sender, receiver) = mpsc::unbounded_channel();
            let ready = Arc::new(AtomicBool::new(false));
            let queue_length = Arc::new(AtomicUsize::new(0));
            let (init_tx, init_rx) = oneshot::channel();
            let factory = Arc::clone(&factory);
            let ready_clone = Arc::clone(&ready);
            let queue_length_clone = Arc::clone(&queue_length);
            let task_timeout = config.task_timeout();
            let restart_delay = config.restart_delay();
            let max_restart_attempts = config.max_restart_attempts;
            let lang_for_log = language.clone();

            let supervisor = tokio::spawn(async move {
                supervise::<B>(
                    lang_for_log,
                    factory,
                    receiver,
                    ready_clone,
                    queue_length_clone,
                    task_timeout,
                    restart_delay,
                    max_restart_attempts,
                    Some(init_tx),
                )
                .await;
            });

            workers.insert(
                language,
                WorkerHandle {
                    sender,
                    ready,
                    queue_length,
                    next_task_id: Arc::new(AtomicU64::new(0)),
                    max_queue_size: config.max_queue_size,
                    supervisor,
                },
            );
            init_acks.push(init_rx);
        }

        for ack in init_acks {
            match ack.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(B::Error::worker("worker exited before initializing".into())),
            }
        }

        Ok(Self { workers, config })
    }

    pub fn is_ready(&self, language: &str) -> bool {
        self.workers
            .get(language)
            .map(|w| w.ready.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    pub fn queue_length(&self, language: &str) -> usize {
        self.workers
            .get(language)
            .map(|w| w.queue_length.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Submits one request to `language`'s worker and awaits its response.
    /// Fails fast with `QueueFull` if admitting this task would exceed
    /// `max_queue_size` (queued + in-flight): a worker configured with
    /// `max_queue_size = k` admits at most `k` concurrent submissions, so
    /// `max_queue_size = 0` rejects every submit, not just the second.
    pub async fn submit(
        &self,
        language: &str,
        request: B::Request,
        cancel: CancellationToken,
    ) -> Result<B::Response, B::Error> {
        self.submit_inner(language, request, None, cancel).await
    }

    /// Like `submit`, but also streams intermediate partial responses to
    /// `partial` as the backend produces them.
    pub async fn submit_streaming(
        &self,
        language: &str,
        request: B::Request,
        partial: mpsc::UnboundedSender<B::Response>,
        cancel: CancellationToken,
    ) -> Result<B::Response, B::Error> {
        self.submit_inner(language, request, Some(partial), cancel).await
    }

    async fn submit_inner(
        &self,
        language: &str,
        request: B::Request,
        partial: Option<mpsc::UnboundedSender<B::Response>>,
        cancel: CancellationToken,
    ) -> Result<B::Response, B::Error> {
        let worker = self
            .workers
            .get(language)
            .ok_or_else(|| B::Error::worker(format!("no worker configured for language {language}")))?;

        if cancel.is_cancelled() {
            return Err(B::Error::cancelled());
        }
        if !worker.ready.load(Ordering::SeqCst) {
            return Err(B::Error::worker("worker not ready".into()));
        }

        let admitted = worker
            .queue_length
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                if current >= worker.max_queue_size {
                    None
                } else {
                    Some(current + 1)
                }
            })
            .is_ok();
        if !admitted {
            return Err(B::Error::queue_full());
        }

        let id = worker.next_task_id.fetch_add(1, Ordering::SeqCst);
        let (reply_tx, reply_rx) = oneshot::channel();
        let task = QueuedTask {
            id,
            request,
            reply: reply_tx,
            partial,
            cancel: cancel.clone(),
        };

        if worker.sender.send(Command::Submit(task)).is_err() {
            worker.queue_length.fetch_sub(1, Ordering::SeqCst);
            return Err(B::Error::worker("worker actor is gone".into()));
        }

        tokio::select! {
            result = reply_rx => result.map_err(|_| B::Error::worker("worker dropped the reply channel".into()))?,
            _ = cancel.cancelled() => {
                let _ = worker.sender.send(Command::CancelQueued(id));
                Err(B::Error::cancelled())
            }
        }
    }

    /// Submits the same request to every configured language concurrently,
    /// returning a `language -> result` map in no particular completion
    /// order (callers needing first-done-first-out should drive `submit`
    /// themselves against a shared `mpsc` sink).
    pub async fn submit_all(
        &self,
        requests: HashMap<String, B::Request>,
        cancel: CancellationToken,
    ) -> HashMap<String, Result<B::Response, B::Error>> {
        let mut handles = Vec::new();
        for (language, request) in requests {
            let cancel = cancel.clone();
            handles.push(async move {
                let result = self.submit(&language, request, cancel).await;
                (language, result)
            });
        }
        futures_util::future::join_all(handles)
            .await
            .into_iter()
            .collect()
    }

    /// Requests a graceful shutdown of every worker, waiting up to 5s per
    /// worker for acknowledgment before abandoning it.
    pub async fn shutdown(self) {
        let mut acks = Vec::new();
        for (language, worker) in self.workers {
            let (ack_tx, ack_rx) = oneshot::channel();
            if worker.sender.send(Command::Shutdown(ack_tx)).is_err() {
                continue;
            }
            acks.push((language, ack_rx, worker.supervisor));
        }
        for (language, ack_rx, supervisor) in acks {
            let waited = tokio::time::timeout(std::time::Duration::from_secs(5), ack_rx).await;
            if waited.is_err() {
                warn!(language, "worker did not acknowledge shutdown within 5s, aborting");
                supervisor.abort();
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn supervise<B: LanguageWorkerBackend>(
    language: String,
    factory: Arc<dyn Fn() -> B + Send + Sync>,
    mut commands: mpsc::UnboundedReceiver<Command<B>>,
    ready: Arc<AtomicBool>,
    queue_length: Arc<AtomicUsize>,
    task_timeout: std::time::Duration,
    restart_delay: std::time::Duration,
    max_restart_attempts: u32,
    mut init_ack: Option<oneshot::Sender<Result<(), B::Error>>>,
) {
    let mut restart_count = 0u32;
    loop {
        let mut backend = factory();
        let init_result = backend.initialize().await;
        if let Some(ack) = init_ack.take() {
            let forward = match &init_result {
                Ok(()) => Ok(()),
                Err(_) => Err(B::Error::worker("initialization failed".into())),
            };
            let _ = ack.send(forward);
        }
        match init_result {
            Ok(()) => {
                ready.store(true, Ordering::SeqCst);
                info!(language, "worker initialized");
            }
            Err(e) => {
                error!(language, error = %e, "worker failed to initialize");
                ready.store(false, Ordering::SeqCst);
                return;
            }
        }

        let exit = run_worker(&mut backend, &mut commands, &ready, &queue_length, task_timeout).await;
        ready.store(false, Ordering::SeqCst);

        match exit {
            WorkerExit::ShutdownRequested | WorkerExit::ChannelClosed => {
                let _ = backend.shutdown().await;
                return;
            }
            WorkerExit::Crashed => {
                if restart_count >= max_restart_attempts {
                    error!(language, "worker crashed and exhausted restart attempts, giving up");
                    return;
                }
                restart_count += 1;
                warn!(language, attempt = restart_count, "worker crashed, restarting after backoff");
                tokio::time::sleep(restart_delay).await;
            }
        }
    }
}

async fn run_worker<B: LanguageWorkerBackend>(
    backend: &mut B,
    commands: &mut mpsc::UnboundedReceiver<Command<B>>,
    ready: &Arc<AtomicBool>,
    queue_length: &Arc<AtomicUsize>,
    task_timeout: std::time::Duration,
) -> WorkerExit {
    let mut queue: VecDeque<QueuedTask<B>> = VecDeque::new();

    loop {
        if let Some(next) = queue.pop_front() {
            if next.cancel.is_cancelled() {
                let _ = next.reply.send(Err(B::Error::cancelled()));
                queue_length.fetch_sub(1, Ordering::SeqCst);
                continue;
            }

            let handle_fut = backend.handle(next.request, next.partial, next.cancel.clone());
            let result = tokio::select! {
                r = tokio::time::timeout(task_timeout, handle_fut) => match r {
                    Ok(inner) => inner,
                    Err(_) => Err(B::Error::timeout()),
                },
                _ = next.cancel.cancelled() => Err(B::Error::cancelled()),
            };

            let fatal = result.as_ref().err().map(|e| e.is_fatal()).unwrap_or(false);
            let _ = next.reply.send(result);
            queue_length.fetch_sub(1, Ordering::SeqCst);

            if fatal {
                ready.store(false, Ordering::SeqCst);
                while let Some(t) = queue.pop_front() {
                    let _ = t.reply.send(Err(B::Error::worker("worker crashed".into())));
                    queue_length.fetch_sub(1, Ordering::SeqCst);
                }
                return WorkerExit::Crashed;
            }
            continue;
        }

        match commands.recv().await {
            None => return WorkerExit::ChannelClosed,
            Some(Command::Submit(task)) => queue.push_back(task),
            Some(Command::CancelQueued(id)) => {
                if let Some(pos) = queue.iter().position(|t| t.id == id) {
                    let removed = queue.remove(pos).expect("position just found");
                    let _ = removed.reply.send(Err(B::Error::cancelled()));
                    queue_length.fetch_sub(1, Ordering::SeqCst);
                }
            }
            Some(Command::Shutdown(ack)) => {
                while let Some(t) = queue.pop_front() {
                    let _ = t.reply.send(Err(B::Error::worker("worker pool shutting down".into())));
                    queue_length.fetch_sub(1, Ordering::SeqCst);
                }
                let _ = ack.send(());
                return WorkerExit::ShutdownRequested;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;
    use thiserror::Error;

    #[derive(Debug, Error)]
    enum TestError {
        #[error("queue full")]
        QueueFull,
        #[error("timeout")]
        Timeout,
        #[error("cancelled")]
        Cancelled,
        #[error("worker: {0}")]
        Worker(String),
        #[error("fatal")]
        Fatal,
    }

    impl PoolErrorFactory for TestError {
        fn queue_full() -> Self {
            TestError::QueueFull
        }
        fn timeout() -> Self {
            TestError::Timeout
        }
        fn cancelled() -> Self {
            TestError::Cancelled
        }
        fn worker(reason: String) -> Self {
            TestError::Worker(reason)
        }
        fn is_fatal(&self) -> bool {
            matches!(self, TestError::Fatal)
        }
    }

    struct EchoBackend {
        delay: std::time::Duration,
        fail_next: bool,
    }

    #[async_trait]
    impl LanguageWorkerBackend for EchoBackend {
        type Request = u32;
        type Response = u32;
        type Error = TestError;

        async fn initialize(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }

        async fn handle(
            &mut self,
            request: Self::Request,
            _partial: Option<mpsc::UnboundedSender<Self::Response>>,
            _cancel: CancellationToken,
        ) -> Result<Self::Response, Self::Error> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail_next {
                return Err(TestError::Fatal);
            }
            Ok(request * 2)
        }
    }

    fn test_config() -> WorkerPoolConfig {
        WorkerPoolConfig {
            max_queue_size: 2,
            task_timeout_ms: 100,
            max_restart_attempts: 2,
            restart_delay_ms: 10,
        }
    }

    #[tokio::test]
    async fn submit_echoes_response() {
        let factory: Arc<dyn Fn() -> EchoBackend + Send + Sync> = Arc::new(|| EchoBackend {
            delay: std::time::Duration::ZERO,
            fail_next: false,
        });
        let pool = WorkerPool::new(vec!["es".to_string()], factory, test_config())
            .await
            .unwrap();
        let result = pool.submit("es", 21, CancellationToken::new()).await.unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn queue_full_rejects_beyond_capacity() {
        let factory: Arc<dyn Fn() -> EchoBackend + Send + Sync> = Arc::new(|| EchoBackend {
            delay: std::time::Duration::from_millis(200),
            fail_next: false,
        });
        let pool = Arc::new(
            WorkerPool::new(vec!["es".to_string()], factory, test_config())
                .await
                .unwrap(),
        );

        let mut handles = Vec::new();
        for i in 0..3u32 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move {
                pool.submit("es", i, CancellationToken::new()).await
            }));
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let fourth = pool.submit("es", 99, CancellationToken::new()).await;
        assert!(matches!(fourth, Err(TestError::QueueFull)));

        for h in handles {
            let _ = h.await;
        }
    }

    #[tokio::test]
    async fn cancellation_before_dispatch_short_circuits() {
        let factory: Arc<dyn Fn() -> EchoBackend + Send + Sync> = Arc::new(|| EchoBackend {
            delay: std::time::Duration::ZERO,
            fail_next: false,
        });
        let pool = WorkerPool::new(vec!["es".to_string()], factory, test_config())
            .await
            .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = pool.submit("es", 1, cancel).await;
        assert!(matches!(result, Err(TestError::Cancelled)));
    }

    #[tokio::test]
    async fn timeout_surfaces_on_slow_backend() {
        let factory: Arc<dyn Fn() -> EchoBackend + Send + Sync> = Arc::new(|| EchoBackend {
            delay: std::time::Duration::from_millis(500),
            fail_next: false,
        });
        let pool = WorkerPool::new(vec!["es".to_string()], factory, test_config())
            .await
            .unwrap();
        let result = pool.submit("es", 1, CancellationToken::new()).await;
        assert!(matches!(result, Err(TestError::Timeout)));
    }

    #[tokio::test]
    async fn fatal_error_drains_queue_and_restarts() {
        static ATTEMPTS: AtomicU32 = AtomicU32::new(0);
        let factory: Arc<dyn Fn() -> EchoBackend + Send + Sync> = Arc::new(|| {
            let attempt = ATTEMPTS.fetch_add(1, Ordering::SeqCst);
            EchoBackend {
                delay: std::time::Duration::ZERO,
                fail_next: attempt == 0,
            }
        });
        let pool = WorkerPool::new(vec!["es".to_string()], factory, test_config())
            .await
            .unwrap();
        let first = pool.submit("es", 1, CancellationToken::new()).await;
        assert!(matches!(first, Err(TestError::Fatal)));

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let second = pool.submit("es", 5, CancellationToken::new()).await.unwrap();
        assert_eq!(second, 10);
    }
}
