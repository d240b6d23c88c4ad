use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::{Instant, MissedTickBehavior};

use tidesync_core::types::{Origin, OriginClass, ServiceState, SyncStatus};
use tidesync_core::{paths, Config, YamlMetadataStore};
use tidesync_sync::{
    BatchCompletion, DeltaCompletion, FileLifecycleSource, FsLocalProcessor, FsRemote,
    RegisterOutcome, ServiceStatus, SyncError, SyncService,
};

use crate::error::{io_err, DaemonError};
use crate::events::{stats_task, BroadcastObserver, EventStats};
use crate::paths::{socket_path, DRAIN_BATCH};
use crate::protocol::{parse_origin, DaemonRequest, DaemonResponse, StatusPayload};

type Reply<T> = oneshot::Sender<Result<T, String>>;

/// Messages handled by the engine task, which is the only owner of the
/// [`SyncService`].
enum Command {
    Status {
        respond_to: oneshot::Sender<ServiceStatus>,
    },
    Sync {
        source: &'static str,
        respond_to: Reply<SyncSummary>,
    },
    Register {
        origin: Origin,
        respond_to: Reply<(RegisterOutcome, SyncSummary)>,
    },
    Unregister {
        origin: Origin,
        respond_to: Reply<()>,
    },
    Resync {
        origin: Origin,
        respond_to: Reply<SyncSummary>,
    },
    SetEnabled {
        enabled: bool,
        respond_to: Reply<ServiceStatus>,
    },
    Tick,
    BatchDone(BatchCompletion),
    DeltaDone(DeltaCompletion),
}

/// Outcome of one queue drain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSummary {
    pub source: String,
    /// Changes admitted by the listing or delta that preceded the drain.
    pub queued: usize,
    pub applied: usize,
    pub busy: usize,
    pub failed: usize,
    /// Changes still queued afterwards.
    pub pending: usize,
    pub state: ServiceState,
    pub duration_ms: u64,
}

/// Remote fetches currently running outside the engine task.
#[derive(Debug, Default)]
struct InFlight {
    batches: HashSet<Origin>,
    delta: bool,
}

struct Engine {
    service: SyncService,
    in_flight: InFlight,
    commands: mpsc::Sender<Command>,
}

impl Engine {
    async fn handle(&mut self, command: Command) {
        match command {
            Command::Status { respond_to } => {
                let _ = respond_to.send(self.service.status());
            }
            Command::Sync { source, respond_to } => {
                let result = self.sync_now(source).await.map_err(|e| e.to_string());
                let _ = respond_to.send(result);
            }
            Command::Register { origin, respond_to } => {
                let started = Instant::now();
                let result = match self.service.register_origin(&origin).await {
                    Ok(outcome) => {
                        let queued = self.service.pending_changes();
                        Ok((outcome, self.drain("register", queued, started).await))
                    }
                    Err(err) => Err(err.to_string()),
                };
                let _ = respond_to.send(result);
            }
            Command::Unregister { origin, respond_to } => {
                let result = self
                    .service
                    .unregister_origin(&origin)
                    .await
                    .map_err(|e| e.to_string());
                let _ = respond_to.send(result);
            }
            Command::Resync { origin, respond_to } => {
                let started = Instant::now();
                let result = match self.service.full_resync(&origin).await {
                    Ok(queued) => Ok(self.drain("resync", queued, started).await),
                    Err(err) => Err(err.to_string()),
                };
                let _ = respond_to.send(result);
            }
            Command::SetEnabled {
                enabled,
                respond_to,
            } => {
                let result = self
                    .service
                    .set_sync_enabled(enabled)
                    .await
                    .map(|()| self.service.status())
                    .map_err(|e| e.to_string());
                let _ = respond_to.send(result);
            }
            Command::Tick => self.on_tick().await,
            Command::BatchDone(completion) => {
                let started = Instant::now();
                let origin = completion.ticket.origin.origin.clone();
                self.in_flight.batches.remove(&origin);
                match self.service.commit_batch(completion) {
                    Ok(queued) => self.drain_and_log("batch", queued, started).await,
                    Err(err) => tracing::warn!(origin = %origin, error = %err, "batch sync failed"),
                }
            }
            Command::DeltaDone(completion) => {
                let started = Instant::now();
                self.in_flight.delta = false;
                match self.service.commit_delta(completion) {
                    Ok(queued) => self.drain_and_log("delta", queued, started).await,
                    Err(err) => tracing::warn!(error = %err, "delta sync failed"),
                }
            }
        }
    }

    /// Poll lifecycle, start any remote fetches not already running, then
    /// drain whatever is queued.
    async fn on_tick(&mut self) {
        let started = Instant::now();
        if let Err(err) = self.service.poll_lifecycle().await {
            tracing::warn!(error = %err, "lifecycle poll failed");
        }
        self.spawn_batches().await;
        self.spawn_delta();
        self.drain_and_log("timer", 0, started).await;
    }

    async fn spawn_batches(&mut self) {
        let pending: Vec<Origin> = self
            .service
            .origins()
            .into_iter()
            .filter(|(_, record)| record.class == OriginClass::PendingBatch)
            .map(|(origin, _)| origin)
            .filter(|origin| !self.in_flight.batches.contains(origin))
            .collect();

        for origin in pending {
            let ticket = match self.service.start_batch(&origin).await {
                Ok(Some(ticket)) => ticket,
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!(origin = %origin, error = %err, "could not start batch sync");
                    continue;
                }
            };
            self.in_flight.batches.insert(origin);
            let remote = self.service.remote();
            let tx = self.commands.clone();
            tokio::spawn(async move {
                let completion = SyncService::fetch_batch_listing(remote.as_ref(), ticket).await;
                let _ = tx.send(Command::BatchDone(completion)).await;
            });
        }
    }

    fn spawn_delta(&mut self) {
        if self.in_flight.delta {
            return;
        }
        let ticket = match self.service.start_incremental() {
            Ok(Some(ticket)) => ticket,
            Ok(None) => return,
            Err(err) => {
                tracing::debug!(error = %err, "delta sync skipped");
                return;
            }
        };
        self.in_flight.delta = true;
        let remote = self.service.remote();
        let tx = self.commands.clone();
        tokio::spawn(async move {
            let completion = SyncService::fetch_delta(remote.as_ref(), ticket).await;
            let _ = tx.send(Command::DeltaDone(completion)).await;
        });
    }

    /// Inline sync for socket requests: pending batches, then one delta,
    /// then drain.
    async fn sync_now(&mut self, source: &'static str) -> Result<SyncSummary, SyncError> {
        let started = Instant::now();
        if let Err(err) = self.service.poll_lifecycle().await {
            tracing::warn!(error = %err, "lifecycle poll failed");
        }
        let mut queued = self.service.sync_pending_batches().await?;
        queued += self.service.run_incremental_sync().await?;
        Ok(self.drain(source, queued, started).await)
    }

    async fn drain_and_log(&mut self, source: &'static str, queued: usize, started: Instant) {
        let summary = self.drain(source, queued, started).await;
        if summary.applied > 0 || summary.failed > 0 {
            tracing::info!(
                source = %summary.source,
                applied = summary.applied,
                failed = summary.failed,
                pending = summary.pending,
                duration_ms = summary.duration_ms,
                "sync complete",
            );
        }
    }

    /// Apply queued changes until the queue empties, a file is busy, the
    /// service leaves `Ok`, or `DRAIN_BATCH` is reached.
    async fn drain(
        &mut self,
        source: &'static str,
        queued: usize,
        started: Instant,
    ) -> SyncSummary {
        let (mut applied, mut busy, mut failed) = (0, 0, 0);
        for _ in 0..DRAIN_BATCH {
            match self.service.process_next_remote_change().await {
                Ok(outcome) => match (outcome.status, outcome.url) {
                    (SyncStatus::Ok, Some(_)) => applied += 1,
                    (SyncStatus::FileBusy, _) => {
                        busy += 1;
                        break;
                    }
                    _ => break,
                },
                Err(err) => {
                    failed += 1;
                    tracing::warn!(error = %err, "remote change not applied");
                    if self.service.service_state() != ServiceState::Ok {
                        break;
                    }
                }
            }
        }
        SyncSummary {
            source: source.to_string(),
            queued,
            applied,
            busy,
            failed,
            pending: self.service.pending_changes(),
            state: self.service.service_state(),
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Client side of the engine task's command channel.
#[derive(Clone)]
struct EngineHandle {
    tx: mpsc::Sender<Command>,
}

impl EngineHandle {
    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, DaemonError> {
        let (respond_to, rx) = oneshot::channel();
        self.tx
            .send(build(respond_to))
            .await
            .map_err(|_| DaemonError::ChannelClosed("engine command channel"))?;
        rx.await
            .map_err(|_| DaemonError::ChannelClosed("engine response channel"))
    }

    async fn status(&self) -> Result<ServiceStatus, DaemonError> {
        self.call(|respond_to| Command::Status { respond_to }).await
    }

    async fn sync(&self, source: &'static str) -> Result<Result<SyncSummary, String>, DaemonError> {
        self.call(|respond_to| Command::Sync { source, respond_to })
            .await
    }
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Wire the engine to the directory-backed remote, the local tree and the
/// YAML metadata store under `home`.
pub fn build_service(home: &Path, config: &Config) -> Result<SyncService, DaemonError> {
    let remote = Arc::new(FsRemote::open(config.remote_root_at(home))?);
    let local = Arc::new(FsLocalProcessor::new(
        config.local_root_at(home),
        paths::hashes_dir(home),
    ));
    let store = YamlMetadataStore::open_at(home)?;
    let lifecycle = Arc::new(FileLifecycleSource::at(home));
    Ok(
        SyncService::new(remote, local, Box::new(store), config.sync_enabled)
            .with_lifecycle(lifecycle),
    )
}

/// Run the daemon runtime.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    paths::ensure_root(&home)?;
    let config = Config::load_at(&home)?;

    let (events_tx, events_rx) = broadcast::channel(256);
    let mut service = build_service(&home, &config)?;
    service.add_observer(Arc::new(BroadcastObserver::new(events_tx)));

    let stats = Arc::new(RwLock::new(EventStats::default()));
    let started_at_unix = unix_seconds_now();

    let (command_tx, command_rx) = mpsc::channel::<Command>(64);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let engine_handle = {
        let shutdown = shutdown_tx.clone();
        let tx = command_tx.clone();
        tokio::spawn(async move {
            let result = engine_task(service, tx, command_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let timer_handle = {
        let shutdown = shutdown_tx.clone();
        let tx = command_tx.clone();
        let period = config.poll_interval();
        tokio::spawn(async move {
            let result = poll_timer_task(period, tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let stats_handle = {
        let shutdown = shutdown_tx.clone();
        let stats = stats.clone();
        tokio::spawn(async move {
            let result = stats_task(stats, events_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let engine = EngineHandle {
            tx: command_tx.clone(),
        };
        let stats = stats.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                home,
                engine,
                stats,
                shutdown.clone(),
                shutdown.subscribe(),
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };
    drop(command_tx);

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!(
                            "ctrl-c handler failed: {err}"
                        ))),
                    }
                }
            }
        })
    };

    tracing::info!(
        home = %home.display(),
        poll_interval_secs = config.poll_interval().as_secs(),
        "tidesync daemon started",
    );

    let (engine_result, timer_result, stats_result, socket_result, signal_result) = tokio::join!(
        engine_handle,
        timer_handle,
        stats_handle,
        socket_handle,
        signal_handle
    );

    handle_join("engine", engine_result)?;
    handle_join("poll_timer", timer_result)?;
    handle_join("event_stats", stats_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

/// Serve one request in-process when no daemon is running.
///
/// The engine is built, handles `request` and is torn down, so origin
/// records are flushed before this returns.
pub fn execute_offline(home: &Path, request: DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(async {
        paths::ensure_root(home)?;
        let config = Config::load_at(home)?;
        let service = build_service(home, &config)?;

        let (tx, rx) = mpsc::channel::<Command>(16);
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let engine = tokio::spawn(engine_task(service, tx.clone(), rx, shutdown_tx.subscribe()));

        let stats = RwLock::new(EventStats::default());
        let handle = EngineHandle { tx };
        let response =
            handle_request(&handle, &stats, &shutdown_tx, unix_seconds_now(), request).await;

        let _ = shutdown_tx.send(());
        handle_join("engine", engine.await)?;
        Ok::<_, DaemonError>(response)
    })
}

async fn engine_task(
    service: SyncService,
    commands: mpsc::Sender<Command>,
    mut rx: mpsc::Receiver<Command>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut engine = Engine {
        service,
        in_flight: InFlight::default(),
        commands,
    };

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            command = rx.recv() => match command {
                Some(command) => engine.handle(command).await,
                None => break,
            },
        }
    }

    engine.service.teardown()?;
    Ok(())
}

async fn poll_timer_task(
    period: Duration,
    tx: mpsc::Sender<Command>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                if tx.send(Command::Tick).await.is_err() {
                    break;
                }
            }
        }
    }
    Ok(())
}

async fn socket_server_task(
    home: PathBuf,
    engine: EngineHandle,
    stats: Arc<RwLock<EventStats>>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let engine = engine.clone();
                let stats = stats.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    let served = handle_socket_client(
                        stream,
                        engine,
                        stats,
                        shutdown_tx,
                        started_at_unix,
                    )
                    .await;
                    if let Err(err) = served {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    engine: EngineHandle,
    stats: Arc<RwLock<EventStats>>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let stopping = request.cmd == "stop";
        let response =
            handle_request(&engine, &stats, &shutdown_tx, started_at_unix, request).await;
        write_response(&mut writer, &response).await?;
        if stopping {
            break;
        }
    }

    Ok(())
}

async fn handle_request(
    engine: &EngineHandle,
    stats: &RwLock<EventStats>,
    shutdown_tx: &broadcast::Sender<()>,
    started_at_unix: u64,
    request: DaemonRequest,
) -> DaemonResponse {
    let origin = request.origin.as_deref().map(parse_origin);
    let result = match (request.cmd.as_str(), origin) {
        ("status", _) => match engine.status().await {
            Ok(status) => {
                let stats = stats.read().await.clone();
                Ok(status_payload(status, stats, started_at_unix))
            }
            Err(err) => Err(err.to_string()),
        },
        ("sync", _) => flatten(engine.sync("socket").await).map(|summary| json!(summary)),
        ("register", Some(origin)) => flatten(
            engine
                .call(|respond_to| Command::Register { origin, respond_to })
                .await,
        )
        .map(|(outcome, summary)| json!({ "outcome": outcome, "summary": summary })),
        ("unregister", Some(origin)) => {
            let label = origin.to_string();
            flatten(
                engine
                    .call(|respond_to| Command::Unregister { origin, respond_to })
                    .await,
            )
            .map(|()| json!({ "unregistered": label }))
        }
        ("resync", Some(origin)) => flatten(
            engine
                .call(|respond_to| Command::Resync { origin, respond_to })
                .await,
        )
        .map(|summary| json!(summary)),
        (cmd @ ("enable" | "disable"), _) => {
            let enabled = cmd == "enable";
            flatten(
                engine
                    .call(|respond_to| Command::SetEnabled {
                        enabled,
                        respond_to,
                    })
                    .await,
            )
            .map(|status| json!(status))
        }
        ("stop", _) => {
            let _ = shutdown_tx.send(());
            Ok(json!({ "stopping": true }))
        }
        (cmd @ ("register" | "unregister" | "resync"), None) => {
            Err(format!("command '{cmd}' requires an origin"))
        }
        (other, _) => Err(format!("unknown command '{other}'")),
    };

    match result {
        Ok(data) => DaemonResponse::ok(data),
        Err(message) => DaemonResponse::error(message),
    }
}

fn flatten<T>(result: Result<Result<T, String>, DaemonError>) -> Result<T, String> {
    result.map_err(|e| e.to_string())?
}

fn status_payload(service: ServiceStatus, stats: EventStats, started_at_unix: u64) -> Value {
    json!(StatusPayload {
        running: true,
        pid: std::process::id(),
        started_at_unix,
        service,
        stats,
    })
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

pub(crate) fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;
    use tidesync_core::types::{FileUrl, ResourceId};
    use tidesync_sync::RemoteApi;

    struct Fixture {
        home: TempDir,
        remote: Arc<FsRemote>,
        local: Arc<FsLocalProcessor>,
        engine: EngineHandle,
        stats: Arc<RwLock<EventStats>>,
        shutdown_tx: broadcast::Sender<()>,
        task: tokio::task::JoinHandle<Result<(), DaemonError>>,
    }

    impl Fixture {
        fn start(config: Config) -> Self {
            let home = TempDir::new().expect("home");
            let remote =
                Arc::new(FsRemote::open(config.remote_root_at(home.path())).expect("remote"));
            let local = Arc::new(FsLocalProcessor::new(
                config.local_root_at(home.path()),
                paths::hashes_dir(home.path()),
            ));
            let store = YamlMetadataStore::open_at(home.path()).expect("store");
            let service = SyncService::new(
                remote.clone(),
                local.clone(),
                Box::new(store),
                config.sync_enabled,
            )
            .with_lifecycle(Arc::new(FileLifecycleSource::at(home.path())));
            let (tx, rx) = mpsc::channel(16);
            let (shutdown_tx, _) = broadcast::channel(4);
            let task = tokio::spawn(engine_task(service, tx.clone(), rx, shutdown_tx.subscribe()));
            Self {
                home,
                remote,
                local,
                engine: EngineHandle { tx },
                stats: Arc::new(RwLock::new(EventStats::default())),
                shutdown_tx,
                task,
            }
        }

        async fn request(&self, cmd: &str, origin: Option<&str>) -> DaemonResponse {
            let request = DaemonRequest {
                cmd: cmd.to_string(),
                origin: origin.map(str::to_string),
            };
            handle_request(&self.engine, &self.stats, &self.shutdown_tx, 0, request).await
        }

        async fn notes_directory(&self) -> ResourceId {
            let root = self
                .remote
                .find_directory(None, "tidesync")
                .await
                .expect("find root")
                .expect("sync root");
            self.remote
                .find_directory(Some(&root), "notes")
                .await
                .expect("find notes")
                .expect("notes dir")
        }

        fn local_file(&self, name: &str) -> PathBuf {
            self.local.resolve(&notes_file(name)).expect("resolve")
        }

        async fn wait_for_file(&self, name: &str) -> PathBuf {
            let path = self.local_file(name);
            for _ in 0..100 {
                if path.exists() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            path
        }

        async fn stop(self) -> TempDir {
            let _ = self.shutdown_tx.send(());
            self.task.await.expect("join").expect("engine");
            self.home
        }
    }

    fn notes_file(name: &str) -> FileUrl {
        FileUrl::new(Origin::for_app("notes"), name)
    }

    #[tokio::test]
    async fn register_then_sync_applies_remote_file() {
        let fx = Fixture::start(Config::default());

        let registered = fx.request("register", Some("notes")).await;
        assert!(registered.ok, "{:?}", registered.error);
        assert_eq!(registered.data.as_ref().expect("data")["outcome"], "registered");

        let dir = fx.notes_directory().await;
        fx.remote.put_file(&dir, "todo.txt", b"milk").expect("put");

        let synced = fx.request("sync", None).await;
        assert!(synced.ok, "{:?}", synced.error);
        let summary = synced.data.expect("summary");
        assert_eq!(summary["queued"], 1);
        assert_eq!(summary["applied"], 1);
        assert_eq!(summary["pending"], 0);
        assert_eq!(fs::read(fx.local_file("todo.txt")).expect("read"), b"milk");

        let again = fx.request("register", Some("app://notes/")).await;
        assert_eq!(again.data.expect("data")["outcome"], "already_registered");
        fx.stop().await;
    }

    #[tokio::test]
    async fn timer_tick_fetches_delta_in_background() {
        let fx = Fixture::start(Config::default());
        assert!(fx.request("register", Some("notes")).await.ok);
        let dir = fx.notes_directory().await;
        fx.remote.put_file(&dir, "a.txt", b"a").expect("put");

        fx.engine.tx.send(Command::Tick).await.expect("tick");

        let path = fx.wait_for_file("a.txt").await;
        assert_eq!(fs::read(&path).expect("applied by delta"), b"a");
        let status = fx.engine.status().await.expect("status");
        assert_eq!(status.pending_changes, 0);
        fx.stop().await;
    }

    #[tokio::test]
    async fn busy_file_stays_queued_until_a_later_tick() {
        let fx = Fixture::start(Config::default());
        assert!(fx.request("register", Some("notes")).await.ok);
        let dir = fx.notes_directory().await;
        fx.remote.put_file(&dir, "open.txt", b"draft").expect("put");
        fx.local.mark_busy(notes_file("open.txt"));

        let synced = fx.request("sync", None).await;
        let summary = synced.data.expect("summary");
        assert_eq!(summary["queued"], 1);
        assert_eq!(summary["applied"], 0);
        assert_eq!(summary["busy"], 1);
        assert_eq!(summary["failed"], 0);
        assert_eq!(summary["pending"], 1);
        assert!(!fx.local_file("open.txt").exists());

        fx.local.release(&notes_file("open.txt"));
        fx.engine.tx.send(Command::Tick).await.expect("tick");

        let path = fx.wait_for_file("open.txt").await;
        assert_eq!(fs::read(&path).expect("applied after release"), b"draft");
        assert_eq!(fx.engine.status().await.expect("status").pending_changes, 0);
        fx.stop().await;
    }

    #[tokio::test]
    async fn disabled_service_defers_until_enabled() {
        let fx = Fixture::start(Config {
            sync_enabled: false,
            ..Config::default()
        });

        let registered = fx.request("register", Some("notes")).await;
        assert!(registered.ok);
        let status = fx.engine.status().await.expect("status");
        assert_eq!(status.state, ServiceState::Disabled);
        assert_eq!(status.origins[0].class, OriginClass::PendingBatch);

        let enabled = fx.request("enable", None).await;
        assert!(enabled.ok, "{:?}", enabled.error);
        let data = enabled.data.expect("status");
        assert_eq!(data["state"], "ok");
        assert_eq!(data["origins"][0]["class"], "incremental");
        fx.stop().await;
    }

    #[tokio::test]
    async fn unregister_and_resync_report_origin_errors() {
        let fx = Fixture::start(Config::default());

        let missing = fx.request("resync", None).await;
        assert_eq!(missing.error.as_deref(), Some("command 'resync' requires an origin"));

        let unknown = fx.request("resync", Some("ghost")).await;
        assert!(!unknown.ok);

        assert!(fx.request("register", Some("notes")).await.ok);
        let resync = fx.request("resync", Some("notes")).await;
        assert!(resync.ok, "{:?}", resync.error);

        let gone = fx.request("unregister", Some("notes")).await;
        assert_eq!(gone.data.expect("data")["unregistered"], "app://notes/");
        assert!(fx.engine.status().await.expect("status").origins.is_empty());

        let bogus = fx.request("launch", None).await;
        assert_eq!(bogus.error.as_deref(), Some("unknown command 'launch'"));
        fx.stop().await;
    }

    #[tokio::test]
    async fn status_includes_event_stats() {
        let fx = Fixture::start(Config::default());
        fx.stats.write().await.files_added = 3;

        let status = fx.request("status", None).await;
        let data = status.data.expect("payload");
        assert_eq!(data["running"], true);
        assert_eq!(data["state"], "ok");
        assert_eq!(data["pending_changes"], 0);
        assert_eq!(data["stats"]["files_added"], 3);
        fx.stop().await;
    }

    #[tokio::test]
    async fn stop_signals_shutdown_and_engine_persists() {
        let fx = Fixture::start(Config::default());
        assert!(fx.request("register", Some("notes")).await.ok);
        let mut shutdown_rx = fx.shutdown_tx.subscribe();

        let stop = fx.request("stop", None).await;
        assert_eq!(stop.data.expect("data")["stopping"], true);
        shutdown_rx.recv().await.expect("shutdown signal");

        let home = fx.stop().await;
        let metadata = fs::read_to_string(paths::metadata_path(home.path())).expect("metadata");
        assert!(metadata.contains("app://notes/"));
    }

    #[test]
    fn stale_socket_file_is_removed_before_bind() {
        let dir = TempDir::new().expect("tempdir");
        let socket = dir.path().join("daemon.sock");
        fs::write(&socket, b"").expect("stale file");
        prepare_socket_for_bind(&socket).expect("prepare");
        assert!(!socket.exists());
    }
}
