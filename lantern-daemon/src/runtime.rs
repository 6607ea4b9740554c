use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::Instant;

use lantern_core::settings::{lantern_root, load_at, settings_path_at};
use lantern_engine::Engine;

use crate::cache::CacheStore;
use crate::error::{io_err, DaemonError};
use crate::paths::{socket_path, DEBOUNCE_WINDOW};
use crate::protocol::{Request, Response};
use crate::router::{EngineHandle, Router};

/// Everything a connection handler needs.
#[derive(Clone)]
struct Shared {
    home: PathBuf,
    engine: EngineHandle,
    cache: Arc<CacheStore>,
    started_at_unix: u64,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path, workspace: Option<PathBuf>) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), workspace))
}

/// Run the daemon runtime until a stop request or ctrl-c.
///
/// `workspace` is the working directory of every engine process; defaults to
/// the daemon's own current directory.
pub async fn run(home: PathBuf, workspace: Option<PathBuf>) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let workspace = match workspace {
        Some(dir) => Some(dir),
        None => std::env::current_dir().ok(),
    };
    let engine: EngineHandle = Arc::new(RwLock::new(Arc::new(load_engine(&home, &workspace)?)));
    let shared = Shared {
        home: home.clone(),
        engine: engine.clone(),
        cache: Arc::new(CacheStore::new()),
        started_at_unix: unix_seconds_now(),
    };
    tracing::info!(
        home = %home.display(),
        workspace = ?workspace,
        "lantern daemon starting",
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        tokio::spawn(async move {
            let result = watcher_task(home, workspace, engine, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let result = socket_server_task(shared, shutdown.clone(), shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

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
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (watcher_result, socket_result, signal_result) =
        tokio::join!(watcher_handle, socket_handle, signal_handle);

    handle_join("settings_watcher", watcher_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("lantern daemon stopped");
    Ok(())
}

fn load_engine(home: &Path, workspace: &Option<PathBuf>) -> Result<Engine, DaemonError> {
    let loaded = load_at(home)?;
    if !loaded.is_clean() {
        tracing::warn!(
            profiles = ?loaded.malformed,
            "malformed profiles ignored, please fix {}",
            settings_path_at(home).display(),
        );
    }
    tracing::info!(
        profiles = loaded.settings.profiles.len(),
        timeout_ms = loaded.settings.timeout_ms,
        "settings loaded",
    );
    Ok(Engine::new(Arc::new(loaded.settings), workspace.clone()))
}

// ---------------------------------------------------------------------------
// Settings watcher
// ---------------------------------------------------------------------------

async fn watcher_task(
    home: PathBuf,
    workspace: Option<PathBuf>,
    engine: EngineHandle,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let root = lantern_root(&home);
    // Events arrive with canonical paths on some platforms.
    let root = fs::canonicalize(&root).unwrap_or(root);
    let settings_file = match settings_path_at(&home).file_name() {
        Some(name) => root.join(name),
        None => settings_path_at(&home),
    };

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    watcher.watch(&root, RecursiveMode::NonRecursive)?;
    tracing::debug!(path = %root.display(), "watching settings directory");

    let mut debounce = Debounce::new(DEBOUNCE_WINDOW);

    loop {
        let deadline = debounce.deadline();
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = sleep_until_some(deadline) => {
                debounce.clear();
                reload_engine(&home, &workspace, &engine).await;
            }
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    Ok(event) if is_settings_event(&event, &settings_file) => {
                        debounce.touch(Instant::now());
                    }
                    Ok(_) => {}
                    Err(err) => tracing::warn!(error = %err, "watcher event error"),
                }
            }
        }
    }

    Ok(())
}

async fn reload_engine(home: &Path, workspace: &Option<PathBuf>, engine: &EngineHandle) {
    let loaded = {
        let home = home.to_path_buf();
        let workspace = workspace.clone();
        tokio::task::spawn_blocking(move || load_engine(&home, &workspace)).await
    };
    match loaded {
        Ok(Ok(fresh)) => {
            *engine.write().await = Arc::new(fresh);
            tracing::info!("settings reloaded");
        }
        Ok(Err(err)) => tracing::warn!(error = %err, "settings reload failed, keeping previous settings"),
        Err(err) => tracing::warn!(error = %err, "settings reload task failed"),
    }
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Trailing-edge debounce: fires once the file has been quiet for `window`.
#[derive(Debug)]
struct Debounce {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    fn touch(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn clear(&mut self) {
        self.deadline = None;
    }
}

fn is_settings_event(event: &Event, settings_file: &Path) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) && event.paths.iter().any(|path| path == settings_file)
}

// ---------------------------------------------------------------------------
// Socket server
// ---------------------------------------------------------------------------

async fn socket_server_task(
    shared: Shared,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&shared.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let shared = shared.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_session(stream, shared, shutdown_tx).await {
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

/// One connection is one UI session with its own staleness counters.
async fn handle_session(
    stream: UnixStream,
    shared: Shared,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let (reader, writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let (outbox_tx, outbox_rx) = mpsc::unbounded_channel::<Response>();
    let writer_handle = tokio::spawn(write_responses(writer, outbox_rx, shutdown_tx));
    let router = Router::new(shared.engine.clone(), shared.cache.clone(), outbox_tx.clone());

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }
        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring malformed request");
                continue;
            }
        };

        match request {
            Request::Status => {
                let status = status_response(&shared).await;
                let _ = outbox_tx.send(status);
            }
            Request::Stop => {
                let _ = outbox_tx.send(Response::Stop { stopping: true });
                break;
            }
            request => {
                router.dispatch(request);
            }
        }
    }

    // Without a stop, the writer finishes once every in-flight task has
    // dropped its sender.
    drop(router);
    drop(outbox_tx);
    match writer_handle.await {
        Ok(result) => result,
        Err(err) => Err(DaemonError::Protocol(format!("session writer join failure: {err}"))),
    }
}

/// Drain a session's outbox onto the socket. A stop response shuts the daemon
/// down once it has been written.
async fn write_responses(
    mut writer: OwnedWriteHalf,
    mut outbox: mpsc::UnboundedReceiver<Response>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    while let Some(response) = outbox.recv().await {
        write_response(&mut writer, &response).await?;
        if matches!(response, Response::Stop { .. }) {
            let _ = shutdown_tx.send(());
            break;
        }
    }
    Ok(())
}

async fn status_response(shared: &Shared) -> Response {
    let engine = shared.engine.read().await.clone();
    Response::Status {
        running: true,
        started_at_unix: shared.started_at_unix,
        profiles: engine
            .settings()
            .profiles
            .keys()
            .map(|key| key.0.clone())
            .collect(),
        socket: socket_path(&shared.home).display().to_string(),
    }
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

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let root = lantern_root(home);
    fs::create_dir_all(&root).map_err(|e| io_err(&root, e))
}

async fn write_response(writer: &mut OwnedWriteHalf, response: &Response) -> Result<(), DaemonError> {
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

fn unix_seconds_now() -> u64 {
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
