//! Socket server for the hapticd daemon.
//!
//! Every connection gets its own [`HapticServer`]. Inbound frames are
//! answered in order; unsolicited events are forwarded as they happen.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use hapticd_core::config::{ServerConfig, SimulationConfig};
use hapticd_core::simulated::SimulatedBackend;
use hapticd_core::{HapticServer, ServerEvent};
use hapticd_proto::{JsonArrayCodec, registry};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};

use crate::error::{DaemonError, Result};

const SOCKET_NAME: &str = "hapticd.sock";
const EMPTY_BATCH: &str = "[]";

/// Default socket location: `$XDG_RUNTIME_DIR/hapticd.sock`, or the temp dir.
#[must_use]
pub fn default_socket_path() -> PathBuf {
    std::env::var("XDG_RUNTIME_DIR")
        .map_or_else(|_| std::env::temp_dir(), PathBuf::from)
        .join(SOCKET_NAME)
}

/// Settings shared by every connection.
#[derive(Debug, Clone)]
pub struct DaemonOptions {
    pub socket_path: PathBuf,
    pub server: ServerConfig,
    /// Devices exposed by a simulated backend on each connection.
    pub simulation: Option<SimulationConfig>,
}

/// Bind the socket and serve until Ctrl-C.
///
/// # Errors
///
/// Returns an error if another daemon owns the socket or binding fails.
pub async fn run(options: DaemonOptions) -> Result<()> {
    let path = options.socket_path.clone();
    debug!("Loaded {} message shapes", registry().len());

    cleanup_stale_socket(&path).await?;

    let listener = UnixListener::bind(&path)?;
    info!("Daemon listening on {:?}", path);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received, stopping server"),
            Err(e) => error!("Failed to listen for interrupt: {}", e),
        }
        signal_cancel.cancel();
    });

    serve(listener, Arc::new(options), cancel).await;

    if path.exists()
        && let Err(e) = std::fs::remove_file(&path)
    {
        warn!("Failed to remove socket file {:?}: {}", path, e);
    }

    Ok(())
}

/// Accept connections on `listener` until `cancel` fires.
pub async fn serve(listener: UnixListener, options: Arc<DaemonOptions>, cancel: CancellationToken) {
    info!("Ready to accept connections");
    let next_id = AtomicU64::new(1);
    loop {
        let accepted = tokio::select! {
            () = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, _addr)) => {
                let span = info_span!("conn", id = next_id.fetch_add(1, Ordering::Relaxed));
                let options = Arc::clone(&options);
                let cancel = cancel.child_token();
                tokio::spawn(
                    async move {
                        debug!("Accepted connection");
                        if let Err(e) = handle_connection(stream, options, cancel).await {
                            error!("Connection error: {}", e);
                        }
                    }
                    .instrument(span),
                );
            }
            Err(e) => {
                error!("Accept error: {}", e);
            }
        }
    }
    debug!("Accept loop stopped");
}

async fn cleanup_stale_socket(path: &Path) -> Result<()> {
    if path.exists() {
        if UnixStream::connect(path).await.is_ok() {
            return Err(DaemonError::AlreadyRunning(path.to_path_buf()));
        }
        info!("Removing stale socket at {}", path.display());
        std::fs::remove_file(path)?;
    }
    Ok(())
}

fn build_server(options: &DaemonOptions) -> HapticServer {
    let server = HapticServer::new(options.server.clone());
    if let Some(simulation) = &options.simulation {
        let backend = SimulatedBackend::from_config("simulated", simulation)
            .finishing_after_discovery();
        server.add_backend(Arc::new(backend));
    }
    server
}

async fn handle_connection(
    stream: UnixStream,
    options: Arc<DaemonOptions>,
    cancel: CancellationToken,
) -> Result<()> {
    let framed = Framed::new(stream, JsonArrayCodec::new());
    let (mut sink, mut frames) = framed.split();

    let server = build_server(&options);
    let mut events = server.subscribe();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    // Fired once the ping timeout error is queued for the client.
    let timed_out = CancellationToken::new();

    let send_task = tokio::spawn(
        async move {
            while let Some(text) = rx.recv().await {
                trace!("send_task: {} bytes", text.len());
                if let Err(e) = sink.send(text).await {
                    warn!("Failed to send to client: {}", e);
                    break;
                }
            }
            trace!("send_task ended");
        }
        .in_current_span(),
    );

    let event_server = server.clone();
    let event_tx = tx.clone();
    let event_timed_out = timed_out.clone();
    let event_task = tokio::spawn(
        async move {
            while let Some(event) = events.recv().await {
                if let Some(text) = event_server.encode_event(&event)
                    && event_tx.send(text).is_err()
                {
                    break;
                }
                if event == ServerEvent::PingTimeout {
                    event_timed_out.cancel();
                    break;
                }
            }
        }
        .in_current_span(),
    );

    let result = loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break Ok(()),
            () = timed_out.cancelled() => {
                info!("Closing connection after ping timeout");
                break Ok(());
            }
            frame = frames.next() => frame,
        };

        match frame {
            Some(Ok(text)) => {
                let reply = server.process_text(&text).await;
                if reply != EMPTY_BATCH && tx.send(reply).is_err() {
                    break Ok(());
                }
            }
            Some(Err(e)) => {
                warn!("Read error: {}", e);
                break Err(DaemonError::Frame(e));
            }
            None => break Ok(()),
        }
    };

    server.shutdown().await;
    event_task.abort();
    let _ = event_task.await;

    // Flush what is already queued, then the sink closes.
    drop(tx);
    if let Err(e) = send_task.await {
        warn!("Send task failed: {e}");
    }
    debug!("Connection closed");

    result
}
