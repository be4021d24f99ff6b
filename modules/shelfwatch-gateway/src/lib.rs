//! Unix socket gateway: pushes engine events to connected clients and
//! answers their queries over newline-delimited JSON.

mod session;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use shelfwatch_common::EventBus;
use shelfwatch_engine::Poller;
use shelfwatch_store::CatalogStore;

pub struct Gateway {
    socket_path: PathBuf,
    store: CatalogStore,
    events: EventBus,
    poller: Arc<Poller>,
}

impl Gateway {
    pub fn new(
        socket_path: impl Into<PathBuf>,
        store: CatalogStore,
        events: EventBus,
        poller: Arc<Poller>,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            store,
            events,
            poller,
        }
    }

    /// Bind the socket and serve clients until the shutdown signal resolves.
    /// The socket file is removed on the way out.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        prepare_socket(&self.socket_path).await?;
        let listener = UnixListener::bind(&self.socket_path)
            .with_context(|| format!("binding {}", self.socket_path.display()))?;
        info!(path = %self.socket_path.display(), "Gateway listening");

        // Force-polls started by clients outlive their session; they are
        // collected here so shutdown can wait for an in-flight poll and its
        // persistence writes.
        let force_polls = Arc::new(Mutex::new(JoinSet::new()));

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            debug!("Gateway client connected");
                            let store = self.store.clone();
                            let events = self.events.clone();
                            let poller = Arc::clone(&self.poller);
                            let force_polls = Arc::clone(&force_polls);
                            tokio::spawn(session::serve_client(
                                stream, store, events, poller, force_polls,
                            ));
                        }
                        Err(e) => warn!(error = %e, "Failed to accept gateway client"),
                    }
                }
                _ = shutdown.recv() => {
                    info!("Gateway shutting down");
                    break;
                }
            }
        }

        let mut polls = force_polls.lock().await;
        if !polls.is_empty() {
            info!("Waiting for an in-flight force poll to finish");
        }
        while polls.join_next().await.is_some() {}

        if let Err(e) = tokio::fs::remove_file(&self.socket_path).await {
            debug!(error = %e, "Could not remove socket file on shutdown");
        }
        Ok(())
    }
}

/// Clear the way for binding. A leftover file from a crashed run is probed
/// with a connect: nobody answering means it is stale and safe to remove,
/// an answer means another instance owns it and startup must abort.
async fn prepare_socket(path: &Path) -> Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(_) => match UnixStream::connect(path).await {
            Ok(_) => bail!("socket {} is already in use by another instance", path.display()),
            Err(_) => {
                info!(path = %path.display(), "Removing stale socket file");
                tokio::fs::remove_file(path).await?;
                Ok(())
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
