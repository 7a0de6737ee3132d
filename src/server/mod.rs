//! WebSocket server exposing frames to a remote inference client.

pub mod protocol;
pub mod session;
mod ws;

use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::action::ActionHandler;
use crate::capture::FrameSource;
use crate::error::{Error, SourceError};
use crate::pipeline::{FramePump, Rendezvous, Shutdown};
use crate::{ExchangeConfig, SessionConfig};

pub use protocol::{Reply, Request};
pub use session::Session;

/// Builds a fresh frame source for one connection.
pub type SourceFactory =
    Arc<dyn Fn() -> Result<Box<dyn FrameSource>, SourceError> + Send + Sync>;

enum Frames {
    /// Every connection reads from the same channels
    Shared(Rendezvous),
    /// Every connection gets its own source, channels and pump
    PerConnection {
        factory: SourceFactory,
        exchange: ExchangeConfig,
    },
}

/// Application state shared across connections.
struct AppState {
    frames: Frames,
    actions: Arc<dyn ActionHandler>,
    session: SessionConfig,
    shutdown: Shutdown,
    next_session: AtomicU64,
}

impl AppState {
    /// Channels for a new connection, plus the shutdown that stops its
    /// private pump when it has one.
    fn rendezvous(&self) -> Result<(Rendezvous, Option<Shutdown>), SourceError> {
        match &self.frames {
            Frames::Shared(rendezvous) => Ok((rendezvous.clone(), None)),
            Frames::PerConnection { factory, exchange } => {
                let source = factory()?;
                let shutdown = Shutdown::new();
                let rendezvous = Rendezvous::new(exchange, shutdown.clone());
                FramePump::new(source, rendezvous.results().clone()).spawn();
                Ok((rendezvous, Some(shutdown)))
            }
        }
    }
}

pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    /// All connections share `rendezvous`. The server stops with its shutdown.
    pub fn shared(
        rendezvous: Rendezvous,
        actions: Arc<dyn ActionHandler>,
        session: SessionConfig,
    ) -> Self {
        let shutdown = rendezvous.shutdown().clone();
        Self::with_frames(Frames::Shared(rendezvous), actions, session, shutdown)
    }

    /// Each connection pumps its own source built by `factory`.
    pub fn per_connection(
        factory: SourceFactory,
        exchange: ExchangeConfig,
        actions: Arc<dyn ActionHandler>,
        session: SessionConfig,
        shutdown: Shutdown,
    ) -> Self {
        Self::with_frames(
            Frames::PerConnection { factory, exchange },
            actions,
            session,
            shutdown,
        )
    }

    fn with_frames(
        frames: Frames,
        actions: Arc<dyn ActionHandler>,
        session: SessionConfig,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            state: Arc::new(AppState {
                frames,
                actions,
                session,
                shutdown,
                next_session: AtomicU64::new(1),
            }),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(ws::upgrade))
            .route("/via", get(ws::upgrade))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind and serve in the background.
    ///
    /// Port 0 picks a free port; see [`RunningServer::local_addr`].
    pub async fn bind(self, host: &str, port: u16) -> Result<RunningServer, Error> {
        let listener = TcpListener::bind((host, port)).await?;
        let addr = listener.local_addr()?;
        info!("Server listening on {}", addr);

        let app = self.router();
        let shutdown = self.state.shutdown.clone();
        let signal = shutdown.clone();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await;
            if let Err(e) = &served {
                error!("Server error: {}", e);
            }
            served
        });

        Ok(RunningServer {
            addr,
            task,
            shutdown,
        })
    }
}

/// Handle to a server started with [`Server::bind`].
pub struct RunningServer {
    addr: SocketAddr,
    task: JoinHandle<std::io::Result<()>>,
    shutdown: Shutdown,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait until the server stops.
    pub async fn wait(self) -> Result<(), Error> {
        match self.task.await {
            Ok(served) => Ok(served?),
            Err(e) => Err(Error::Io(std::io::Error::other(e))),
        }
    }

    /// Trigger shutdown and wait for the listener to close.
    pub async fn stop(self) -> Result<(), Error> {
        self.shutdown.trigger();
        self.wait().await
    }
}
