//! Server acceptor: owns the listening socket and spawns one independent
//! handler per accepted connection.

use std::path::PathBuf;

use tokio::net::TcpListener;

use crate::server::session::run_session;

/// Binds `0.0.0.0:<port>`. Split out from [`serve`] so tests can bind to
/// port 0 and discover the assigned port via `local_addr()` before
/// handing the listener to [`accept_loop`].
pub async fn bind(port: u16) -> anyhow::Result<TcpListener> {
    TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context_msg(format!("failed to bind to port {port}"))
}

/// Binds `0.0.0.0:<port>` and accepts connections until a Ctrl-C /
/// SIGTERM is observed. Accept errors are logged and the loop continues;
/// only bind failure is fatal, matching the setup-failure disposition in
/// the error handling design (the server exits rather than retrying).
pub async fn serve(port: u16, files_dir: PathBuf) -> anyhow::Result<()> {
    let listener = bind(port).await?;
    tracing::info!(port, dir = %files_dir.display(), "listening");
    accept_loop(listener, files_dir).await
}

/// Runs the accept loop over an already-bound listener until a shutdown
/// signal is observed.
pub async fn accept_loop(listener: TcpListener, files_dir: PathBuf) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let dir = files_dir.clone();
                        tracing::info!(%peer, "connection accepted");
                        tokio::spawn(async move {
                            if let Err(e) = run_session(stream, dir).await {
                                if e.is_fatal() {
                                    tracing::warn!(%peer, error = %e, "connection terminated");
                                } else {
                                    tracing::debug!(%peer, error = %e, "connection ended with protocol error");
                                }
                            }
                            tracing::info!(%peer, "connection closed");
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                }
            }
            _ = shutdown_signal() => {
                tracing::info!("shutdown signal received");
                break;
            }
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Small local extension so bind failures read as `anyhow::Context`
/// without pulling the trait's other combinators into this module.
trait WithContextMsg<T> {
    fn with_context_msg(self, msg: String) -> anyhow::Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> WithContextMsg<T> for Result<T, E> {
    fn with_context_msg(self, msg: String) -> anyhow::Result<T> {
        use anyhow::Context;
        self.context(msg)
    }
}
