//! ChatServer accept loop
//!
//! Owns the listener, the shared [`Registry`] and the credential store.
//! Each accepted connection becomes a [`Session`] on its own task.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::auth::CredentialStore;
use crate::config::Config;
use crate::error::AppError;
use crate::registry::Registry;
use crate::session::{Session, SessionContext};

/// The chat server
pub struct ChatServer<S> {
    listener: TcpListener,
    ctx: SessionContext<S>,
}

impl<S: CredentialStore> ChatServer<S> {
    /// Bind the listening socket
    pub async fn bind(config: &Config, store: Arc<S>) -> Result<Self, AppError> {
        let listener = TcpListener::bind(&config.addr).await?;
        let ctx = SessionContext {
            registry: Arc::new(Registry::new()),
            store,
            auth_timeout: config.auth_timeout,
        };
        Ok(Self { listener, ctx })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, AppError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.ctx.registry)
    }

    /// Accept connections forever
    pub async fn run(self) {
        self.run_until(std::future::pending()).await;
    }

    /// Accept connections until `shutdown` resolves
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        info!("ChatServer started");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        info!("New connection from {}", addr);
                        Session::spawn(stream, self.ctx.clone());
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                },
            }
        }

        info!("ChatServer shutting down ({} users online)", self.ctx.registry.len());
    }
}
