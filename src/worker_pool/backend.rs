//! The trait a per-language worker implements. The pool owns exactly one
//! instance per language and never touches it concurrently: `handle` always
//! runs to completion (or times out) before the next queued task starts.

use super::types::PoolErrorFactory;
use crate::cancellation::CancellationToken;
use async_trait::async_trait;
use tokio::sync::mpsc;

#[async_trait]
pub trait LanguageWorkerBackend: Send + 'static {
    type Request: Send + 'static;
    type Response: Send + 'static;
    type Error: PoolErrorFactory;

    /// Called once when the worker starts, and again after every restart.
    async fn initialize(&mut self) -> Result<(), Self::Error>;

    /// Handles exactly one request. `partial` is `Some` only for requests
    /// submitted through the streaming entry point; implementations that
    /// don't produce partial output can ignore it.
    async fn handle(
        &mut self,
        request: Self::Request,
        partial: Option<mpsc::UnboundedSender<Self::Response>>,
        cancel: CancellationToken,
    ) -> Result<Self::Response, Self::Error>;

    async fn shutdown(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
