//! Per-connection session state machine.
//!
//! A session reads request frames, answers cheap requests inline and spawns
//! one task per export or sample request. Spawned tasks report back over an
//! mpsc channel, so responses may arrive in any order; callers correlate them
//! by `id`.

use super::GatewayConfig;
use super::protocol::{
    ExportPayload, FrameError, Request, RequestFrame, ResponseFrame, SampleEntityPayload,
    UNAUTHENTICATED,
};
use crate::connectors::{ConnectorFactory, ExportOptions};
use crate::error::SchemaportError;
use crate::pipeline::ExportPipeline;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, not yet authenticated
    Idle,
    Authenticated,
    /// At least one request has been dispatched
    Active,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Authenticated => "authenticated",
            SessionState::Active => "active",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// State shared between a session and the tasks it spawns.
struct Shared {
    factory: Arc<dyn ConnectorFactory>,
    cancel: CancellationToken,
    permits: Arc<Semaphore>,
    export_locks: Mutex<HashMap<u64, Arc<tokio::sync::Mutex<()>>>>,
}

impl Shared {
    /// Lock serializing exports against one descriptor fingerprint.
    fn export_lock(&self, fingerprint: u64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .export_locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(locks.entry(fingerprint).or_default())
    }
}

pub(crate) struct Session {
    id: Uuid,
    state: SessionState,
    config: Arc<GatewayConfig>,
    shared: Arc<Shared>,
    tasks: JoinSet<()>,
}

impl Session {
    pub(crate) fn new(factory: Arc<dyn ConnectorFactory>, config: Arc<GatewayConfig>) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_in_flight));
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            config,
            shared: Arc::new(Shared {
                factory,
                cancel: CancellationToken::new(),
                permits,
                export_locks: Mutex::new(HashMap::new()),
            }),
            tasks: JoinSet::new(),
        }
    }

    /// Serves the stream until the peer disconnects, the transport fails or
    /// `shutdown` is cancelled.
    ///
    /// Returns the final state, always `Closed`.
    pub(crate) async fn run<S>(mut self, stream: S, shutdown: CancellationToken) -> SessionState
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let span = tracing::info_span!("gateway_session", session_id = %self.id);
        async move {
            tracing::info!("Session opened");
            let codec = LinesCodec::new_with_max_length(self.config.max_line_length);
            let mut framed = Framed::new(stream, codec);
            let (tx, mut rx) = mpsc::unbounded_channel::<ResponseFrame>();
            // A decode error makes the framed stream yield `None` once before
            // it resumes reading.
            let mut resume_after_error = false;

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    incoming = framed.next() => match incoming {
                        Some(Ok(line)) => {
                            if line.trim().is_empty() {
                                continue;
                            }
                            if let Some(response) = self.handle_line(&line, &tx)
                                && write_frame(&mut framed, &response).await.is_err()
                            {
                                break;
                            }
                        }
                        Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                            tracing::warn!(
                                max_line_length = self.config.max_line_length,
                                "Discarding oversized frame"
                            );
                            resume_after_error = true;
                            let response = ResponseFrame::from_error(
                                Value::Null,
                                &SchemaportError::protocol(format!(
                                    "frame exceeds {} bytes",
                                    self.config.max_line_length
                                )),
                            );
                            if write_frame(&mut framed, &response).await.is_err() {
                                break;
                            }
                        }
                        Some(Err(LinesCodecError::Io(e))) => {
                            tracing::debug!(error = %e, "Transport failed");
                            break;
                        }
                        None if resume_after_error => resume_after_error = false,
                        None => break,
                    },
                    Some(response) = rx.recv() => {
                        if write_frame(&mut framed, &response).await.is_err() {
                            break;
                        }
                    }
                    Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                        if let Err(e) = joined
                            && e.is_panic()
                        {
                            tracing::error!("Request handler panicked");
                        }
                    }
                }
            }

            self.close(&mut framed, tx, rx).await;
            self.state
        }
        .instrument(span)
        .await
    }

    /// Moves to `Closed`, cancels outstanding work and drains handlers.
    ///
    /// Responses finished after the transport went away are written on a
    /// best-effort basis.
    async fn close<S>(
        &mut self,
        framed: &mut Framed<S, LinesCodec>,
        tx: mpsc::UnboundedSender<ResponseFrame>,
        mut rx: mpsc::UnboundedReceiver<ResponseFrame>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        self.transition(SessionState::Closed);
        self.shared.cancel.cancel();
        drop(tx);

        let pending = self.tasks.len();
        if pending > 0 {
            tracing::debug!(pending, "Waiting for in-flight requests");
        }
        while self.tasks.join_next().await.is_some() {}

        let mut transport_ok = true;
        while let Some(response) = rx.recv().await {
            if transport_ok {
                transport_ok = write_frame(framed, &response).await.is_ok();
            }
        }
        tracing::info!("Session closed");
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            tracing::debug!(from = %self.state, to = %next, "Session state transition");
            self.state = next;
        }
    }

    /// Handles one frame, returning an immediate response if there is one.
    fn handle_line(
        &mut self,
        line: &str,
        tx: &mpsc::UnboundedSender<ResponseFrame>,
    ) -> Option<ResponseFrame> {
        let RequestFrame { id, request } = match RequestFrame::parse(line) {
            Ok(frame) => frame,
            Err(FrameError { id, error }) => {
                tracing::warn!(request_id = %id, "Rejected malformed frame");
                return Some(ResponseFrame::from_error(id, &error));
            }
        };
        tracing::debug!(request_id = %id, kind = request.kind(), "Request received");

        if let Request::Authenticate { token } = &request {
            return Some(self.authenticate(id, token));
        }

        if self.state == SessionState::Idle {
            tracing::warn!(request_id = %id, kind = request.kind(), "Rejected unauthenticated request");
            return Some(ResponseFrame::error(
                id,
                UNAUTHENTICATED,
                "session is not authenticated",
            ));
        }
        self.transition(SessionState::Active);

        match request {
            Request::Authenticate { .. } => None,
            Request::ListConnectors => Some(ResponseFrame::ok(
                id,
                json!({ "connectors": self.shared.factory.available_kinds() }),
            )),
            Request::Export(payload) => {
                self.spawn(id, tx, move |shared, id| export(shared, id, *payload));
                None
            }
            Request::SampleEntity(payload) => {
                self.spawn(id, tx, move |shared, id| sample_entity(shared, id, *payload));
                None
            }
        }
    }

    fn authenticate(&mut self, id: Value, token: &str) -> ResponseFrame {
        if tokens_match(token, &self.config.token) {
            if self.state == SessionState::Idle {
                self.transition(SessionState::Authenticated);
            }
            ResponseFrame::ok(id, json!({ "state": self.state.to_string() }))
        } else {
            tracing::warn!(request_id = %id, "Authentication failed");
            ResponseFrame::error(id, UNAUTHENTICATED, "invalid token")
        }
    }

    /// Runs a handler as its own task once an in-flight permit is free.
    fn spawn<F, Fut>(&mut self, id: Value, tx: &mpsc::UnboundedSender<ResponseFrame>, handler: F)
    where
        F: FnOnce(Arc<Shared>, Value) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ResponseFrame> + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        let tx = tx.clone();
        let span = tracing::debug_span!("request", request_id = %id);

        self.tasks.spawn(
            async move {
                let permit = tokio::select! {
                    permit = Arc::clone(&shared.permits).acquire_owned() => permit,
                    () = shared.cancel.cancelled() => return,
                };
                let Ok(_permit) = permit else { return };

                let response = handler(shared, id).await;
                if tx.send(response).is_err() {
                    tracing::debug!("Response dropped, session already closed");
                }
            }
            .instrument(span),
        );
    }
}

async fn export(shared: Arc<Shared>, id: Value, payload: ExportPayload) -> ResponseFrame {
    let descriptor = match payload.connection.descriptor() {
        Ok(descriptor) => descriptor,
        Err(e) => return ResponseFrame::from_error(id, &e),
    };

    let lock = shared.export_lock(descriptor.fingerprint());
    let _guard = lock.lock().await;

    let outcome = ExportPipeline::new(Arc::clone(&shared.factory), payload.options)
        .with_cancellation(shared.cancel.child_token())
        .run(&descriptor)
        .await;

    match serde_json::to_value(&outcome.document) {
        Ok(document) => ResponseFrame::ok(id, document),
        Err(e) => ResponseFrame::from_error(
            id,
            &SchemaportError::json("Failed to encode schema document", e),
        ),
    }
}

async fn sample_entity(
    shared: Arc<Shared>,
    id: Value,
    payload: SampleEntityPayload,
) -> ResponseFrame {
    let descriptor = match payload.connection.descriptor() {
        Ok(descriptor) => descriptor,
        Err(e) => return ResponseFrame::from_error(id, &e),
    };

    let pipeline = ExportPipeline::new(
        Arc::clone(&shared.factory),
        payload.options(&ExportOptions::default()),
    )
    .with_cancellation(shared.cancel.child_token());

    match pipeline.sample_entity(&descriptor, &payload.entity_ref()).await {
        Ok(sample) => ResponseFrame::ok(
            id,
            json!({
                "entity": sample.entity,
                "recordsSampled": sample.records_sampled,
            }),
        ),
        Err(e) => {
            tracing::warn!(entity = %payload.entity_ref(), "{}", e);
            ResponseFrame::from_error(id, &e)
        }
    }
}

async fn write_frame<S>(
    framed: &mut Framed<S, LinesCodec>,
    response: &ResponseFrame,
) -> Result<(), LinesCodecError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let line = match serde_json::to_string(response) {
        Ok(line) => line,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode response frame");
            return Ok(());
        }
    };
    framed.send(line).await
}

/// Token comparison that does not stop at the first differing byte.
fn tokens_match(given: &str, expected: &str) -> bool {
    let (given, expected) = (given.as_bytes(), expected.as_bytes());
    given.len() == expected.len()
        && given
            .iter()
            .zip(expected)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match("s3cret", "s3cret"));
        assert!(!tokens_match("s3cret", "s3creT"));
        assert!(!tokens_match("s3cret", "s3cret2"));
        assert!(!tokens_match("", "s3cret"));
    }

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::Idle.to_string(), "idle");
        assert_eq!(SessionState::Active.to_string(), "active");
    }
}
