//! Streaming chat session controller.
//!
//! Each call to [`ChatController::create_session`] spawns one producer task
//! that drives the generator and pushes [`ChatEvent`]s into a bounded channel.
//! The receiving half is the [`ChatStream`] handed to the HTTP layer; when it
//! is dropped the producer notices and drops the in-flight generation.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::chat::events::ChatEvent;
use crate::chat::parts::UserContent;
use crate::core::errors::GenerationError;
use crate::core::ids::SessionId;
use crate::llm::generator::TextGenerator;

/// Events buffered between the producer task and the response body.
pub const DEFAULT_BUFFER: usize = 32;

/// Lifecycle of one streaming session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    /// Id assigned, `init` not yet delivered.
    Created,
    /// Generator running, deltas flowing.
    Streaming,
    /// `done` emitted.
    Completed,
    /// `error` emitted.
    Failed,
    /// Client went away before the end.
    Cancelled,
}

impl SessionPhase {
    fn advance(&mut self, next: Self, session_id: SessionId) {
        debug!(%session_id, from = ?*self, to = ?next, "Chat session phase");
        *self = next;
    }
}

enum Outcome {
    Finished(String),
    Disconnected,
}

/// Opens chat sessions and streams generator output as events.
#[derive(Clone)]
pub struct ChatController {
    generator: Arc<dyn TextGenerator>,
    buffer: usize,
}

impl ChatController {
    /// Create a controller around a generator.
    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            buffer: DEFAULT_BUFFER,
        }
    }

    /// Set the channel capacity (at least one event).
    #[must_use]
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// Start a new session and return its event stream.
    ///
    /// The stream yields `init` first, then one `delta` per non-empty
    /// fragment, then exactly one of `done` or `error`. Must be called from
    /// within a Tokio runtime.
    #[must_use]
    pub fn create_session(&self, parts: Vec<UserContent>) -> ChatStream {
        let session_id = SessionId::new();
        let (tx, rx) = mpsc::channel(self.buffer);
        info!(%session_id, parts = parts.len(), "Chat session opened");

        tokio::spawn(run_session(
            Arc::clone(&self.generator),
            session_id,
            parts,
            tx,
        ));

        ChatStream { session_id, rx }
    }
}

async fn run_session(
    generator: Arc<dyn TextGenerator>,
    session_id: SessionId,
    parts: Vec<UserContent>,
    tx: mpsc::Sender<ChatEvent>,
) {
    let mut phase = SessionPhase::Created;

    if tx.send(ChatEvent::Init { session_id }).await.is_err() {
        phase.advance(SessionPhase::Cancelled, session_id);
        return;
    }

    let outcome = tokio::select! {
        () = tx.closed() => Ok(Outcome::Disconnected),
        result = stream_deltas(generator.as_ref(), session_id, parts, &tx, &mut phase) => result,
    };

    let terminal = match outcome {
        Ok(Outcome::Finished(text)) => {
            phase.advance(SessionPhase::Completed, session_id);
            info!(%session_id, chars = text.chars().count(), "Chat session completed");
            ChatEvent::Done { session_id, text }
        }
        Ok(Outcome::Disconnected) => {
            phase.advance(SessionPhase::Cancelled, session_id);
            info!(%session_id, "Client disconnected, generation cancelled");
            return;
        }
        Err(err) => {
            phase.advance(SessionPhase::Failed, session_id);
            warn!(%session_id, error = %err, "Chat generation failed");
            ChatEvent::Error {
                session_id,
                message: err.to_string(),
            }
        }
    };

    if tx.send(terminal).await.is_err() {
        debug!(%session_id, "Terminal event dropped, client gone");
    }
}

async fn stream_deltas(
    generator: &dyn TextGenerator,
    session_id: SessionId,
    parts: Vec<UserContent>,
    tx: &mpsc::Sender<ChatEvent>,
    phase: &mut SessionPhase,
) -> Result<Outcome, GenerationError> {
    let mut stream = generator.start(parts).await?;
    phase.advance(SessionPhase::Streaming, session_id);

    let mut deltas = 0_usize;
    while let Some(text) = stream.next_delta().await? {
        if text.is_empty() {
            continue;
        }
        deltas += 1;
        if tx.send(ChatEvent::Delta { session_id, text }).await.is_err() {
            return Ok(Outcome::Disconnected);
        }
    }

    debug!(%session_id, deltas, "Generator finished");
    Ok(Outcome::Finished(stream.final_text()))
}

/// Event stream of one chat session.
#[derive(Debug)]
pub struct ChatStream {
    session_id: SessionId,
    rx: mpsc::Receiver<ChatEvent>,
}

impl ChatStream {
    /// Session this stream belongs to.
    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }
}

impl Stream for ChatStream {
    type Item = ChatEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
