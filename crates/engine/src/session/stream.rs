// Stream ingest: forwards a continuation's chunks to the session actor.
//
// The actor owns the buffer; this task only relays. Every event is tagged
// with the stream id so the actor can drop anything from a cancelled or
// superseded stream.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use inkstone_common::protocol::api::ContinueRequest;

use super::actor::Event;
use crate::backend::{Backend, BackendError};

pub(crate) type StreamId = u64;

#[derive(Debug)]
pub(crate) enum StreamEvent {
    /// The service accepted the request.
    Opened,
    Token(String),
    Finished,
    Failed(BackendError),
}

/// Open the continuation and relay it. A refused request is relayed as
/// `Failed` with no `Opened` ahead of it.
pub(crate) fn spawn_ingest<B: Backend>(
    backend: Arc<B>,
    request: ContinueRequest,
    stream_id: StreamId,
    events: mpsc::UnboundedSender<Event>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let relay = |event| events.send(Event::Stream { stream_id, event }).is_ok();

        let mut tokens = match backend.continue_stream(request).await {
            Ok(tokens) if relay(StreamEvent::Opened) => tokens,
            Ok(_) => return,
            Err(error) => {
                relay(StreamEvent::Failed(error));
                return;
            }
        };

        while let Some(chunk) = tokens.recv().await {
            match chunk {
                Ok(text) => {
                    trace!(stream_id, len = text.len(), "continuation chunk");
                    if !relay(StreamEvent::Token(text)) {
                        debug!(stream_id, "session gone, dropping continuation");
                        return;
                    }
                }
                Err(error) => {
                    relay(StreamEvent::Failed(error));
                    return;
                }
            }
        }
        relay(StreamEvent::Finished);
    })
}
