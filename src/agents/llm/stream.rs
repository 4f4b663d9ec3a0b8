//! Streaming types for LLM responses

use futures::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use super::{Completion, FinishReason};
use crate::agents::domain::{FunctionCallAccumulator, FunctionCallDelta};
use crate::agents::error::LlmError;

/// A fragment of a streamed response
#[derive(Debug, Clone, Default)]
pub struct StreamChunk {
    /// Text delta
    pub content: String,
    /// Function call delta
    pub function_call: Option<FunctionCallDelta>,
    /// Set on the final chunk
    pub finish_reason: Option<FinishReason>,
}

impl StreamChunk {
    /// Create a text content chunk
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Create a function call chunk
    pub fn function_call(delta: FunctionCallDelta) -> Self {
        Self {
            function_call: Some(delta),
            ..Default::default()
        }
    }

    /// Create a finish chunk
    pub fn finish(reason: FinishReason) -> Self {
        Self {
            finish_reason: Some(reason),
            ..Default::default()
        }
    }

    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
    }
}

/// Streaming response from an LLM engine
///
/// Fragments arrive in production order over a bounded channel; the producer
/// stops as soon as the stream is dropped.
pub struct CompletionStream {
    receiver: mpsc::Receiver<Result<StreamChunk, LlmError>>,
}

impl CompletionStream {
    /// Create a channel pair for building a stream
    pub fn channel(buffer: usize) -> (CompletionStreamSender, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (CompletionStreamSender { sender: tx }, Self { receiver: rx })
    }

    /// Next fragment, `None` once the producer is done
    pub async fn next_chunk(&mut self) -> Option<Result<StreamChunk, LlmError>> {
        self.receiver.recv().await
    }

    /// Collect all fragments into one completion (no extraction applied)
    pub async fn collect(mut self) -> Result<Completion, LlmError> {
        let mut content = String::new();
        let mut accumulator = FunctionCallAccumulator::new();

        while let Some(result) = self.receiver.recv().await {
            let chunk = result?;
            content.push_str(&chunk.content);
            if let Some(delta) = &chunk.function_call {
                accumulator.apply_delta(delta);
            }
        }

        Ok(match accumulator.build() {
            Some(call) => Completion::function_call(call),
            None => Completion::text(content),
        })
    }
}

impl Stream for CompletionStream {
    type Item = Result<StreamChunk, LlmError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}

/// Sender half for building a stream
#[derive(Clone)]
pub struct CompletionStreamSender {
    sender: mpsc::Sender<Result<StreamChunk, LlmError>>,
}

type SendResult = Result<(), mpsc::error::SendError<Result<StreamChunk, LlmError>>>;

impl CompletionStreamSender {
    pub async fn send(&self, chunk: StreamChunk) -> SendResult {
        self.sender.send(Ok(chunk)).await
    }

    pub async fn send_error(&self, error: LlmError) -> SendResult {
        self.sender.send(Err(error)).await
    }

    pub async fn send_text(&self, text: impl Into<String>) -> SendResult {
        self.send(StreamChunk::text(text)).await
    }

    pub async fn send_finish(&self, reason: FinishReason) -> SendResult {
        self.send(StreamChunk::finish(reason)).await
    }
}

/// Cancellation flag checked between stream fragments
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; honored at the next fragment boundary
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear a previous request
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}
