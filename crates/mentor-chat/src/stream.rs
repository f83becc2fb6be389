//! Stream reconciliation: folds streamed chunks into one growing reply.

use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::backend::TextStream;
use crate::error::ChatError;

/// Accumulates chunks for the in-flight assistant turn at `index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamReconciler {
    index: usize,
    accumulated: String,
    chunks: usize,
}

impl StreamReconciler {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            accumulated: String::new(),
            chunks: 0,
        }
    }

    /// Append one chunk and return the full text so far.
    pub fn push(&mut self, chunk: &str) -> &str {
        self.accumulated.push_str(chunk);
        self.chunks += 1;
        &self.accumulated
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn content(&self) -> &str {
        &self.accumulated
    }

    pub fn chunks(&self) -> usize {
        self.chunks
    }

    pub fn into_text(self) -> String {
        self.accumulated
    }
}

/// How a reconciled stream ended.
#[derive(Debug)]
pub enum StreamOutcome {
    /// End of stream observed; the full reply text.
    Finished(String),
    /// The channel failed mid-stream. `partial` is what had arrived.
    Interrupted { partial: String, error: ChatError },
}

/// Drive `stream` to completion, calling `publish(index, text)` with the
/// full accumulated text after every chunk.
pub async fn reconcile<F>(mut stream: TextStream, index: usize, mut publish: F) -> StreamOutcome
where
    F: FnMut(usize, &str),
{
    let mut reconciler = StreamReconciler::new(index);

    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => {
                let text = reconciler.push(&chunk);
                publish(index, text);
            }
            Err(error) => {
                warn!(
                    chunks = reconciler.chunks(),
                    error = %error,
                    "Stream interrupted"
                );
                return StreamOutcome::Interrupted {
                    partial: reconciler.into_text(),
                    error,
                };
            }
        }
    }

    debug!(chunks = reconciler.chunks(), "Stream finished");
    StreamOutcome::Finished(reconciler.into_text())
}
