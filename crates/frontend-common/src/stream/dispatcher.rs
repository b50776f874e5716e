//! Framing and classification of pipeline events

use super::decoder::Utf8Decoder;
use bonsai_core::JobMessage;
use futures::{Stream, StreamExt};

/// Prefix every event segment carries
pub const DATA_PREFIX: &str = "data: ";
/// Separator between event segments
pub const SEGMENT_DELIMITER: &str = "\n\n";

/// How the transport ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The finished sentinel was received
    Finished,
    /// The body closed before the sentinel
    Ended,
}

/// Turns raw body chunks into [`JobMessage`]s in server order
///
/// Chunk boundaries have no effect on the produced sequence. Once the
/// finished sentinel has been produced nothing further is emitted.
#[derive(Debug, Default)]
pub struct StreamDispatcher {
    decoder: Utf8Decoder,
    buffer: String,
    finished: bool,
}

impl StreamDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning every message it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<JobMessage> {
        if self.finished {
            return Vec::new();
        }

        let text = self.decoder.decode(chunk);
        self.buffer.push_str(&text);

        let mut messages = Vec::new();
        while let Some(end) = self.buffer.find(SEGMENT_DELIMITER) {
            let rest = self.buffer.split_off(end + SEGMENT_DELIMITER.len());
            let segment = std::mem::replace(&mut self.buffer, rest);

            let Some(message) = parse_segment(&segment[..end]) else {
                continue;
            };
            let terminal = message.is_terminal();
            messages.push(message);
            if terminal {
                self.finished = true;
                self.buffer.clear();
                break;
            }
        }
        messages
    }

    /// Whether the finished sentinel has been seen
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Signal end of input
    ///
    /// An unterminated trailing segment is discarded.
    pub fn finish(&mut self) -> StreamOutcome {
        self.buffer.push_str(&self.decoder.flush());
        if !self.buffer.is_empty() {
            tracing::debug!(
                len = self.buffer.len(),
                "discarding unterminated trailing segment"
            );
            self.buffer.clear();
        }

        if self.finished {
            StreamOutcome::Finished
        } else {
            StreamOutcome::Ended
        }
    }

    /// Consume `stream` to its end or to the finished sentinel
    ///
    /// The stream is dropped before returning, on every path.
    pub async fn drive<S, B, E, F>(
        mut self,
        stream: S,
        mut on_message: F,
    ) -> Result<StreamOutcome, E>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        F: FnMut(JobMessage),
    {
        let mut stream = std::pin::pin!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for message in self.push(chunk.as_ref()) {
                on_message(message);
            }
            if self.finished {
                return Ok(StreamOutcome::Finished);
            }
        }
        Ok(self.finish())
    }
}

/// Strip framing from one segment and classify its body
fn parse_segment(segment: &str) -> Option<JobMessage> {
    let Some(body) = segment.strip_prefix(DATA_PREFIX) else {
        tracing::debug!(segment, "ignoring segment without data prefix");
        return None;
    };
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    match JobMessage::classify(body) {
        Ok(message) => {
            tracing::debug!(%message, "pipeline message");
            Some(message)
        }
        Err(err) => {
            tracing::warn!(error = %err, "dropping malformed file tree message");
            None
        }
    }
}
