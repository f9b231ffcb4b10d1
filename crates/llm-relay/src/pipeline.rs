// The reader/writer pair for one streaming request: an upstream byte
// stream is framed (SSE or NDJSON), run through the per-stream
// translator, and the client chunks are pushed over an mpsc channel.
//
// Ordering: a single reader task owns the translator state, so all client
// chunks for one upstream response are strictly ordered. Cancellation:
// dropping the receiver makes the next send fail and the reader stop
// after releasing the upstream stream. Timeout: the first upstream frame
// has a bounded wait; silence is a fatal stream error.

use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use llm_relay_types::Error;

use crate::translate::StreamTranslator;
use crate::util::sse::SseParser;

/// Default bound on the wait for the first upstream frame.
pub const DEFAULT_FIRST_CHUNK_TIMEOUT: Duration = Duration::from_secs(30);

/// How the upstream bytes are framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `data:`/`event:` lines separated by blank lines.
    Sse,
    /// One JSON document per line.
    Ndjson,
}

/// Options for a stream pump.
pub struct PumpOptions {
    pub framing: Framing,
    pub first_chunk_timeout: Duration,
    /// Channel capacity; bounds in-flight client chunks.
    pub buffer: usize,
}

impl Default for PumpOptions {
    fn default() -> Self {
        Self {
            framing: Framing::Sse,
            first_chunk_timeout: DEFAULT_FIRST_CHUNK_TIMEOUT,
            buffer: 32,
        }
    }
}

/// Spawn the reader task: consume `upstream`, translate through
/// `translator`, and push client chunks into the returned receiver.
///
/// The receiver yields `Ok(chunk)` per client chunk and a final `Err` on
/// upstream failure or first-chunk timeout. Dropping the receiver cancels
/// the reader.
pub fn pump_stream<S>(
    upstream: S,
    mut translator: StreamTranslator,
    options: PumpOptions,
) -> mpsc::Receiver<Result<Vec<u8>, Error>>
where
    S: Stream<Item = Result<Vec<u8>, Error>> + Send + Unpin + 'static,
{
    let (tx, rx) = mpsc::channel(options.buffer.max(1));

    tokio::spawn(async move {
        let mut upstream = upstream;
        let mut parser = SseParser::new();
        let mut line_buffer = String::new();
        let mut first = true;

        loop {
            let next = if first {
                match tokio::time::timeout(options.first_chunk_timeout, upstream.next()).await {
                    Ok(item) => item,
                    Err(_) => {
                        let _ = tx
                            .send(Err(Error::timeout(format!(
                                "no upstream data within {:?}",
                                options.first_chunk_timeout
                            ))))
                            .await;
                        return;
                    }
                }
            } else {
                upstream.next().await
            };

            let bytes = match next {
                Some(Ok(bytes)) => bytes,
                Some(Err(err)) => {
                    let _ = tx.send(Err(err)).await;
                    return;
                }
                None if first => {
                    let _ = tx
                        .send(Err(Error::stream("upstream closed before any data")))
                        .await;
                    return;
                }
                None => break,
            };
            first = false;

            let frames = match options.framing {
                Framing::Sse => {
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    parser
                        .feed(&text)
                        .into_iter()
                        .map(|e| frame_bytes(&e))
                        .collect::<Vec<_>>()
                }
                Framing::Ndjson => split_ndjson(&mut line_buffer, &bytes),
            };

            for frame in frames {
                match translator.process_chunk(&frame) {
                    Ok(chunks) => {
                        for chunk in chunks {
                            if tx.send(Ok(chunk)).await.is_err() {
                                // Client went away; stop reading.
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(Err(err)).await;
                        return;
                    }
                }
            }
        }

        // Upstream ended: flush an unterminated SSE event, then let the
        // translator synthesize a trailing finish where the protocol
        // needs one.
        if options.framing == Framing::Sse {
            if let Some(event) = parser.finish() {
                match translator.process_chunk(&frame_bytes(&event)) {
                    Ok(chunks) => {
                        for chunk in chunks {
                            if tx.send(Ok(chunk)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(err) => tracing::warn!("dropping unparseable trailing frame: {err}"),
                }
            }
        } else if !line_buffer.trim().is_empty() {
            let tail = std::mem::take(&mut line_buffer);
            match translator.process_chunk(tail.trim().as_bytes()) {
                Ok(chunks) => {
                    for chunk in chunks {
                        if tx.send(Ok(chunk)).await.is_err() {
                            return;
                        }
                    }
                }
                Err(err) => tracing::warn!("dropping unparseable trailing line: {err}"),
            }
        }

        if let Ok(chunks) = translator.finalize() {
            for chunk in chunks {
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
        }
    });

    rx
}

/// Rebuild a raw SSE frame for the frame-oriented chunk parsers. Parsers
/// accept either bare JSON or a single `data:` line; the event type is
/// folded into the payload line-wise for typed streams (Claude).
fn frame_bytes(event: &crate::util::sse::SseEvent) -> Vec<u8> {
    // The chunk parsers key on the `type` field inside the data payload,
    // so the data line alone is sufficient.
    event.data.clone().into_bytes()
}

fn split_ndjson(buffer: &mut String, bytes: &[u8]) -> Vec<Vec<u8>> {
    buffer.push_str(&String::from_utf8_lossy(bytes));
    let mut frames = Vec::new();
    while let Some(pos) = buffer.find('\n') {
        let line: String = buffer.drain(..pos + 1).collect();
        let line = line.trim();
        if !line.is_empty() {
            frames.push(line.as_bytes().to_vec());
        }
    }
    frames
}
