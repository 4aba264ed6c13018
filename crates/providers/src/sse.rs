//! Server-sent-events plumbing shared by both adapters.
//!
//! Both backends stream `data:` payloads separated by blank lines. The
//! adapters only differ in how a payload turns into [`StreamEvent`]s, so
//! they hand a parser closure to [`sse_response_stream`].

use crate::util::from_reqwest;
use ed_domain::error::Result;
use ed_domain::stream::{BoxStream, StreamEvent};

/// Pull every complete `data:` payload out of `buffer`.
///
/// Consumed bytes are removed; a trailing partial event stays in the buffer
/// for the next chunk. `event:`, `id:` and `retry:` lines are ignored.
pub(crate) fn drain_data_lines(buffer: &mut String) -> Vec<String> {
    let mut payloads = Vec::new();

    while let Some(pos) = buffer.find("\n\n") {
        let block: String = buffer.drain(..pos + 2).collect();
        payloads.extend(
            block
                .lines()
                .filter_map(|line| line.trim().strip_prefix("data:"))
                .map(str::trim)
                .filter(|data| !data.is_empty())
                .map(String::from),
        );
    }

    payloads
}

/// Decode `bytes` appended to `pending`, keeping an incomplete UTF-8
/// sequence at the end for the next chunk. Invalid bytes become U+FFFD.
pub(crate) fn decode_utf8_chunk(pending: &mut Vec<u8>, bytes: &[u8]) -> String {
    pending.extend_from_slice(bytes);
    let mut out = String::new();
    let mut start = 0;

    while start < pending.len() {
        match std::str::from_utf8(&pending[start..]) {
            Ok(valid) => {
                out.push_str(valid);
                start = pending.len();
            }
            Err(e) => {
                let valid_end = start + e.valid_up_to();
                out.push_str(&String::from_utf8_lossy(&pending[start..valid_end]));
                match e.error_len() {
                    Some(len) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        start = valid_end + len;
                    }
                    None => {
                        start = valid_end;
                        break;
                    }
                }
            }
        }
    }

    pending.drain(..start);
    out
}

/// Turn an SSE response into a [`BoxStream`] of events.
///
/// `parse_data` is `FnMut` because the Anthropic parser keeps usage
/// counters between payloads. A `Done` event is always the last item: if the
/// parser never produced one, a synthetic `Done` with `finish_reason = stop`
/// is emitted once the body closes. A transport error ends the stream with
/// that error and no `Done`.
pub(crate) fn sse_response_stream<F>(
    response: reqwest::Response,
    mut parse_data: F,
) -> BoxStream<'static, Result<StreamEvent>>
where
    F: FnMut(&str) -> Vec<Result<StreamEvent>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = String::new();
        let mut pending = Vec::new();
        let mut done_emitted = false;
        let mut failed = false;

        loop {
            let closed = match response.chunk().await {
                Ok(Some(bytes)) => {
                    buffer.push_str(&decode_utf8_chunk(&mut pending, &bytes));
                    false
                }
                Ok(None) => {
                    if !pending.is_empty() {
                        buffer.push_str(&String::from_utf8_lossy(&pending));
                        pending.clear();
                    }
                    // Flush a final event that was not blank-line terminated.
                    if !buffer.trim().is_empty() {
                        buffer.push_str("\n\n");
                    }
                    true
                }
                Err(e) => {
                    failed = true;
                    yield Err(from_reqwest(e));
                    break;
                }
            };

            for data in drain_data_lines(&mut buffer) {
                for event in parse_data(&data) {
                    if done_emitted {
                        continue;
                    }
                    if matches!(&event, Ok(StreamEvent::Done { .. })) {
                        done_emitted = true;
                    }
                    yield event;
                }
            }

            if closed {
                break;
            }
        }

        if !done_emitted && !failed {
            yield Ok(StreamEvent::Done {
                usage: None,
                finish_reason: Some("stop".into()),
            });
        }
    };

    Box::pin(stream)
}
