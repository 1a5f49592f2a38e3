//! Server-sent events framing.
//!
//! Bytes are buffered until a blank line closes an event, so multi-byte UTF-8
//! sequences split across network chunks are never decoded half-way.

/// Incremental SSE decoder yielding the `data:` payload of each event.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a network chunk and return the payloads of every event it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some((end, sep_len)) = find_event_boundary(&self.buffer) {
            let event: Vec<u8> = self.buffer.drain(..end + sep_len).take(end).collect();
            if let Some(data) = event_data(&event) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Flush whatever remains once the byte stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        event_data(&rest)
    }
}

/// Position of the first blank-line separator and its length.
fn find_event_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| (p, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Join the `data:` lines of one event; comments and other fields are ignored.
fn event_data(event: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(event);
    let lines: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}
