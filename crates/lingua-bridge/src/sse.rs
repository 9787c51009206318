//! Server-sent events line reassembly
//!
//! Network chunks split SSE text at arbitrary byte positions. The parser
//! buffers the trailing partial line so every complete line is yielded
//! exactly once.

/// Payload marking the end of an `OpenAI`-style stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Stateful splitter turning raw text chunks into complete lines
#[derive(Debug, Default)]
pub struct SseLineParser {
    buffer: String,
}

impl SseLineParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completes
    pub fn process_chunk(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);

        let Some(last_newline) = self.buffer.rfind('\n') else {
            return Vec::new();
        };

        let remainder = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, remainder);
        split_lines(&complete)
    }

    /// Drain whatever is still buffered as final lines
    pub fn flush(&mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.buffer);
        split_lines(&rest)
    }

    pub const fn has_remaining(&self) -> bool {
        !self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Payload of a `data:` line, or `None` for any other field
pub fn data_payload(line: &str) -> Option<&str> {
    let value = line.strip_prefix("data:")?;
    Some(value.strip_prefix(' ').unwrap_or(value))
}
