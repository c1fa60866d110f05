use encoding_rs::{CoderResult, Decoder, UTF_8};

/// Every frame line of the streaming response starts with this prefix.
pub const FRAME_PREFIX: &str = "data: ";

/// One prefix-matched line of the streaming response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: String,
}

impl Frame {
    /// Builds a frame from a full line, if it carries the frame prefix.
    pub fn from_line(line: &str) -> Option<Self> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        line.strip_prefix(FRAME_PREFIX).map(|payload| Self {
            payload: payload.to_string(),
        })
    }

    /// Text after the prefix, expected to be JSON.
    pub fn payload(&self) -> &str {
        &self.payload
    }
}

/// Reassembles frames from chunks whose boundaries ignore lines and UTF-8
/// sequences alike.
///
/// The decoder is single-pass: `finish` consumes it, so the tail of a stream
/// can only ever be flushed once.
pub struct FrameDecoder {
    decoder: Decoder,
    pending: String,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDecoder")
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            decoder: UTF_8.new_decoder_with_bom_removal(),
            pending: String::new(),
        }
    }

    /// Decodes `chunk` and returns every frame completed by it, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.decode(chunk, false);
        self.drain_lines()
    }

    /// Flushes the decoder after the transport reported end of stream.
    ///
    /// A final line without a terminating newline still counts as a frame
    /// when it carries the prefix.
    pub fn finish(mut self) -> Vec<Frame> {
        self.decode(&[], true);
        let mut frames = self.drain_lines();
        if let Some(frame) = Frame::from_line(&self.pending) {
            frames.push(frame);
        }
        frames
    }

    /// Text received after the last newline.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    fn decode(&mut self, mut src: &[u8], last: bool) {
        loop {
            let needed = self
                .decoder
                .max_utf8_buffer_length(src.len())
                .unwrap_or(src.len().saturating_mul(3).saturating_add(4));
            self.pending.reserve(needed);
            let (result, read, _had_replacements) =
                self.decoder.decode_to_string(src, &mut self.pending, last);
            src = &src[read..];
            match result {
                CoderResult::InputEmpty => break,
                CoderResult::OutputFull => continue,
            }
        }
    }

    fn drain_lines(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].find('\n') {
            let end = start + offset;
            if let Some(frame) = Frame::from_line(&self.pending[start..end]) {
                frames.push(frame);
            }
            start = end + 1;
        }
        self.pending.drain(..start);
        frames
    }
}
