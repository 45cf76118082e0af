use bytes::{Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::codec::{
    LowMessage, HEADER_SIZE, MAX_LOGICAL_MESSAGE_SIZE, PADDING, PREAMBLE, PREAMBLE_SIZE,
};

/// Incremental parser fed with one received bus frame at a time.
///
/// Usage per exchange:
///
/// ```text
/// decoder.load_frame(rx);
/// loop {
///     let more = decoder.process();
///     if let Some(msg) = decoder.take_message() { /* route */ }
///     if !more { break; }
/// }
/// ```
pub trait FrameDecoder: Send {
    /// Load a freshly received bus frame, replacing any unprocessed remainder.
    fn load_frame(&mut self, frame: &[u8]);

    /// Advance through the loaded frame, stopping after each completed message.
    ///
    /// Returns `true` while unprocessed bytes remain in the loaded frame.
    fn process(&mut self) -> bool;

    /// Take the message completed by the last [`process`](Self::process) call.
    fn take_message(&mut self) -> Option<LowMessage>;

    /// Whether the decoder sits between messages.
    ///
    /// A decoder that is not idle needs more frames to finish the current message.
    fn is_idle(&self) -> bool;
}

/// Running decoder statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Frames loaded.
    pub frames: u64,
    /// Frames without a valid preamble.
    pub skipped_frames: u64,
    /// Partial messages abandoned.
    pub resyncs: u64,
    /// Complete messages produced.
    pub messages: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Header,
    Body,
}

/// Default [`FrameDecoder`]: checks the preamble, then walks the data region
/// collecting header and payload bytes, carrying partial messages over to the
/// next frame.
#[derive(Debug)]
pub struct LowMessageDecoder {
    region: Bytes,
    pos: usize,
    state: State,
    header: [u8; HEADER_SIZE],
    header_len: usize,
    body: BytesMut,
    body_remaining: usize,
    complete: Option<LowMessage>,
    stats: DecoderStats,
}

impl Default for LowMessageDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl LowMessageDecoder {
    /// Create an idle decoder.
    pub fn new() -> Self {
        Self {
            region: Bytes::new(),
            pos: 0,
            state: State::Idle,
            header: [0; HEADER_SIZE],
            header_len: 0,
            body: BytesMut::new(),
            body_remaining: 0,
            complete: None,
            stats: DecoderStats::default(),
        }
    }

    /// Statistics since creation.
    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    fn resync(&mut self, reason: &'static str) {
        if self.state != State::Idle {
            warn!(reason, state = ?self.state, "abandoning partial message");
            self.stats.resyncs += 1;
        }
        self.state = State::Idle;
        self.header_len = 0;
        self.body.clear();
        self.body_remaining = 0;
    }

    fn finish_message(&mut self) {
        let length = u16::from_le_bytes([self.header[1], self.header[2]]);
        let msg = LowMessage {
            msg_type: self.header[0],
            length,
            flags: self.header[3],
            channel: self.header[4],
            function: self.header[5],
            payload: self.body.split().freeze(),
        };
        trace!(channel = msg.channel, length, "message complete");
        self.stats.messages += 1;
        self.complete = Some(msg);
        self.state = State::Idle;
        self.header_len = 0;
    }

    fn remaining(&self) -> &[u8] {
        &self.region[self.pos..]
    }
}

impl FrameDecoder for LowMessageDecoder {
    fn load_frame(&mut self, frame: &[u8]) {
        self.stats.frames += 1;
        if frame.len() <= PREAMBLE_SIZE || frame[..PREAMBLE_SIZE] != PREAMBLE {
            self.stats.skipped_frames += 1;
            self.resync("frame without preamble");
            self.region = Bytes::new();
            self.pos = 0;
            return;
        }
        self.region = Bytes::copy_from_slice(&frame[PREAMBLE_SIZE..]);
        self.pos = 0;
    }

    fn process(&mut self) -> bool {
        while self.pos < self.region.len() {
            match self.state {
                State::Idle => {
                    if self.region[self.pos] == PADDING {
                        self.pos = self.region.len();
                        return false;
                    }
                    self.state = State::Header;
                    self.header_len = 0;
                }
                State::Header => {
                    let take = (HEADER_SIZE - self.header_len).min(self.remaining().len());
                    let start = self.pos;
                    self.header[self.header_len..self.header_len + take]
                        .copy_from_slice(&self.region[start..start + take]);
                    self.header_len += take;
                    self.pos += take;
                    if self.header_len < HEADER_SIZE {
                        continue;
                    }

                    let length = u16::from_le_bytes([self.header[1], self.header[2]]) as usize;
                    if !(HEADER_SIZE..=MAX_LOGICAL_MESSAGE_SIZE).contains(&length) {
                        debug!(length, "invalid declared length, dropping rest of region");
                        self.resync("invalid declared length");
                        self.pos = self.region.len();
                        return false;
                    }
                    self.body.clear();
                    self.body.reserve(length - HEADER_SIZE);
                    self.body_remaining = length - HEADER_SIZE;
                    self.state = State::Body;
                    if self.body_remaining == 0 {
                        self.finish_message();
                        return self.pos < self.region.len();
                    }
                }
                State::Body => {
                    let take = self.body_remaining.min(self.remaining().len());
                    let start = self.pos;
                    self.body
                        .extend_from_slice(&self.region[start..start + take]);
                    self.body_remaining -= take;
                    self.pos += take;
                    if self.body_remaining == 0 {
                        self.finish_message();
                        return self.pos < self.region.len();
                    }
                }
            }
        }
        false
    }

    fn take_message(&mut self) -> Option<LowMessage> {
        self.complete.take()
    }

    fn is_idle(&self) -> bool {
        self.state == State::Idle
    }
}
