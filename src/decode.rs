//! Incremental UTF-8 decoding for network chunks.
//!
//! Transfer chunking is byte-oriented, so a multi-byte character can be cut
//! anywhere by the transport. The decoder keeps the incomplete tail of each
//! chunk and prepends it to the next one, which makes the concatenation of
//! all `feed` outputs exactly equal to decoding the whole byte stream once.

/// Stateful byte-to-text decoder.
///
/// Invalid sequences are rendered as U+FFFD and never abort the caller; an
/// incomplete sequence at the end of a chunk is carried over (at most three
/// bytes) and either completed by the next chunk or emitted best-effort by
/// [`ChunkDecoder::flush`] at end of stream.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    carry: Vec<u8>,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes`, returning all complete text produced so far.
    pub fn feed(&mut self, bytes: &[u8]) -> String {
        self.carry.extend_from_slice(bytes);

        let mut out = String::with_capacity(self.carry.len());
        let mut pos = 0;
        loop {
            match std::str::from_utf8(&self.carry[pos..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    pos = self.carry.len();
                    break;
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    if let Ok(valid) = std::str::from_utf8(&self.carry[pos..pos + valid_up_to]) {
                        out.push_str(valid);
                    }
                    pos += valid_up_to;
                    match err.error_len() {
                        // Definitely malformed: substitute and resume after it.
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            pos += bad;
                        }
                        // Incomplete tail: wait for the next chunk.
                        None => break,
                    }
                }
            }
        }
        self.carry.drain(..pos);
        out
    }

    /// Emit whatever is still buffered at end of stream.
    ///
    /// A tail that never became a complete character is rendered with the
    /// replacement policy. Never fails.
    pub fn flush(&mut self) -> String {
        if self.carry.is_empty() {
            return String::new();
        }
        let out = String::from_utf8_lossy(&self.carry).into_owned();
        self.carry.clear();
        out
    }

    /// True when no partial sequence is pending.
    pub fn is_empty(&self) -> bool {
        self.carry.is_empty()
    }
}
