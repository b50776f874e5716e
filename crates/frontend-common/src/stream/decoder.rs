//! Streaming UTF-8 decoding

use std::char::REPLACEMENT_CHARACTER;

/// Stateful UTF-8 decoder for chunked input
///
/// A multi-byte character split across chunks is held back until the rest
/// of it arrives. Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `chunk` as possible
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut text = String::with_capacity(self.pending.len());
        let mut input = self.pending.as_slice();
        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    text.push_str(valid);
                    input = &[];
                    break;
                }
                Err(err) => {
                    let (valid, rest) = input.split_at(err.valid_up_to());
                    text.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(len) => {
                            text.push(REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                        // truncated sequence at the end, wait for more bytes
                        None => {
                            input = rest;
                            break;
                        }
                    }
                }
            }
        }

        let consumed = self.pending.len() - input.len();
        self.pending.drain(..consumed);
        text
    }

    /// Bytes held back waiting for the rest of a character
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// End of input: a truncated trailing sequence becomes U+FFFD
    pub fn flush(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            REPLACEMENT_CHARACTER.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_passthrough() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"data: hello"), "data: hello");
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_multibyte_split_across_chunks() {
        let bytes = "näive ✓ 🌳".as_bytes();
        for split in 0..=bytes.len() {
            let mut decoder = Utf8Decoder::new();
            let mut text = decoder.decode(&bytes[..split]);
            text.push_str(&decoder.decode(&bytes[split..]));
            text.push_str(&decoder.flush());
            assert_eq!(text, "näive ✓ 🌳", "split at {split}");
        }
    }

    #[test]
    fn test_one_byte_at_a_time() {
        let bytes = "✓✓".as_bytes();
        let mut decoder = Utf8Decoder::new();
        let text: String = bytes.iter().map(|b| decoder.decode(&[*b])).collect();
        assert_eq!(text, "✓✓");
    }

    #[test]
    fn test_invalid_bytes_replaced() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"a\xFFb"), "a\u{FFFD}b");
        assert_eq!(decoder.decode(b"\xC3\x28"), "\u{FFFD}(");
    }

    #[test]
    fn test_flush_truncated_sequence() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"ok\xE2\x9C"), "ok");
        assert_eq!(decoder.pending(), 2);
        assert_eq!(decoder.flush(), "\u{FFFD}");
        assert_eq!(decoder.flush(), "");
    }
}
