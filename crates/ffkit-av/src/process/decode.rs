//! Incremental UTF-8 decoding of pipe chunks.

/// Decodes a byte stream chunk by chunk, carrying code points split across
/// chunk boundaries over to the next call.
#[derive(Debug, Default)]
pub(crate) struct Utf8Decoder {
    carry: Vec<u8>,
}

impl Utf8Decoder {
    pub(crate) fn decode(&mut self, chunk: &[u8]) -> String {
        self.carry.extend_from_slice(chunk);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.carry) {
                Ok(text) => {
                    out.push_str(text);
                    self.carry.clear();
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.carry[..valid]));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.carry.drain(..valid + len);
                        }
                        None => {
                            // Incomplete sequence at the end: wait for more.
                            self.carry.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush whatever is left, replacing an unfinished sequence.
    pub(crate) fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.carry).into_owned();
        self.carry.clear();
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_code_point_is_carried() {
        let bytes = "größe".as_bytes();
        let mut decoder = Utf8Decoder::default();
        // 'ö' is two bytes starting at index 2.
        let first = decoder.decode(&bytes[..3]);
        let second = decoder.decode(&bytes[3..]);
        assert_eq!(first, "gr");
        assert_eq!(second, "öße");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn invalid_bytes_are_replaced() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{FFFD}b");
    }

    #[test]
    fn unfinished_tail_is_flushed() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"x\xc3"), "x");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }
}
