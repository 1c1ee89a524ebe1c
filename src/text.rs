//! Text mode: character encodings and incremental decoding of stream reads.

use crate::error::{Error, Result};

/// Character encoding used by a text-mode session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// ISO-8859-1: every byte is one character. Never fails.
    #[default]
    Latin1,
    Utf8,
    /// 7-bit ASCII; bytes above 0x7F decode to U+FFFD.
    Ascii,
}

impl Encoding {
    /// Encodes `text`, rejecting characters the encoding cannot represent.
    pub fn encode(self, text: &str) -> Result<Vec<u8>> {
        match self {
            Encoding::Utf8 => Ok(text.as_bytes().to_vec()),
            Encoding::Latin1 => encode_narrow(text, 0xFF, "latin-1"),
            Encoding::Ascii => encode_narrow(text, 0x7F, "ascii"),
        }
    }
}

fn encode_narrow(text: &str, max: u32, name: &str) -> Result<Vec<u8>> {
    text.chars()
        .map(|c| {
            let code = u32::from(c);
            if code <= max {
                Ok(code as u8)
            } else {
                Err(Error::ArgumentOutOfRange(format!(
                    "character {:?} (U+{:04X}) cannot be encoded as {}",
                    c, code, name
                )))
            }
        })
        .collect()
}

/// Whether reads and writes carry raw bytes or text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Binary,
    Text(Encoding),
}

impl Mode {
    /// Text mode with the default encoding (latin-1).
    pub fn text() -> Self {
        Mode::Text(Encoding::default())
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Mode::Text(_))
    }
}

/// Incremental decoder. A multi-byte sequence split across two reads is held
/// back until the rest arrives.
#[derive(Debug, Clone)]
pub(crate) struct Decoder {
    encoding: Encoding,
    pending: Vec<u8>,
}

impl Decoder {
    pub(crate) fn new(encoding: Encoding) -> Self {
        Decoder {
            encoding,
            pending: Vec::new(),
        }
    }

    pub(crate) fn decode(&mut self, input: &[u8]) -> String {
        match self.encoding {
            Encoding::Latin1 => input.iter().map(|&b| char::from(b)).collect(),
            Encoding::Ascii => input
                .iter()
                .map(|&b| if b.is_ascii() { char::from(b) } else { char::REPLACEMENT_CHARACTER })
                .collect(),
            Encoding::Utf8 => self.decode_utf8(input),
        }
    }

    fn decode_utf8(&mut self, input: &[u8]) -> String {
        self.pending.extend_from_slice(input);
        let mut out = String::with_capacity(self.pending.len());
        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(s) => {
                    out.push_str(s);
                    start = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    if let Ok(s) = std::str::from_utf8(&self.pending[start..start + valid]) {
                        out.push_str(s);
                    }
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start += valid + len;
                        }
                        None => {
                            start += valid;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..start);
        out
    }

    /// Bytes held back waiting for the rest of a character.
    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn reset(&mut self) {
        self.pending.clear();
    }
}
