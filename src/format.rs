//! Encoding and delimiter detection from a bounded file prefix.
//!
//! TSE files changed both their character set and their field separator
//! across releases. Detection never fails: when every candidate encoding
//! rejects the sample, the last candidate is used with lossy substitution.

use std::borrow::Cow;

use encoding_rs::{Encoding, ISO_8859_15, UTF_8, WINDOWS_1252};
use serde::{Serialize, Serializer, ser::SerializeStruct};

use crate::io_utils;

/// Prefix length used for detection; large enough for the header and a few
/// hundred rows of the widest TSE layouts.
pub const DEFAULT_SAMPLE_BYTES: usize = 200_000;

/// Encodings tried in order. `windows-1252` is what `latin1` resolves to
/// under the WHATWG labels used by `encoding_rs`.
pub fn candidate_encodings() -> [&'static Encoding; 3] {
    [UTF_8, WINDOWS_1252, ISO_8859_15]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatProfile {
    pub encoding: &'static Encoding,
    pub delimiter: u8,
}

impl Serialize for FormatProfile {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("FormatProfile", 2)?;
        state.serialize_field("encoding", self.encoding.name())?;
        state.serialize_field("delimiter", &(self.delimiter as char))?;
        state.end()
    }
}

pub fn detect(sample: &[u8]) -> FormatProfile {
    let (encoding, text) = decode_sample(io_utils::strip_utf8_bom(sample));
    FormatProfile {
        encoding,
        delimiter: choose_delimiter(&text),
    }
}

/// Majority of `;` versus `,`; `;` wins ties.
pub fn choose_delimiter(text: &str) -> u8 {
    let (semicolons, commas) = text.bytes().fold((0usize, 0usize), |(s, c), byte| match byte {
        b';' => (s + 1, c),
        b',' => (s, c + 1),
        _ => (s, c),
    });
    if semicolons >= commas { b';' } else { b',' }
}

fn decode_sample(sample: &[u8]) -> (&'static Encoding, Cow<'_, str>) {
    let candidates = candidate_encodings();
    for encoding in candidates {
        if let Some(text) = try_decode(sample, encoding) {
            return (encoding, text);
        }
    }
    let fallback = candidates[candidates.len() - 1];
    let (text, _) = fallback.decode_without_bom_handling(sample);
    (fallback, text)
}

fn try_decode<'a>(sample: &'a [u8], encoding: &'static Encoding) -> Option<Cow<'a, str>> {
    if encoding == UTF_8 {
        // The sample boundary may split a multi-byte sequence.
        return match std::str::from_utf8(sample) {
            Ok(text) => Some(Cow::Borrowed(text)),
            Err(err) if err.error_len().is_none() => std::str::from_utf8(&sample[..err.valid_up_to()])
                .ok()
                .map(Cow::Borrowed),
            Err(_) => None,
        };
    }
    encoding.decode_without_bom_handling_and_without_replacement(sample)
}
