//! I/O utilities for sampling, decoding, and tokenizing raw election files.
//!
//! Every raw file flows through this module on its way to the loader:
//!
//! - **Sampling**: [`read_sample`] pulls a bounded prefix used for format
//!   detection, and [`rejoin_sample`] stitches it back in front of the rest of
//!   the stream so nothing is read twice.
//! - **Decoding**: [`decode_reader`] transcodes the detected encoding into
//!   UTF-8 on the fly via `encoding_rs_io`, replacing undecodable bytes.
//! - **Tokenizing**: [`open_csv_reader`] builds a flexible `csv` reader for the
//!   detected delimiter so ragged lines can be triaged instead of aborting.

use std::{
    fs::File,
    io::{self, BufReader, Cursor, Read},
    path::Path,
};

use anyhow::{Context, Result};
use encoding_rs_io::{DecodeReaderBytes, DecodeReaderBytesBuilder};

use crate::format::FormatProfile;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub fn read_sample<R: Read>(reader: &mut R, limit: usize) -> io::Result<Vec<u8>> {
    let mut sample = Vec::with_capacity(limit.min(1 << 20));
    reader.take(limit as u64).read_to_end(&mut sample)?;
    Ok(sample)
}

pub fn rejoin_sample<R: Read>(sample: Vec<u8>, rest: R) -> io::Chain<Cursor<Vec<u8>>, R> {
    Cursor::new(sample).chain(rest)
}

pub fn strip_utf8_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
}

pub fn decode_reader<R: Read>(reader: R, profile: FormatProfile) -> DecodeReaderBytes<R, Vec<u8>> {
    DecodeReaderBytesBuilder::new()
        .encoding(Some(profile.encoding))
        .bom_override(true)
        .strip_bom(true)
        .build(reader)
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn open_file(path: &Path) -> Result<BufReader<File>> {
    Ok(BufReader::new(
        File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
    ))
}

/// Trims whitespace and a stray byte-order mark from a header cell.
pub fn clean_header(name: &str) -> &str {
    name.trim_start_matches('\u{feff}').trim()
}

pub fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::WINDOWS_1252;

    #[test]
    fn read_sample_is_bounded_and_rejoin_restores_stream() {
        let mut source = Cursor::new(b"NR_TURNO;SG_UF\n1;SP\n".to_vec());
        let sample = read_sample(&mut source, 8).expect("sample");
        assert_eq!(sample, b"NR_TURNO");

        let mut restored = String::new();
        rejoin_sample(sample, source)
            .read_to_string(&mut restored)
            .expect("read rejoined");
        assert_eq!(restored, "NR_TURNO;SG_UF\n1;SP\n");
    }

    #[test]
    fn decode_reader_transcodes_legacy_bytes() {
        let (encoded, _, _) = WINDOWS_1252.encode("NM_MUNICIPIO\nSÃO PAULO\n");
        let profile = FormatProfile {
            encoding: WINDOWS_1252,
            delimiter: b';',
        };
        let mut decoded = String::new();
        decode_reader(encoded.as_ref(), profile)
            .read_to_string(&mut decoded)
            .expect("decode");
        assert_eq!(decoded, "NM_MUNICIPIO\nSÃO PAULO\n");
    }

    #[test]
    fn clean_header_strips_bom_and_padding() {
        assert_eq!(clean_header("\u{feff}NR_TURNO "), "NR_TURNO");
        assert_eq!(strip_utf8_bom(b"\xEF\xBB\xBFab"), b"ab");
        assert_eq!(strip_utf8_bom(b"ab"), b"ab");
    }
}
