//! I/O helpers for delimited text: delimiter defaults, decoding and reader
//! construction.
//!
//! Every delimited read flows through [`open_decoded_reader`], which
//! transcodes the file to UTF-8 with `encoding_rs_io` before `csv` sees it,
//! so the rest of the crate only ever handles UTF-8 records.

use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::{Encoding, UTF_8};
use encoding_rs_io::DecodeReaderBytesBuilder;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

/// Delimiter implied by the file extension alone.
pub fn default_delimiter(path: &Path) -> u8 {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    }
}

pub fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}

/// Reads at most `limit` leading bytes.
pub fn read_sample(path: &Path, limit: usize) -> Result<Vec<u8>> {
    let file = File::open(path).with_context(|| format!("Opening input file {path:?}"))?;
    let mut sample = Vec::with_capacity(limit.min(1 << 20));
    file.take(limit as u64)
        .read_to_end(&mut sample)
        .with_context(|| format!("Reading leading bytes of {path:?}"))?;
    Ok(sample)
}

/// Opens `path` as a UTF-8 stream; bytes invalid in `encoding` become U+FFFD.
pub fn open_decoded_reader(path: &Path, encoding: &'static Encoding) -> Result<Box<dyn Read>> {
    let file = File::open(path).with_context(|| format!("Opening input file {path:?}"))?;
    let decoder = DecodeReaderBytesBuilder::new()
        .encoding(Some(encoding))
        .bom_override(true)
        .strip_bom(true)
        .build(file);
    Ok(Box::new(BufReader::new(decoder)))
}

/// Flexible reader: row width is checked by the loader, not by `csv`.
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

pub fn open_csv_reader_from_path(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<csv::Reader<Box<dyn Read>>> {
    Ok(open_csv_reader(
        open_decoded_reader(path, encoding)?,
        delimiter,
    ))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, UTF_8))
        .collect()
}

pub fn reader_headers<R>(reader: &mut csv::Reader<R>) -> Result<Vec<String>>
where
    R: Read,
{
    let headers = reader
        .byte_headers()
        .context("Reading header row")?
        .clone();
    decode_record(&headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn tsv_extension_defaults_to_tab() {
        assert_eq!(default_delimiter(Path::new("data.TSV")), b'\t');
        assert_eq!(default_delimiter(Path::new("data.txt")), b',');
    }

    #[test]
    fn decoded_reader_transcodes_latin1_and_strips_bom() {
        let dir = tempfile::tempdir().expect("temp dir");
        let latin = dir.path().join("latin.csv");
        std::fs::write(&latin, b"name\ncaf\xe9\n").expect("write");
        let mut reader = open_csv_reader_from_path(&latin, b',', encoding_rs::WINDOWS_1252)
            .expect("open");
        assert_eq!(reader_headers(&mut reader).expect("headers"), vec!["name"]);
        let record = reader.byte_records().next().expect("row").expect("record");
        assert_eq!(decode_record(&record).expect("decode"), vec!["café"]);

        let bom = dir.path().join("bom.csv");
        let mut file = File::create(&bom).expect("create");
        file.write_all(b"\xef\xbb\xbfid,value\n1,2\n").expect("write");
        let mut reader = open_csv_reader_from_path(&bom, b',', UTF_8).expect("open");
        assert_eq!(
            reader_headers(&mut reader).expect("headers"),
            vec!["id", "value"]
        );
    }
}
