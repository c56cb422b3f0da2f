//! Materialises a [`Dataset`] from a validated file.
//!
//! Delimited text is decoded with the detected encoding and split with the
//! sniffed delimiter; workbooks go through `calamine`. Either way cells end
//! up as raw strings, types are inferred strictly per column, and the
//! [`DtypeOptimizer`] narrows storage before the table is handed out.

use std::io::Read;

use calamine::{Data, DataType, Range, Reader, open_workbook_auto};
use chrono::NaiveTime;
use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    config::Config,
    data::parse_typed_value,
    encoding::{EncodingDetector, sniff_delimiter},
    error::{Result, ScoutError, ValidationKind},
    frame::{Column, ColumnData, Dataset},
    io_utils,
    optimize::{DtypeOptimizer, OptimizationReport},
    schema::{infer_column_types, normalize_headers},
    validate::{FileKind, SheetSelector, ValidatedFile},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// At most this many data rows are read; the total beyond them is estimated.
    Sampled(usize),
    Full,
}

/// Where the table came from and how it was decoded.
#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub file_type: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sheet_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub dataset: Dataset,
    pub total_rows: usize,
    /// `false` when `total_rows` was extrapolated from the sample's byte span.
    pub total_rows_exact: bool,
    pub sampled: bool,
    pub source: SourceInfo,
    pub warnings: Vec<String>,
    pub optimization: OptimizationReport,
}

struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    total_rows: usize,
    exact: bool,
}

pub struct Loader<'a> {
    config: &'a Config,
    optimizer: DtypeOptimizer,
}

impl<'a> Loader<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            optimizer: DtypeOptimizer::default(),
        }
    }

    pub fn load(
        &self,
        file: &ValidatedFile,
        sheet: Option<&SheetSelector>,
        mode: LoadMode,
    ) -> Result<LoadedTable> {
        let mut warnings = Vec::new();
        let mut source = SourceInfo {
            file_type: file.extension.clone(),
            size: file.size,
            encoding: None,
            encoding_confidence: None,
            delimiter: None,
            sheet_names: Vec::new(),
            sheet: None,
        };
        let raw = match file.kind {
            FileKind::Delimited => self.read_delimited(file, mode, &mut source, &mut warnings)?,
            FileKind::Workbook => read_workbook(file, sheet, mode, &mut source)?,
        };
        let mut dataset = build_dataset(&raw)?;
        let optimization = self.optimizer.optimize(&mut dataset)?;
        if !optimization.changes.is_empty() {
            debug!(
                "Narrowed {} column(s), saving {} bytes",
                optimization.changes.len(),
                optimization.saved_bytes()
            );
        }
        let sampled = !raw.exact || dataset.row_count() < raw.total_rows;
        info!(
            "Loaded {} of {}{} row(s) x {} column(s) from {}",
            dataset.row_count(),
            if raw.exact { "" } else { "~" },
            raw.total_rows,
            dataset.column_count(),
            file.path.display()
        );
        Ok(LoadedTable {
            dataset,
            total_rows: raw.total_rows,
            total_rows_exact: raw.exact,
            sampled,
            source,
            warnings,
            optimization,
        })
    }

    fn read_delimited(
        &self,
        file: &ValidatedFile,
        mode: LoadMode,
        source: &mut SourceInfo,
        warnings: &mut Vec<String>,
    ) -> Result<RawTable> {
        let sample = io_utils::read_sample(&file.path, self.config.encoding_sample_bytes)
            .map_err(ScoutError::load_from)?;
        let detection =
            EncodingDetector::new(self.config.encoding_confidence_threshold).detect(&sample);
        if let Some(warning) = &detection.warning {
            warnings.push(warning.clone());
        }
        let (sample_text, _, _) = detection.encoding.decode(&sample);
        let delimiter = sniff_delimiter(&sample_text, io_utils::default_delimiter(&file.path));
        debug!(
            "Reading {} as {} (confidence {:.2}) with delimiter '{}'",
            file.path.display(),
            detection.name(),
            detection.confidence,
            io_utils::printable_delimiter(delimiter)
        );
        source.encoding = Some(detection.name().to_string());
        source.encoding_confidence = Some(detection.confidence);
        source.delimiter = Some(io_utils::printable_delimiter(delimiter));

        let mut reader =
            io_utils::open_csv_reader_from_path(&file.path, delimiter, detection.encoding)
                .map_err(ScoutError::load_from)?;
        read_records(&mut reader, mode, file.size, warnings)
    }
}

fn read_records<R: Read>(
    reader: &mut csv::Reader<R>,
    mode: LoadMode,
    file_size: u64,
    warnings: &mut Vec<String>,
) -> Result<RawTable> {
    let raw_headers = io_utils::reader_headers(reader).map_err(ScoutError::load_from)?;
    let blank_header = raw_headers.len() == 1 && raw_headers[0].trim().is_empty();
    if raw_headers.is_empty() || blank_header {
        return Err(ScoutError::load("file has no header row"));
    }
    let headers = normalize_headers(&raw_headers);
    let width = headers.len();
    let cap = match mode {
        LoadMode::Sampled(limit) => Some(limit),
        LoadMode::Full => None,
    };

    let header_end = reader.position().byte();
    let mut rows = Vec::new();
    let mut skipped = 0usize;
    let mut sample_end = None;
    let mut record = csv::ByteRecord::new();
    loop {
        let line = reader.position().line();
        let offset = reader.position().byte();
        let more = reader
            .read_byte_record(&mut record)
            .map_err(|err| ScoutError::load(format!("Reading line {line}: {err}")))?;
        if !more {
            break;
        }
        if cap.is_some_and(|cap| rows.len() >= cap) {
            sample_end = Some(offset);
            break;
        }
        let line = record.position().map_or(line, |p| p.line());
        if record.len() > width {
            match mode {
                LoadMode::Full => {
                    return Err(ScoutError::load(format!(
                        "line {line} has {} fields, expected {width}",
                        record.len()
                    )));
                }
                LoadMode::Sampled(_) => {
                    skipped += 1;
                    continue;
                }
            }
        }
        let mut decoded = io_utils::decode_record(&record)
            .map_err(|err| ScoutError::Encoding {
                message: format!("line {line}: {err:#}"),
            })?;
        decoded.resize(width, String::new());
        rows.push(decoded);
    }
    if skipped > 0 {
        let message = format!("Skipped {skipped} malformed line(s) with more fields than the header");
        warn!("{message}");
        warnings.push(message);
    }
    let (total_rows, exact) = match sample_end {
        None => (rows.len(), true),
        Some(end) => {
            let consumed = rows.len() + skipped;
            let estimate = estimate_rows(consumed, end.saturating_sub(header_end), file_size.saturating_sub(end));
            (rows.len() + estimate, false)
        }
    };
    Ok(RawTable {
        headers,
        rows,
        total_rows,
        exact,
    })
}

/// Rows expected in `remaining` bytes, given `consumed` rows took `sample_bytes`.
fn estimate_rows(consumed: usize, sample_bytes: u64, remaining: u64) -> usize {
    if consumed == 0 || sample_bytes == 0 {
        return 1;
    }
    let per_row = sample_bytes as f64 / consumed as f64;
    ((remaining as f64 / per_row).round() as usize).max(1)
}

fn read_workbook(
    file: &ValidatedFile,
    sheet: Option<&SheetSelector>,
    mode: LoadMode,
    source: &mut SourceInfo,
) -> Result<RawTable> {
    let mut workbook = open_workbook_auto(&file.path)
        .map_err(|err| ScoutError::load(format!("Opening workbook: {err}")))?;
    let sheet_names = workbook.sheet_names().to_vec();
    if sheet_names.is_empty() {
        return Err(ScoutError::load("workbook has no worksheets"));
    }
    let name = match sheet {
        None => sheet_names[0].clone(),
        Some(SheetSelector::Index(idx)) => sheet_names.get(*idx).cloned().ok_or_else(|| {
            ScoutError::validation(
                ValidationKind::InvalidSheet,
                format!(
                    "Sheet index {idx} is out of range; the workbook has {} sheet(s)",
                    sheet_names.len()
                ),
            )
        })?,
        Some(SheetSelector::Name(wanted)) => sheet_names
            .iter()
            .find(|name| *name == wanted)
            .cloned()
            .ok_or_else(|| {
                ScoutError::validation(
                    ValidationKind::InvalidSheet,
                    format!(
                        "Sheet '{wanted}' not found. Available sheets: {}",
                        sheet_names.join(", ")
                    ),
                )
            })?,
    };
    let range = workbook
        .worksheet_range(&name)
        .map_err(|err| ScoutError::load(format!("Reading sheet '{name}': {err}")))?;
    debug!("Sheet '{name}' spans {:?}", range.get_size());
    source.sheet_names = sheet_names;
    source.sheet = Some(name);
    range_to_raw(&range, mode)
}

fn range_to_raw(range: &Range<Data>, mode: LoadMode) -> Result<RawTable> {
    let mut rows = range.rows();
    let raw_headers = rows
        .next()
        .map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>())
        .unwrap_or_default();
    if raw_headers.is_empty() {
        return Err(ScoutError::load("worksheet is empty"));
    }
    let headers = normalize_headers(&raw_headers);
    let width = headers.len();
    let total_rows = range.height().saturating_sub(1);
    let limit = match mode {
        LoadMode::Sampled(limit) => limit,
        LoadMode::Full => usize::MAX,
    };
    let rows = rows
        .take(limit)
        .map(|row| {
            let mut cells = row.iter().map(cell_to_string).collect::<Vec<_>>();
            cells.resize(width, String::new());
            cells
        })
        .collect();
    Ok(RawTable {
        headers,
        rows,
        total_rows,
        exact: true,
    })
}

/// Renders a cell in the textual form the type inference understands.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{f:.0}"),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(_) => match cell.as_datetime() {
            Some(dt) if dt.time() == NaiveTime::MIN => dt.format("%Y-%m-%d").to_string(),
            Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => cell.to_string(),
        },
    }
}

fn build_dataset(raw: &RawTable) -> Result<Dataset> {
    let width = raw.headers.len();
    let types = infer_column_types(width, &raw.rows);
    let columns = raw
        .headers
        .iter()
        .zip(&types)
        .enumerate()
        .map(|(idx, (name, ty))| {
            let values = raw
                .rows
                .iter()
                .map(|row| parse_typed_value(row.get(idx).map_or("", String::as_str), ty))
                .collect::<anyhow::Result<Vec<_>>>()
                .map_err(|err| ScoutError::load(format!("column '{name}': {err:#}")))?;
            let data = ColumnData::from_values(*ty, values)?;
            debug!("Column '{name}' inferred as {ty}");
            Ok(Column::new(name.clone(), data))
        })
        .collect::<Result<Vec<_>>>()?;
    Dataset::new(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::Validator;

    fn load(contents: &[u8], name: &str, mode: LoadMode) -> Result<LoadedTable> {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(name);
        std::fs::write(&path, contents).expect("write");
        let config = Config::default();
        let file = Validator::new(&config).validate_file(&path)?;
        Loader::new(&config).load(&file, None, mode)
    }

    #[test]
    fn sampled_mode_stops_at_the_cap_and_estimates_the_rest() {
        let mut csv = String::from("id,name\n");
        for i in 0..250 {
            csv.push_str(&format!("{i},n{i}\n"));
        }
        let loaded = load(csv.as_bytes(), "ids.csv", LoadMode::Sampled(100)).expect("load");
        assert_eq!(loaded.dataset.row_count(), 100);
        assert!(loaded.sampled);
        assert!(!loaded.total_rows_exact);
        assert!((200..=400).contains(&loaded.total_rows), "estimate {}", loaded.total_rows);

        let short = load(csv.as_bytes(), "ids.csv", LoadMode::Sampled(500)).expect("load");
        assert!(short.total_rows_exact);
        assert_eq!(short.total_rows, 250);
        assert!(!short.sampled);
    }

    #[test]
    fn lines_past_the_cap_are_not_inspected() {
        let csv = b"a,b\n1,2\n3,4\n5,6,7\n8,9,10\n";
        let loaded = load(csv, "tail.csv", LoadMode::Sampled(2)).expect("load");
        assert_eq!(loaded.dataset.row_count(), 2);
        assert!(loaded.warnings.is_empty());
    }

    #[test]
    fn row_estimate_scales_with_remaining_bytes() {
        assert_eq!(estimate_rows(10, 100, 1_000), 100);
        assert_eq!(estimate_rows(0, 0, 50), 1);
    }

    #[test]
    fn over_wide_lines_are_skipped_when_sampling_and_fatal_in_full_mode() {
        let csv = b"a,b\n1,2\n3,4,5\n6,7\n";
        let loaded = load(csv, "wide.csv", LoadMode::Sampled(10)).expect("load");
        assert_eq!(loaded.dataset.row_count(), 2);
        assert_eq!(loaded.warnings.len(), 1);

        let err = load(csv, "wide.csv", LoadMode::Full).unwrap_err();
        assert_eq!(err.error_type(), "DATA_ERROR");
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn semicolon_latin1_file_loads_with_types() {
        let csv = b"city;temp;ok\nM\xfcnchen;12,5;true\nZ\xfcrich;9;false\n";
        let loaded = load(csv, "cities.csv", LoadMode::Full).expect("load");
        assert_eq!(loaded.source.delimiter.as_deref(), Some(";"));
        assert_eq!(loaded.source.encoding.as_deref(), Some("windows-1252"));
        let city = loaded.dataset.column("city").expect("city");
        assert_eq!(
            city.data.get(0).map(|v| v.as_display()),
            Some("München".to_string())
        );
        let ok = loaded.dataset.column("ok").expect("ok");
        assert_eq!(ok.data.dtype(), "bool");
    }

    #[test]
    fn short_rows_are_padded_with_nulls() {
        let loaded = load(b"a,b,c\n1,2\n", "short.csv", LoadMode::Full).expect("load");
        let c = loaded.dataset.column("c").expect("c");
        assert!(c.data.is_null(0));
    }

    #[test]
    fn duplicate_headers_are_renamed() {
        let loaded = load(b"x,x,\n1,2,3\n", "dup.csv", LoadMode::Full).expect("load");
        assert_eq!(loaded.dataset.column_names(), vec!["x", "x.1", "Unnamed: 2"]);
    }

    #[test]
    fn empty_file_is_a_load_error() {
        let err = load(b"", "empty.csv", LoadMode::Full).unwrap_err();
        assert_eq!(err.error_type(), "DATA_ERROR");
    }

    #[test]
    fn workbook_cells_render_for_inference() {
        assert_eq!(cell_to_string(&Data::Float(3.0)), "3");
        assert_eq!(cell_to_string(&Data::Float(2.5)), "2.5");
        assert_eq!(cell_to_string(&Data::Bool(true)), "true");
        assert_eq!(cell_to_string(&Data::Empty), "");
    }
}
