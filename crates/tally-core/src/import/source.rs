//! Raw cell grids read from delimited text or spreadsheet containers

use std::collections::HashMap;
use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};
use chrono::NaiveDate;
use csv::ReaderBuilder;

use crate::error::{Error, Result};

/// ZIP local file header; every XLSX workbook starts with it
const XLSX_MAGIC: &[u8] = b"PK\x03\x04";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// One raw record: ordered cell values
pub type RawRow = Vec<String>;

/// Container kinds for DSV-style input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DsvKind {
    Csv,
    Tsv,
    Xlsx,
}

pub fn is_xlsx(data: &[u8]) -> bool {
    data.starts_with(XLSX_MAGIC)
}

/// Read delimited text into a grid of cells
///
/// Records may have differing lengths. A leading UTF-8 BOM is ignored.
pub fn read_delimited(data: &[u8], delimiter: u8) -> Result<Vec<RawRow>> {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);

    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(data);

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(rows)
}

/// Read the first worksheet of an XLSX workbook into a grid of cells
pub fn read_xlsx(data: &[u8]) -> Result<Vec<RawRow>> {
    if !is_xlsx(data) {
        return Err(Error::UnsupportedFormat(
            "file is not an XLSX workbook".to_string(),
        ));
    }

    let mut workbook: Xlsx<_> = calamine::open_workbook_from_rs(Cursor::new(data))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| Error::NoData("workbook has no worksheets".to_string()))??;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect())
}

/// Render a spreadsheet cell the way it would appear in a CSV export
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => format!("{}", f),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64()),
        Data::DateTimeIso(s) => s.split('T').next().unwrap_or(s).to_string(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(_) | Data::Empty => String::new(),
    }
}

/// Convert an Excel serial date to `DD.MM.YYYY`
///
/// Serials outside chrono's date range come back empty, like a blank cell.
pub fn excel_serial_to_date(serial: f64) -> String {
    // Excel epoch is 1899-12-30 (accounting for the 1900 leap year bug)
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .zip(chrono::Duration::try_days(serial as i64))
        .and_then(|(base, offset)| base.checked_add_signed(offset))
        .map(|date| date.format("%d.%m.%Y").to_string())
        .unwrap_or_default()
}

/// Raw lines of a DSV file, for building a column mapping on the client
pub fn parse_dsv_lines(data: &[u8], kind: DsvKind) -> Result<Vec<RawRow>> {
    if data.is_empty() {
        return Err(Error::NoData("uploaded file is empty".to_string()));
    }

    let rows = match kind {
        DsvKind::Csv => read_delimited(data, b',')?,
        DsvKind::Tsv => read_delimited(data, b'\t')?,
        DsvKind::Xlsx => read_xlsx(data)?,
    };

    if rows.is_empty() {
        return Err(Error::NoData("file has no lines".to_string()));
    }

    Ok(rows)
}

/// Header name to column position lookup
#[derive(Debug, Clone, Default)]
pub struct HeaderIndex {
    positions: HashMap<String, usize>,
}

impl HeaderIndex {
    pub fn new(header: &[String]) -> Self {
        let mut positions = HashMap::new();
        for (i, name) in header.iter().enumerate() {
            let name = name.trim().trim_start_matches('\u{feff}').to_string();
            positions.entry(name).or_insert(i);
        }
        Self { positions }
    }

    /// Fail with the first of `names` absent from the header
    pub fn require(&self, names: &[&str]) -> Result<()> {
        match names.iter().find(|n| !self.positions.contains_key(**n)) {
            Some(missing) => Err(Error::MissingHeaderColumn(missing.to_string())),
            None => Ok(()),
        }
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// Trimmed cell value for a header name; empty when absent
    pub fn cell<'a>(&self, row: &'a [String], name: &str) -> &'a str {
        self.position(name)
            .and_then(|i| row.get(i))
            .map(|s| s.trim())
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_delimited_flexible_rows() {
        let data = "\u{feff}a,b,c\n1,2\n\"x, y\",z,w,extra\n";
        let rows = read_delimited(data.as_bytes(), b',').unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], "a");
        assert_eq!(rows[1].len(), 2);
        assert_eq!(rows[2][0], "x, y");
        assert_eq!(rows[2].len(), 4);
    }

    #[test]
    fn test_read_tsv() {
        let rows = read_delimited(b"time\tamount\n2026-02-09\t12.5\n", b'\t').unwrap();
        assert_eq!(rows[1], vec!["2026-02-09".to_string(), "12.5".to_string()]);
    }

    #[test]
    fn test_xlsx_detection() {
        assert!(is_xlsx(b"PK\x03\x04rest-of-zip"));
        assert!(!is_xlsx(b"date,amount\n"));
    }

    #[test]
    fn test_read_xlsx_rejects_plain_text() {
        let result = read_xlsx(b"date,amount\n");
        assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn test_read_xlsx_rejects_corrupt_zip() {
        let result = read_xlsx(b"PK\x03\x04not really a zip archive");
        assert!(matches!(result, Err(Error::Spreadsheet(_))));
    }

    #[test]
    fn test_excel_serial_to_date() {
        assert_eq!(excel_serial_to_date(46062.0), "09.02.2026");
        assert_eq!(excel_serial_to_date(1.0), "31.12.1899");
    }

    #[test]
    fn test_excel_serial_out_of_range_is_blank() {
        assert_eq!(excel_serial_to_date(1.0e9), "");
        assert_eq!(excel_serial_to_date(-1.0e9), "");
        assert_eq!(excel_serial_to_date(f64::MAX), "");
    }

    #[test]
    fn test_parse_dsv_lines_empty() {
        assert!(matches!(
            parse_dsv_lines(b"", DsvKind::Csv),
            Err(Error::NoData(_))
        ));
    }

    #[test]
    fn test_header_index() {
        let header: Vec<String> = vec!["Дата".into(), " Сумма ".into(), "Счет".into()];
        let idx = HeaderIndex::new(&header);
        assert!(idx.require(&["Дата", "Сумма"]).is_ok());

        let err = idx.require(&["Дата", "Статья"]).unwrap_err();
        assert!(matches!(err, Error::MissingHeaderColumn(ref c) if c == "Статья"));

        let row: Vec<String> = vec!["09.02.2026".into(), " -100 ".into()];
        assert_eq!(idx.cell(&row, "Сумма"), "-100");
        assert_eq!(idx.cell(&row, "Счет"), "");
    }
}
