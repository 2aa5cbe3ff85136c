//! CSV export of flattened rows.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use encoding_rs::{Encoding, UTF_8};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::flatten::{Cell, FlatRow};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Text encoding of the written file, resolved from an encoding label
/// (`utf-8-sig`, `utf-8`, `big5`, `cp950`, `shift_jis`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputEncoding {
    encoding: &'static Encoding,
    /// Prefix a UTF-8 byte order mark, which spreadsheet tools use to
    /// detect the encoding.
    bom: bool,
}

impl OutputEncoding {
    pub fn utf8() -> Self {
        Self { encoding: UTF_8, bom: false }
    }

    pub fn utf8_sig() -> Self {
        Self { encoding: UTF_8, bom: true }
    }

    pub fn name(&self) -> &'static str {
        if self.bom {
            "utf-8-sig"
        } else {
            self.encoding.name()
        }
    }

    /// Transcode UTF-8 CSV text. Characters the target encoding cannot
    /// represent are an error rather than being replaced.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>> {
        if self.encoding == UTF_8 {
            let mut out = Vec::with_capacity(text.len() + UTF8_BOM.len());
            if self.bom {
                out.extend_from_slice(UTF8_BOM);
            }
            out.extend_from_slice(text.as_bytes());
            return Ok(out);
        }
        let (bytes, _, had_errors) = self.encoding.encode(text);
        if had_errors {
            return Err(Error::Unencodable { encoding: self.name() });
        }
        Ok(bytes.into_owned())
    }
}

impl Default for OutputEncoding {
    fn default() -> Self {
        Self::utf8_sig()
    }
}

impl FromStr for OutputEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let label = s.trim().to_ascii_lowercase();
        let dashed = label.replace('_', "-");
        if matches!(dashed.as_str(), "utf-8-sig" | "utf8-sig") {
            return Ok(Self::utf8_sig());
        }
        // Windows code page names that have no WHATWG label of their own.
        let alias = match dashed.as_str() {
            "cp950" | "ms950" => "big5",
            "cp936" | "ms936" => "gbk",
            "cp932" | "ms932" => "shift_jis",
            "cp949" | "ms949" => "euc-kr",
            _ => label.as_str(),
        };
        let encoding = Encoding::for_label(alias.as_bytes())
            .or_else(|| Encoding::for_label(dashed.as_bytes()))
            .ok_or_else(|| Error::Config(format!("unknown output encoding {s:?}")))?;
        // UTF-16 and the replacement encoding decode only.
        if encoding.output_encoding() != encoding {
            return Err(Error::Config(format!("cannot write CSV as {s:?}")));
        }
        Ok(Self { encoding, bom: false })
    }
}

/// Rows with their column union materialized.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    /// One entry per row, aligned with `columns`.
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Columns are the union over all rows in first-encountered order.
    /// Cells a row does not have are left empty.
    pub fn from_rows(rows: &[FlatRow]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut keyed: Vec<Vec<(usize, Cell)>> = Vec::with_capacity(rows.len());

        for row in rows {
            let mut cells = Vec::new();
            for (name, cell) in row.cells() {
                let pos = match index.get(&name) {
                    Some(pos) => *pos,
                    None => {
                        columns.push(name.clone());
                        index.insert(name, columns.len() - 1);
                        columns.len() - 1
                    }
                };
                cells.push((pos, cell));
            }
            keyed.push(cells);
        }

        let rows = keyed
            .into_iter()
            .map(|cells| {
                let mut out = vec![Cell::Empty; columns.len()];
                for (pos, cell) in cells {
                    out[pos] = cell;
                }
                out
            })
            .collect();

        Self { columns, rows }
    }

    /// Encode as CSV bytes, header line first.
    pub fn to_csv(&self, encoding: OutputEncoding) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(|c| c.to_string()))?;
        }
        let utf8 = writer
            .into_inner()
            .map_err(|e| Error::Csv(csv::Error::from(e.into_error())))?;
        let text = String::from_utf8(utf8)
            .map_err(|_| Error::Unencodable { encoding: UTF_8.name() })?;
        encoding.encode(&text)
    }
}

/// What [`export_csv`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportOutcome {
    Written { rows: usize, columns: usize },
    /// There were no rows, so no file was written.
    NoResults,
}

/// Write `rows` to `path`, replacing any existing file. Nothing is written
/// when `rows` is empty.
pub fn export_csv(rows: &[FlatRow], path: &Path, encoding: OutputEncoding) -> Result<ExportOutcome> {
    if rows.is_empty() {
        warn!(path = %path.display(), "no evaluation results, skipping CSV export");
        return Ok(ExportOutcome::NoResults);
    }

    let table = Table::from_rows(rows);
    let bytes = table.to_csv(encoding)?;
    std::fs::write(path, bytes).map_err(|source| Error::Write {
        path: path.to_path_buf(),
        source,
    })?;
    info!(
        path = %path.display(),
        encoding = encoding.name(),
        rows = table.rows.len(),
        columns = table.columns.len(),
        "wrote CSV"
    );

    Ok(ExportOutcome::Written {
        rows: table.rows.len(),
        columns: table.columns.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::MetricCells;
    use crate::types::EvalStatus;

    fn row(eval_id: &str, metrics: &[(&str, f64)]) -> FlatRow {
        FlatRow {
            eval_id: eval_id.into(),
            prompt: "p".into(),
            expected_response: "e".into(),
            actual_response: "a".into(),
            expected_tool_calls: String::new(),
            actual_tool_calls: String::new(),
            metrics: metrics
                .iter()
                .map(|(name, score)| MetricCells {
                    name: name.to_string(),
                    score: Some(*score),
                    status: Some(EvalStatus::from_score(Some(*score), 0.5)),
                    threshold: 0.5,
                })
                .collect(),
        }
    }

    #[test]
    fn test_column_union_leaves_missing_cells_empty() {
        let table = Table::from_rows(&[row("one", &[("alpha", 1.0)]), row("two", &[("beta", 0.25)])]);
        assert_eq!(
            table.columns[6..],
            [
                "alpha_score",
                "alpha_status",
                "alpha_threshold",
                "beta_score",
                "beta_status",
                "beta_threshold",
            ]
        );
        assert_eq!(table.rows[0][9..], [Cell::Empty, Cell::Empty, Cell::Empty]);
        assert_eq!(table.rows[1][6..9], [Cell::Empty, Cell::Empty, Cell::Empty]);
        assert_eq!(table.rows[1][9], Cell::Number(0.25));
        assert_eq!(table.rows[1][10], Cell::Text("FAILED".into()));
    }

    #[test]
    fn test_csv_quoting_and_bom() {
        let mut r = row("case,1", &[("m", 1.0)]);
        r.actual_response = "line one\nsaid \"hi\"".into();
        let table = Table::from_rows(&[r]);

        let plain = String::from_utf8(table.to_csv(OutputEncoding::utf8()).unwrap()).unwrap();
        let mut lines = plain.lines();
        assert_eq!(
            lines.next(),
            Some("eval_id,prompt,expected_response,actual_response,expected_tool_calls,actual_tool_calls,m_score,m_status,m_threshold")
        );
        assert!(plain.contains("\"case,1\",p,e,\"line one\nsaid \"\"hi\"\"\",,,1.0,PASSED,0.5"));

        let sig = table.to_csv(OutputEncoding::utf8_sig()).unwrap();
        assert!(sig.starts_with(UTF8_BOM));
        assert_eq!(&sig[3..], plain.as_bytes());
    }

    #[test]
    fn test_encoding_names() {
        assert_eq!("utf-8".parse::<OutputEncoding>().unwrap(), OutputEncoding::utf8());
        assert_eq!("UTF8".parse::<OutputEncoding>().unwrap(), OutputEncoding::utf8());
        assert_eq!("utf_8_sig".parse::<OutputEncoding>().unwrap(), OutputEncoding::utf8_sig());
        assert_eq!("cp950".parse::<OutputEncoding>().unwrap().name(), "Big5");
        assert_eq!("Shift_JIS".parse::<OutputEncoding>().unwrap().name(), "Shift_JIS");
        for bad in ["klingon", "utf-16le"] {
            let err = bad.parse::<OutputEncoding>().unwrap_err();
            assert!(err.is_load_error(), "{bad}");
        }
    }

    #[test]
    fn test_big5_export_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big5.csv");
        let mut r = row("taipei_weather", &[("response_match_score", 1.0)]);
        r.prompt = "請問台北今天的天氣如何？".into();
        r.actual_response = "台北 的天氣是：陰天。".into();

        let encoding: OutputEncoding = "big5".parse().unwrap();
        export_csv(&[r], &path, encoding).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(std::str::from_utf8(&bytes).is_err());

        let (text, had_errors) = encoding_rs::BIG5.decode_without_bom_handling(&bytes);
        assert!(!had_errors);
        assert!(text.contains("taipei_weather,請問台北今天的天氣如何？,e,台北 的天氣是：陰天。,,,1.0,PASSED,0.5"));
    }

    #[test]
    fn test_unencodable_text_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big5.csv");
        let mut r = row("snow", &[]);
        r.actual_response = "It is snowing 😀".into();

        let err = export_csv(&[r], &path, "big5".parse().unwrap()).unwrap_err();
        assert!(matches!(err, Error::Unencodable { encoding: "Big5" }));
        assert!(!path.exists());
    }

    #[test]
    fn test_export_writes_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "stale").unwrap();

        let outcome = export_csv(&[row("a", &[]), row("b", &[])], &path, OutputEncoding::utf8()).unwrap();
        assert_eq!(outcome, ExportOutcome::Written { rows: 2, columns: 6 });
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.lines().count(), 3);
        assert!(!written.contains("stale"));
    }

    #[test]
    fn test_export_skips_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let outcome = export_csv(&[], &path, OutputEncoding::utf8_sig()).unwrap();
        assert_eq!(outcome, ExportOutcome::NoResults);
        assert!(!path.exists());
    }
}
