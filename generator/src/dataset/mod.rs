//! CSV dataset loading with encoding detection.
//!
//! Turns a CSV file into an ordered list of [`Entry`] values, one per data
//! row. Columns are addressed either by the header names ([`ColumnMode::Name`])
//! or by their zero-based position ([`ColumnMode::Number`]).

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, DatasetResult};
use crate::output::expand_home;

// =============================================================================
// Column Mode
// =============================================================================

/// How `%VAR_…%` tokens address dataset columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnMode {
    /// First record is a header, columns are addressed by name.
    #[default]
    Name,
    /// No header, columns are addressed by index (`%VAR_0%`, `%VAR_1%`, …).
    Number,
}

impl FromStr for ColumnMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "name" => Ok(ColumnMode::Name),
            "number" => Ok(ColumnMode::Number),
            other => Err(format!("unknown column mode \"{}\" (expected name or number)", other)),
        }
    }
}

impl fmt::Display for ColumnMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnMode::Name => write!(f, "name"),
            ColumnMode::Number => write!(f, "number"),
        }
    }
}

// =============================================================================
// Entry
// =============================================================================

/// One dataset row as a `column -> value` mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entry(BTreeMap<String, String>);

impl Entry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pair a row with the column names.
    ///
    /// Missing trailing cells leave their columns out, surplus cells are
    /// dropped. A duplicated column name keeps the later cell.
    pub fn from_row(columns: &[String], row: &[String]) -> Self {
        let mut entry = Entry::new();
        for (column, value) in columns.iter().zip(row) {
            entry.insert(column.clone(), value.clone());
        }
        entry
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.0.get(column).map(String::as_str)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(column.into(), value.into())
    }

    pub fn get_mut(&mut self, column: &str) -> Option<&mut String> {
        self.0.get_mut(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Entry {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut entry = Entry::new();
        for (k, v) in iter {
            entry.insert(k, v);
        }
        entry
    }
}

// =============================================================================
// Dataset
// =============================================================================

/// Loaded dataset with metadata
#[derive(Debug, Clone, Serialize)]
pub struct Dataset {
    /// Column names, header order or `"0".."N-1"`
    pub columns: Vec<String>,
    /// One entry per data row, in file order
    pub entries: Vec<Entry>,
    /// Encoding the file was decoded with
    pub encoding: String,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Detect the encoding of raw bytes.
///
/// Valid UTF-8 is taken as is; anything else goes through chardet.
pub fn detect_encoding(bytes: &[u8]) -> String {
    if std::str::from_utf8(bytes).is_ok() {
        return "utf-8".to_string();
    }

    let charset = chardet::detect(bytes).0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        "" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes to a string using the given encoding, dropping any BOM.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let decoded = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => String::from_utf8_lossy(bytes).into_owned(),
        "iso-8859-1" | "latin-1" | "latin1" => {
            encoding_rs::ISO_8859_15.decode(bytes).0.into_owned()
        }
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        label => match encoding_rs::Encoding::for_label(label.as_bytes()) {
            Some(enc) => enc.decode(bytes).0.into_owned(),
            None => String::from_utf8_lossy(bytes).into_owned(),
        },
    };

    match decoded.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => decoded,
    }
}

/// Load a CSV file. A leading `~` in the path is expanded.
pub fn load_dataset<P: AsRef<Path>>(path: P, mode: ColumnMode) -> DatasetResult<Dataset> {
    let path = expand_home(path.as_ref());
    let bytes = std::fs::read(&path).map_err(|source| DatasetError::Unreadable {
        path: path.clone(),
        source,
    })?;
    parse_dataset_bytes(&bytes, mode, &path)
}

/// Parse CSV bytes, detecting their encoding. `origin` is only used in errors.
pub fn parse_dataset_bytes(bytes: &[u8], mode: ColumnMode, origin: &Path) -> DatasetResult<Dataset> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let mut dataset = parse_dataset_str(&content, mode, origin)?;
    dataset.encoding = encoding;
    Ok(dataset)
}

/// Parse CSV text.
///
/// # Example
/// ```ignore
/// use inkgen::dataset::{parse_dataset_str, ColumnMode};
///
/// let data = parse_dataset_str("name,paid\nAna,yes", ColumnMode::Name, "data.csv".as_ref())?;
/// assert_eq!(data.entries[0].get("name"), Some("Ana"));
/// ```
pub fn parse_dataset_str(content: &str, mode: ColumnMode, origin: &Path) -> DatasetResult<Dataset> {
    let parse_error = |source: csv::Error| DatasetError::Parse {
        path: origin.to_path_buf(),
        source,
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(parse_error)?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    let columns: Vec<String> = match mode {
        ColumnMode::Name => {
            if rows.is_empty() {
                return Err(DatasetError::Empty {
                    path: PathBuf::from(origin),
                });
            }
            rows.remove(0)
        }
        ColumnMode::Number => {
            let width = rows.first().map_or(0, Vec::len);
            (0..width).map(|i| i.to_string()).collect()
        }
    };

    let entries = rows.iter().map(|row| Entry::from_row(&columns, row)).collect();

    Ok(Dataset {
        columns,
        entries,
        encoding: "utf-8".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(csv: &str, mode: ColumnMode) -> Dataset {
        parse_dataset_str(csv, mode, Path::new("test.csv")).unwrap()
    }

    #[test]
    fn test_named_columns() {
        let data = parse("name,paid\nAna,yes\nBo,no", ColumnMode::Name);

        assert_eq!(data.columns, vec!["name", "paid"]);
        assert_eq!(data.len(), 2);
        assert_eq!(data.entries[0].get("name"), Some("Ana"));
        assert_eq!(data.entries[1].get("paid"), Some("no"));
    }

    #[test]
    fn test_positional_columns_keep_first_record() {
        let data = parse("name,paid\nAna,yes", ColumnMode::Number);

        assert_eq!(data.columns, vec!["0", "1"]);
        assert_eq!(data.len(), 2);
        assert_eq!(data.entries[0].get("0"), Some("name"));
        assert_eq!(data.entries[1].get("1"), Some("yes"));
    }

    #[test]
    fn test_positional_width_from_first_row() {
        let data = parse("a,b\nc,d,e", ColumnMode::Number);

        assert_eq!(data.entries[1].len(), 2);
        assert_eq!(data.entries[1].get("2"), None);
    }

    #[test]
    fn test_quoted_values_with_commas_and_markup() {
        let data = parse("name,motto\n\"Doe, Jane\",\"<b>&\"\"hi\"\"</b>\"", ColumnMode::Name);

        assert_eq!(data.entries[0].get("name"), Some("Doe, Jane"));
        assert_eq!(data.entries[0].get("motto"), Some("<b>&\"hi\"</b>"));
    }

    #[test]
    fn test_short_row_leaves_columns_absent() {
        let data = parse("a,b,c\n1,2", ColumnMode::Name);

        assert_eq!(data.entries[0].get("b"), Some("2"));
        assert!(!data.entries[0].contains("c"));
    }

    #[test]
    fn test_extra_cells_ignored() {
        let data = parse("a,b\n1,2,3,4", ColumnMode::Name);

        assert_eq!(data.entries[0].len(), 2);
    }

    #[test]
    fn test_duplicate_header_later_wins() {
        let data = parse("x,x\nfirst,second", ColumnMode::Name);

        assert_eq!(data.entries[0].len(), 1);
        assert_eq!(data.entries[0].get("x"), Some("second"));
    }

    #[test]
    fn test_empty_named_is_error() {
        let result = parse_dataset_str("", ColumnMode::Name, Path::new("empty.csv"));
        let err = result.unwrap_err();

        assert!(matches!(err, DatasetError::Empty { .. }));
        assert!(err.to_string().contains("empty.csv"));
    }

    #[test]
    fn test_empty_positional_is_empty_dataset() {
        let data = parse("", ColumnMode::Number);

        assert!(data.is_empty());
        assert!(data.columns.is_empty());
    }

    #[test]
    fn test_header_only() {
        let data = parse("name,paid\n", ColumnMode::Name);

        assert!(data.is_empty());
        assert_eq!(data.columns.len(), 2);
    }

    #[test]
    fn test_unreadable_file() {
        let err = load_dataset("/definitely/not/here.csv", ColumnMode::Name).unwrap_err();

        assert!(matches!(err, DatasetError::Unreadable { .. }));
        assert!(err.to_string().contains("not/here.csv"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "name,paid\r\nAna,yes\r\n").unwrap();

        let data = load_dataset(file.path(), ColumnMode::Name).unwrap();

        assert_eq!(data.encoding, "utf-8");
        assert_eq!(data.entries[0].get("paid"), Some("yes"));
    }

    #[test]
    fn test_bom_is_dropped() {
        let bytes = "\u{feff}name\nAna".as_bytes();
        let data = parse_dataset_bytes(bytes, ColumnMode::Name, Path::new("bom.csv")).unwrap();

        assert_eq!(data.columns, vec!["name"]);
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1");
        assert_eq!(decoded, "Société");
    }

    #[test]
    fn test_utf8_detected_without_chardet() {
        assert_eq!(detect_encoding("Société".as_bytes()), "utf-8");
    }

    #[test]
    fn test_column_mode_from_str() {
        assert_eq!("NAME".parse::<ColumnMode>().unwrap(), ColumnMode::Name);
        assert_eq!("number".parse::<ColumnMode>().unwrap(), ColumnMode::Number);
        assert!("index".parse::<ColumnMode>().is_err());
    }
}
