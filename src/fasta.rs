//! Header-delimited sequence files.
//!
//! Input may wrap sequences over several lines; output always writes one header
//! line and one sequence line per record.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};

use camino::Utf8Path;
use serde::Serialize;

use crate::error::CurateError;

pub const HEADER_MARKER: char = '>';

/// One record. `header` is the full header line without the leading marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceRecord {
    pub header: String,
    pub sequence: String,
}

impl SequenceRecord {
    pub fn new(header: impl Into<String>, sequence: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            sequence: sequence.into(),
        }
    }

    /// First whitespace-delimited token of the header.
    pub fn id(&self) -> &str {
        self.header.split_whitespace().next().unwrap_or("")
    }

    pub fn renamed(self, header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            sequence: self.sequence,
        }
    }
}

/// Decides whether a header line belongs to a query id.
pub trait HeaderMatcher: Send + Sync {
    fn matches(&self, header_line: &str, query_id: &str) -> bool;
}

/// Substring match on the raw header line. Headers differ between the protein
/// and CDS files of one assembly, the protein id is embedded in both.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringMatcher;

impl HeaderMatcher for SubstringMatcher {
    fn matches(&self, header_line: &str, query_id: &str) -> bool {
        header_line.starts_with(HEADER_MARKER) && header_line.contains(query_id)
    }
}

/// Exact match on the first header token.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactIdMatcher;

impl HeaderMatcher for ExactIdMatcher {
    fn matches(&self, header_line: &str, query_id: &str) -> bool {
        header_line
            .strip_prefix(HEADER_MARKER)
            .and_then(|rest| rest.split_whitespace().next())
            .map(|token| token == query_id)
            .unwrap_or(false)
    }
}

fn open(path: &Utf8Path) -> Result<BufReader<File>, CurateError> {
    let file = File::open(path.as_std_path())
        .map_err(|err| CurateError::Filesystem(format!("open {path}: {err}")))?;
    Ok(BufReader::new(file))
}

fn read_err(path: &Utf8Path, err: std::io::Error) -> CurateError {
    CurateError::Filesystem(format!("read {path}: {err}"))
}

pub fn read_records(path: &Utf8Path) -> Result<Vec<SequenceRecord>, CurateError> {
    let mut records = Vec::new();
    let mut current: Option<SequenceRecord> = None;
    for line in open(path)?.lines() {
        let line = line.map_err(|err| read_err(path, err))?;
        if let Some(header) = line.strip_prefix(HEADER_MARKER) {
            records.extend(current.take());
            current = Some(SequenceRecord::new(header.trim(), String::new()));
        } else if let Some(record) = current.as_mut() {
            record.sequence.push_str(line.trim());
        }
    }
    records.extend(current);
    Ok(records)
}

/// Returns the first record whose header matches `query_id`. Reading stops at the
/// header following the match.
pub fn find_first(
    path: &Utf8Path,
    query_id: &str,
    matcher: &dyn HeaderMatcher,
) -> Result<Option<SequenceRecord>, CurateError> {
    let mut found: Option<SequenceRecord> = None;
    for line in open(path)?.lines() {
        let line = line.map_err(|err| read_err(path, err))?;
        match found.as_mut() {
            Some(_) if line.starts_with(HEADER_MARKER) => break,
            Some(record) => record.sequence.push_str(line.trim()),
            None if line.starts_with(HEADER_MARKER) && matcher.matches(&line, query_id) => {
                found = Some(SequenceRecord::new(line[1..].trim(), String::new()));
            }
            None => {}
        }
    }
    Ok(found)
}

/// Header of the first record in the file, if any.
pub fn first_header(path: &Utf8Path) -> Result<Option<String>, CurateError> {
    for line in open(path)?.lines() {
        let line = line.map_err(|err| read_err(path, err))?;
        if let Some(header) = line.strip_prefix(HEADER_MARKER) {
            return Ok(Some(header.trim().to_string()));
        }
    }
    Ok(None)
}

pub fn write_records<'a, W, I>(writer: W, records: I) -> Result<(), CurateError>
where
    W: Write,
    I: IntoIterator<Item = &'a SequenceRecord>,
{
    let mut writer = BufWriter::new(writer);
    for record in records {
        writeln!(writer, "{HEADER_MARKER}{}", record.header)
            .and_then(|_| writeln!(writer, "{}", record.sequence))
            .map_err(|err| CurateError::Filesystem(err.to_string()))?;
    }
    writer
        .flush()
        .map_err(|err| CurateError::Filesystem(err.to_string()))
}

pub fn to_bytes<'a, I>(records: I) -> Result<Vec<u8>, CurateError>
where
    I: IntoIterator<Item = &'a SequenceRecord>,
{
    let mut buffer = Vec::new();
    write_records(&mut buffer, records)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;

    fn fixture(content: &str) -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("seqs.faa")).unwrap();
        std::fs::write(path.as_std_path(), content).unwrap();
        (temp, path)
    }

    #[test]
    fn wrapped_sequences_are_joined() {
        let (_temp, path) = fixture(">a first\nMKV\nLLA\n>b\nMST\n");
        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sequence, "MKVLLA");
        assert_eq!(records[0].id(), "a");
        assert_eq!(records[1].header, "b");
    }

    #[test]
    fn find_first_stops_at_next_header() {
        let (_temp, path) = fixture(">x WP_1.1\nAAA\n>y WP_1.1 again\nCCC\n");
        let record = find_first(&path, "WP_1.1", &SubstringMatcher)
            .unwrap()
            .unwrap();
        assert_eq!(record.header, "x WP_1.1");
        assert_eq!(record.sequence, "AAA");
    }

    #[test]
    fn exact_matcher_ignores_embedded_ids() {
        let header = ">lcl|NC_1_cds_WP_1.1_1 [protein_id=WP_1.1]";
        assert!(SubstringMatcher.matches(header, "WP_1.1"));
        assert!(!ExactIdMatcher.matches(header, "WP_1.1"));
        assert!(ExactIdMatcher.matches(">WP_1.1 desc", "WP_1.1"));
    }

    #[test]
    fn output_is_single_line_per_sequence() {
        let records = vec![SequenceRecord::new("g1", "MKV")];
        let bytes = to_bytes(&records).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), ">g1\nMKV\n");
    }
}
