use std::io;

use thiserror::Error;

use super::Identity;

/// Why a `first,last` record was skipped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("line {line}: expected 'first,last', found {found} field(s)")]
    FieldCount { line: u64, found: usize },
    #[error("line {line}: first and last name must both be non-empty")]
    EmptyName { line: u64 },
}

/// Lazily reads identities from a `first,last` record stream (no header).
///
/// Malformed records are logged with their line number and skipped; the
/// iterator only yields well-formed identities.
pub fn read_identities<R: io::Read>(reader: R) -> IdentityReader<R> {
    let records = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
        .into_records();
    IdentityReader { records }
}

pub struct IdentityReader<R> {
    records: csv::StringRecordsIntoIter<R>,
}

impl<R: io::Read> Iterator for IdentityReader<R> {
    type Item = Identity;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.records.next()? {
                Ok(record) => record,
                Err(err) if err.is_io_error() => {
                    tracing::error!(error = %err, "reading name records failed");
                    return None;
                }
                Err(err) => {
                    tracing::error!(error = %err, "skipping unreadable name record");
                    continue;
                }
            };
            match parse_record(&record) {
                Ok(identity) => return Some(identity),
                Err(err) => tracing::error!("{err}"),
            }
        }
    }
}

fn parse_record(record: &csv::StringRecord) -> Result<Identity, IdentityError> {
    let line = record.position().map(|pos| pos.line()).unwrap_or_default();
    if record.len() != 2 {
        return Err(IdentityError::FieldCount {
            line,
            found: record.len(),
        });
    }
    let (first, last) = (&record[0], &record[1]);
    if first.is_empty() || last.is_empty() {
        return Err(IdentityError::EmptyName { line });
    }
    Ok(Identity::new(first, last))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_well_formed_records_in_order() {
        let input = "John,Doe\nJane,Smith\n";
        let names: Vec<(String, String)> = read_identities(input.as_bytes())
            .map(|id| (id.first, id.last))
            .collect();
        assert_eq!(
            names,
            vec![
                ("John".to_string(), "Doe".to_string()),
                ("Jane".to_string(), "Smith".to_string())
            ]
        );
    }

    #[test]
    fn skips_malformed_records() {
        let input = "John,Doe\nonlyone\na,b,c\n,Smith\nJ,Doe\n";
        let names: Vec<String> = read_identities(input.as_bytes())
            .map(|id| id.to_string())
            .collect();
        assert_eq!(names, vec!["John Doe", "J Doe"]);
    }

    #[test]
    fn trims_fields_and_generates_candidates() {
        let identity = read_identities(" John , Doe \r\n".as_bytes())
            .next()
            .expect("one identity");
        assert_eq!(identity.first, "John");
        assert_eq!(identity.local_parts[1], "jdoe");
    }

    #[test]
    fn field_count_error_reports_line() {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader("a,b\nc\n".as_bytes());
        let records: Vec<csv::StringRecord> =
            reader.records().collect::<Result<_, _>>().expect("records");
        assert!(parse_record(&records[0]).is_ok());
        assert_eq!(
            parse_record(&records[1]),
            Err(IdentityError::FieldCount { line: 2, found: 1 })
        );
    }
}
