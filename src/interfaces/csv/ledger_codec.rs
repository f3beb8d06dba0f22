use crate::domain::transaction::LedgerRow;
use crate::error::{RelayError, Result};

/// Column headers of every status ledger, in file order.
pub const LEDGER_HEADERS: [&str; 6] = [
    "Date",
    "File Name",
    "Transaction ID",
    "Transaction Details",
    "Business Central Response",
    "Status",
];

/// Encodes rows as CSV with every field quoted. The header line is optional so
/// the same routine serves file creation and appends.
pub fn encode_rows(rows: &[LedgerRow], with_header: bool) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(Vec::new());

    if with_header {
        writer.write_record(LEDGER_HEADERS)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }

    writer
        .into_inner()
        .map_err(|e| RelayError::Io(e.into_error()))
}

/// Decodes a whole ledger file. The first line is always taken as the header.
pub fn decode_rows(contents: &[u8]) -> Result<Vec<LedgerRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(contents);

    reader
        .deserialize()
        .map(|result| result.map_err(RelayError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(details: &str) -> LedgerRow {
        LedgerRow {
            timestamp: "03/15/2024 02:05:09 PM".to_string(),
            file_name: "a.json".to_string(),
            transaction_id: "TRN-001".to_string(),
            details: details.to_string(),
            response: String::new(),
            status: "Processing".to_string(),
        }
    }

    #[test]
    fn test_every_field_is_quoted() {
        let bytes = encode_rows(&[row("{}")], true).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            r#""Date","File Name","Transaction ID","Transaction Details","Business Central Response","Status""#
        );
        assert_eq!(
            lines.next().unwrap(),
            r#""03/15/2024 02:05:09 PM","a.json","TRN-001","{}","","Processing""#
        );
    }

    #[test]
    fn test_embedded_delimiters_survive() {
        let details = r#"{"customername":"Cruz, Juan","note":"say ""hi"""}"#;
        let bytes = encode_rows(&[row(details)], true).unwrap();
        let decoded = decode_rows(&bytes).unwrap();
        assert_eq!(decoded, vec![row(details)]);
    }

    #[test]
    fn test_reads_partially_quoted_legacy_rows() {
        let legacy = "Date,File Name,Transaction ID,Transaction Details,Business Central Response,Status\n\
                      04/14/2023 01:02:03 PM,a.json,TRN-001,\"{\"\"a\"\":1}\",\"\",Processing\n";
        let decoded = decode_rows(legacy.as_bytes()).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].details, r#"{"a":1}"#);
        assert_eq!(decoded[0].status, "Processing");
    }

    #[test]
    fn test_header_only_file_has_no_rows() {
        let bytes = encode_rows(&[], true).unwrap();
        assert!(decode_rows(&bytes).unwrap().is_empty());
    }
}
