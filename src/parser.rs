//! Record line parsing.
//!
//! Registry files hold one taxpayer per line in the form
//! `tax_id|name|check_digit[|prior_tax_id[|status]]`. Any further fields
//! (the published files end each line with a trailing `|`) are ignored.

use crate::error::ParseError;
use crate::models::{TaxpayerRecord, UNKNOWN_STATUS};

const MIN_FIELDS: usize = 3;

/// Parse one line into a [`TaxpayerRecord`] tagged with `source_id`.
///
/// Fields are taken verbatim; only the line terminator is expected to have
/// been removed by the caller. A present-but-empty fourth field yields
/// `Some("")`, not `None`.
pub fn parse_line(line: &str, source_id: &str) -> Result<TaxpayerRecord, ParseError> {
    let fields: Vec<&str> = line.split('|').collect();
    // "".split('|') yields one empty field
    let found = if line.is_empty() { 0 } else { fields.len() };
    if found < MIN_FIELDS {
        return Err(ParseError::Malformed { found });
    }

    Ok(TaxpayerRecord {
        tax_id: fields[0].to_string(),
        name: fields[1].to_string(),
        check_digit: fields[2].to_string(),
        prior_tax_id: fields.get(3).map(|s| s.to_string()),
        status: fields
            .get(4)
            .map(|s| s.to_string())
            .unwrap_or_else(|| UNKNOWN_STATUS.to_string()),
        source_id: source_id.to_string(),
    })
}

/// Strip a trailing `\n` / `\r\n` from a raw line.
pub fn trim_line_ending(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_fields() {
        let r = parse_line("222|Bob|3", "ruc2").unwrap();
        assert_eq!(r.tax_id, "222");
        assert_eq!(r.name, "Bob");
        assert_eq!(r.check_digit, "3");
        assert_eq!(r.prior_tax_id, None);
        assert_eq!(r.status, "UNKNOWN");
        assert_eq!(r.source_id, "ruc2");
    }

    #[test]
    fn test_four_fields() {
        let r = parse_line("222|Bob|3|999", "ruc2").unwrap();
        assert_eq!(r.prior_tax_id.as_deref(), Some("999"));
        assert_eq!(r.status, "UNKNOWN");
    }

    #[test]
    fn test_five_fields() {
        let r = parse_line("111|Alice|5|000|ACTIVE", "ruc1").unwrap();
        assert_eq!(r.prior_tax_id.as_deref(), Some("000"));
        assert_eq!(r.status, "ACTIVE");
    }

    #[test]
    fn test_trailing_delimiter_ignored() {
        let r = parse_line("80012345|ACME S.A.|7|ACME123|ACTIVO|", "ruc8").unwrap();
        assert_eq!(r.tax_id, "80012345");
        assert_eq!(r.status, "ACTIVO");
    }

    #[test]
    fn test_empty_fourth_field_is_present() {
        let r = parse_line("1|A|2||SUSPENDIDO", "ruc1").unwrap();
        assert_eq!(r.prior_tax_id.as_deref(), Some(""));
        assert_eq!(r.status, "SUSPENDIDO");
    }

    #[test]
    fn test_fields_are_verbatim() {
        let r = parse_line(" 42 | Name With Spaces |9", "ruc4").unwrap();
        assert_eq!(r.tax_id, " 42 ");
        assert_eq!(r.name, " Name With Spaces ");
    }

    #[test]
    fn test_too_few_fields() {
        assert_eq!(
            parse_line("123|OnlyName", "ruc1"),
            Err(ParseError::Malformed { found: 2 })
        );
        assert_eq!(
            parse_line("no delimiters", "ruc1"),
            Err(ParseError::Malformed { found: 1 })
        );
    }

    #[test]
    fn test_empty_line_is_malformed() {
        assert_eq!(parse_line("", "ruc1"), Err(ParseError::Malformed { found: 0 }));
    }

    #[test]
    fn test_trim_line_ending() {
        assert_eq!(trim_line_ending("1|a|b\r\n"), "1|a|b");
        assert_eq!(trim_line_ending("1|a|b\n"), "1|a|b");
        assert_eq!(trim_line_ending("1|a|b"), "1|a|b");
    }
}
