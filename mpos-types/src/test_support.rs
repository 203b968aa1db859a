//! Card records for tests

use crate::card::CardData;

fn pad(value: &str, width: usize) -> String {
    format!("{:<width$}", value, width = width)
}

/// A chip+magstripe VISA credit card record
///
/// PAN `4111111111111111`, cardholder `DOE/JANE`, expiry `251231`,
/// balance `00001500`, issuer country `642`.
pub fn sample_record() -> String {
    let record = [
        "05",
        "0",
        "01",
        "00",
        "03",
        "42",
        pad("B4111111111111111^DOE/JANE^2512101", 76).as_str(),
        "37",
        pad("4111111111111111=25121010000000000", 37).as_str(),
        "000",
        pad("", 104).as_str(),
        "16",
        pad("4111111111111111", 19).as_str(),
        "01",
        pad("VISA CREDIT", 16).as_str(),
        "101",
        pad(" DOE/JANE", 26).as_str(),
        "251231",
        "00",
        pad("", 19).as_str(),
        "00001500",
        "642",
    ]
    .concat();

    debug_assert_eq!(record.len(), CardData::RECORD_LEN);
    record
}
