//! Card data returned by the card-read command

use std::fmt;
use std::ops::Range;

use chrono::NaiveDate;

use crate::error::{Error, Result};

/// How the card was read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardType {
    Magstripe,
    EmvContactless,
    ChipMagstripe,
    EmvWithoutContactless,
}

impl CardType {
    /// Parse the two-digit wire code
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "00" => Some(Self::Magstripe),
            "03" => Some(Self::EmvContactless),
            "05" => Some(Self::ChipMagstripe),
            "06" => Some(Self::EmvWithoutContactless),
            _ => None,
        }
    }

    /// Two-digit wire code
    pub fn code(self) -> &'static str {
        match self {
            Self::Magstripe => "00",
            Self::EmvContactless => "03",
            Self::ChipMagstripe => "05",
            Self::EmvWithoutContactless => "06",
        }
    }
}

/// Card application selected by the cardholder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationType {
    Credit,
    Debit,
}

impl ApplicationType {
    /// Parse the two-digit wire code
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "01" => Some(Self::Credit),
            "02" => Some(Self::Debit),
            _ => None,
        }
    }

    /// Two-digit wire code
    pub fn code(self) -> &'static str {
        match self {
            Self::Credit => "01",
            Self::Debit => "02",
        }
    }
}

/// Fixed-width card record
///
/// # Record Layout
///
/// ```text
/// offset  field                        trimmed
/// 0..2    card type
/// 2..3    read status
/// 3..5    application type
/// 5..7    acquirer code
/// 7..9    AID index
/// 9..11   track 1 length
/// 11..87  track 1                      yes
/// 87..89  track 2 length
/// 89..126 track 2                      yes
/// 126..129 track 3 length
/// 129..233 track 3                     yes
/// 233..235 PAN length
/// 235..254 PAN                         yes
/// 254..256 application PAN sequence number
/// 256..272 application label           yes
/// 272..275 service code
/// 275..301 cardholder name             yes
/// 301..307 application expiration date (YYMMDD)
/// 307..309 card external number length
/// 309..328 card external number        yes
/// 328..336 balance
/// 336..339 issuer country code
/// ```
///
/// Offsets are byte offsets into the raw record.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct CardData {
    pub card_type: String,
    pub read_status: String,
    pub application_type: String,
    pub acquirer_code: String,
    pub aid_index: String,
    pub track1_length: String,
    pub track1: String,
    pub track2_length: String,
    pub track2: String,
    pub track3_length: String,
    pub track3: String,
    pub pan_length: String,
    pub pan: String,
    pub app_pan_sequence_number: String,
    pub application_label: String,
    pub service_code: String,
    pub cardholder_name: String,
    pub application_expiration_date: String,
    pub card_external_number_length: String,
    pub card_external_number: String,
    pub balance: String,
    pub issuer_country_code: String,
}

impl CardData {
    /// Minimum record length
    pub const RECORD_LEN: usize = 339;

    /// Parse a raw card record
    ///
    /// Bytes past [`Self::RECORD_LEN`] are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecordTooShort`] for records under 339 bytes.
    pub fn parse(record: &[u8]) -> Result<Self> {
        if record.len() < Self::RECORD_LEN {
            return Err(Error::RecordTooShort {
                expected: Self::RECORD_LEN,
                actual: record.len(),
            });
        }

        let raw = |range: Range<usize>| String::from_utf8_lossy(&record[range]).into_owned();
        let trimmed = |range: Range<usize>| {
            String::from_utf8_lossy(&record[range])
                .trim_matches(' ')
                .to_string()
        };

        Ok(Self {
            card_type: raw(0..2),
            read_status: raw(2..3),
            application_type: raw(3..5),
            acquirer_code: raw(5..7),
            aid_index: raw(7..9),
            track1_length: raw(9..11),
            track1: trimmed(11..87),
            track2_length: raw(87..89),
            track2: trimmed(89..126),
            track3_length: raw(126..129),
            track3: trimmed(129..233),
            pan_length: raw(233..235),
            pan: trimmed(235..254),
            app_pan_sequence_number: raw(254..256),
            application_label: trimmed(256..272),
            service_code: raw(272..275),
            cardholder_name: trimmed(275..301),
            application_expiration_date: raw(301..307),
            card_external_number_length: raw(307..309),
            card_external_number: trimmed(309..328),
            balance: raw(328..336),
            issuer_country_code: raw(336..339),
        })
    }

    /// Decoded card type, if known
    pub fn card_type(&self) -> Option<CardType> {
        CardType::from_code(&self.card_type)
    }

    /// Decoded application type, if known
    pub fn application_type(&self) -> Option<ApplicationType> {
        ApplicationType::from_code(&self.application_type)
    }

    /// Application expiration date
    pub fn expiration_date(&self) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(&self.application_expiration_date, "%y%m%d").map_err(|e| {
            Error::Parse(format!(
                "expiration date {:?}: {}",
                self.application_expiration_date, e
            ))
        })
    }

    /// PAN with everything after the first six digits masked
    pub fn masked_pan(&self) -> String {
        mask_after(&self.pan, 6)
    }
}

/// Keep the first `keep` characters, replace the rest with `*`
pub(crate) fn mask_after(value: &str, keep: usize) -> String {
    value
        .chars()
        .enumerate()
        .map(|(i, c)| if i < keep { c } else { '*' })
        .collect()
}

impl fmt::Debug for CardData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardData")
            .field("card_type", &self.card_type)
            .field("read_status", &self.read_status)
            .field("application_type", &self.application_type)
            .field("pan", &self.masked_pan())
            .field("application_label", &self.application_label)
            .field("expiration", &self.application_expiration_date)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for CardData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Card[{}, PAN: {}, label: {}]",
            self.card_type().map(|t| format!("{:?}", t)).unwrap_or_else(|| self.card_type.clone()),
            self.masked_pan(),
            self.application_label
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_record;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_record() {
        let card = CardData::parse(sample_record().as_bytes()).unwrap();

        assert_eq!(card.card_type, "05");
        assert_eq!(card.read_status, "0");
        assert_eq!(card.application_type, "01");
        assert_eq!(card.acquirer_code, "00");
        assert_eq!(card.aid_index, "03");
        assert_eq!(card.track1_length, "42");
        assert_eq!(card.track1, "B4111111111111111^DOE/JANE^2512101");
        assert_eq!(card.track2_length, "37");
        assert_eq!(card.track2, "4111111111111111=25121010000000000");
        assert_eq!(card.track3_length, "000");
        assert_eq!(card.track3, "");
        assert_eq!(card.pan_length, "16");
        assert_eq!(card.pan, "4111111111111111");
        assert_eq!(card.app_pan_sequence_number, "01");
        assert_eq!(card.application_label, "VISA CREDIT");
        assert_eq!(card.service_code, "101");
        assert_eq!(card.cardholder_name, "DOE/JANE");
        assert_eq!(card.application_expiration_date, "251231");
        assert_eq!(card.card_external_number_length, "00");
        assert_eq!(card.card_external_number, "");
        assert_eq!(card.balance, "00001500");
        assert_eq!(card.issuer_country_code, "642");
    }

    #[test]
    fn test_parse_matches_offsets() {
        let record = sample_record();
        let card = CardData::parse(record.as_bytes()).unwrap();

        assert_eq!(card.service_code, &record[272..275]);
        assert_eq!(card.balance, &record[328..336]);
        assert_eq!(card.pan, record[235..254].trim_matches(' '));
    }

    #[test]
    fn test_parse_too_short() {
        let record = sample_record();
        let result = CardData::parse(&record.as_bytes()[..338]);

        assert!(matches!(
            result,
            Err(Error::RecordTooShort { expected: 339, actual: 338 })
        ));
    }

    #[test]
    fn test_decoded_types() {
        let card = CardData::parse(sample_record().as_bytes()).unwrap();

        assert_eq!(card.card_type(), Some(CardType::ChipMagstripe));
        assert_eq!(card.application_type(), Some(ApplicationType::Credit));
        assert_eq!(
            card.expiration_date().unwrap(),
            NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()
        );
    }

    #[test]
    fn test_masked_pan() {
        let card = CardData::parse(sample_record().as_bytes()).unwrap();

        assert_eq!(card.masked_pan(), "411111**********");
        assert!(!format!("{:?}", card).contains("4111111111111111"));
    }

    #[test]
    fn test_type_codes() {
        assert_eq!(CardType::from_code("03"), Some(CardType::EmvContactless));
        assert_eq!(CardType::from_code("99"), None);
        assert_eq!(ApplicationType::Debit.code(), "02");
    }
}
