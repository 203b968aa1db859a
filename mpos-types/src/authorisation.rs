//! Payment authorisation messages exchanged with a payment gateway

use std::fmt;

use crate::card::{mask_after, CardData};
use crate::error::{Error, Result};

/// Gateway code for an approved authorisation
pub const RESPONSE_APPROVED: &str = "APPR";

/// Gateway code for a declined authorisation
pub const RESPONSE_DECLINED: &str = "DECL";

/// Authorisation request built from a card read
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorisationRequest {
    pub pan: String,
    pub cvv: String,
    pub track2: String,
    /// Card expiry, `YYYY-MM`
    pub expiry_date: String,
    pub encrypted_pan: Option<String>,
    pub pan_ksn: Option<String>,
    pub cardholder_name: String,
    pub initiator_tx_id: String,
    /// Amount in minor currency units
    pub amount: u64,
}

impl AuthorisationRequest {
    /// Build a request from card data
    ///
    /// # Errors
    ///
    /// Fails if the card carries no PAN, its expiration date does not parse,
    /// or `amount` is zero.
    pub fn from_card(
        card: &CardData,
        cvv: impl Into<String>,
        amount: u64,
        initiator_tx_id: impl Into<String>,
    ) -> Result<Self> {
        if card.pan.is_empty() {
            return Err(Error::Validation("card has no PAN".into()));
        }

        if amount == 0 {
            return Err(Error::Validation("amount must be positive".into()));
        }

        let expiry = card.expiration_date()?;

        Ok(Self {
            pan: card.pan.clone(),
            cvv: cvv.into(),
            track2: card.track2.clone(),
            expiry_date: expiry.format("%Y-%m").to_string(),
            encrypted_pan: None,
            pan_ksn: None,
            cardholder_name: card.cardholder_name.clone(),
            initiator_tx_id: initiator_tx_id.into(),
            amount,
        })
    }

    /// Attach the encrypted PAN and its key serial number
    pub fn with_encrypted_pan(mut self, encrypted_pan: impl Into<String>, ksn: impl Into<String>) -> Self {
        self.encrypted_pan = Some(encrypted_pan.into());
        self.pan_ksn = Some(ksn.into());
        self
    }

    /// PAN with everything after the first six digits masked
    pub fn masked_pan(&self) -> String {
        mask_after(&self.pan, 6)
    }

    /// Track 2 with the PAN portion masked
    pub fn masked_track2(&self) -> String {
        match self.track2.strip_prefix(self.pan.as_str()) {
            Some(rest) => format!("{}{}", self.masked_pan(), rest),
            None => mask_after(&self.track2, 6),
        }
    }
}

impl fmt::Debug for AuthorisationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorisationRequest")
            .field("pan", &self.masked_pan())
            .field("expiry_date", &self.expiry_date)
            .field("initiator_tx_id", &self.initiator_tx_id)
            .field("amount", &self.amount)
            .finish_non_exhaustive()
    }
}

/// Gateway decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayResponse {
    Approved,
    Declined,
    Other(String),
}

impl GatewayResponse {
    /// Parse a gateway response code
    pub fn from_code(code: &str) -> Self {
        match code {
            RESPONSE_APPROVED => Self::Approved,
            RESPONSE_DECLINED => Self::Declined,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Gateway outcome with its reason text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorisationOutcome {
    pub response: GatewayResponse,
    pub reason: String,
}

impl AuthorisationOutcome {
    pub fn new(response: GatewayResponse, reason: impl Into<String>) -> Self {
        Self {
            response,
            reason: reason.into(),
        }
    }

    /// Check if the payment was approved
    pub fn is_approved(&self) -> bool {
        self.response == GatewayResponse::Approved
    }
}

impl fmt::Display for AuthorisationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.response {
            GatewayResponse::Approved => write!(f, "Approved"),
            GatewayResponse::Declined => write!(f, "Declined: {}", self.reason),
            GatewayResponse::Other(code) => write!(f, "{}: {}", code, self.reason),
        }
    }
}
