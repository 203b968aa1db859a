//! Card-present payment flow
//!
//! Drives a terminal through one checkout and hands the card to a
//! [`PaymentGateway`] for authorisation.

use async_trait::async_trait;
use tracing::{info, warn};

use mpos_types::{AuthorisationOutcome, AuthorisationRequest};

use crate::error::Result;
use crate::peripheral::Peripheral;

/// Message shown while the gateway is authorising
pub const PROCESSING_MESSAGE: &str = "Processing...";

/// Message shown once the flow is finished
pub const REMOVE_CARD_MESSAGE: &str = "Remove your card";

/// Authorises card transactions with an acquirer
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn authorise(&self, request: &AuthorisationRequest) -> Result<AuthorisationOutcome>;
}

/// One checkout to be paid by card
#[derive(Debug, Clone)]
pub struct CardPayment {
    /// Amount in minor currency units
    pub amount: u64,
    pub cvv: String,
    pub initiator_tx_id: String,
    /// Terminal-encrypted PAN and its key serial number
    pub encrypted_pan: Option<(String, String)>,
}

impl CardPayment {
    pub fn new(amount: u64, cvv: impl Into<String>, initiator_tx_id: impl Into<String>) -> Self {
        Self {
            amount,
            cvv: cvv.into(),
            initiator_tx_id: initiator_tx_id.into(),
            encrypted_pan: None,
        }
    }

    pub fn with_encrypted_pan(mut self, encrypted: impl Into<String>, ksn: impl Into<String>) -> Self {
        self.encrypted_pan = Some((encrypted.into(), ksn.into()));
        self
    }
}

/// Run one card payment on an open session
///
/// Reads the card, asks the gateway, and shows the outcome followed by the
/// remove-card prompt. Declines are returned as an outcome, not an error.
pub async fn card_payment<G>(
    terminal: &Peripheral,
    gateway: &G,
    payment: &CardPayment,
) -> Result<AuthorisationOutcome>
where
    G: PaymentGateway + ?Sized,
{
    let table_timestamp = terminal.get_timestamp().await?;
    let card = terminal.get_card(payment.amount, &table_timestamp).await?;

    info!(
        "Card {} presented for {} ({})",
        card.masked_pan(),
        payment.amount,
        payment.initiator_tx_id
    );

    let mut request = AuthorisationRequest::from_card(
        &card,
        &payment.cvv,
        payment.amount,
        &payment.initiator_tx_id,
    )?;
    if let Some((encrypted, ksn)) = &payment.encrypted_pan {
        request = request.with_encrypted_pan(encrypted.clone(), ksn.clone());
    }

    terminal.display(PROCESSING_MESSAGE).await?;

    let outcome = gateway.authorise(&request).await?;
    if outcome.is_approved() {
        info!("Transaction {} approved", payment.initiator_tx_id);
    } else {
        warn!("Transaction {} declined: {}", payment.initiator_tx_id, outcome.reason);
    }

    terminal.display(&outcome.to_string()).await?;
    terminal.display(REMOVE_CARD_MESSAGE).await?;

    Ok(outcome)
}
