//! Typed terminal commands
//!
//! Each operation sends one command through [`Device::invoke`] and applies
//! the success convention: response code `"000"`, anything else is an
//! application-level failure.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{Local, NaiveDateTime};
use tracing::debug;

use mpos_core::{CommandCode, ResponseRecord};
use mpos_types::CardData;

use crate::device::Device;
use crate::error::{Error, Result};

/// Acquirer code sent with timestamp and card requests
pub const DEFAULT_ACQUIRER: &str = "00";

/// Application code sent with card requests
pub const DEFAULT_APPLICATION: &str = "01";

/// Key slot used for the DUKPT context request
pub const DUKPT_KEY_SLOT: &str = "323";

/// Largest amount a 12-digit field can carry
pub const MAX_AMOUNT: u64 = 999_999_999_999;

/// Terminal command facade
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use mpos::{Device, Peripheral};
///
/// #[tokio::main]
/// async fn main() -> mpos::Result<()> {
///     let device = Device::new("192.168.1.50", 7000);
///     device.connect().await?;
///
///     let terminal = Peripheral::new(Arc::new(device));
///     terminal.open_session().await?;
///     terminal.display("Hello").await?;
///     terminal.close_session("Bye").await?;
///     terminal.disconnect().await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Peripheral {
    device: Arc<Device>,
}

impl Peripheral {
    pub fn new(device: Arc<Device>) -> Self {
        Self { device }
    }

    /// Underlying session
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Disconnect the underlying session
    pub async fn disconnect(&self) -> Result<()> {
        self.device.disconnect().await
    }

    /// Open a session on the terminal
    pub async fn open_session(&self) -> Result<()> {
        self.call(CommandCode::OPEN, Vec::new()).await.map(drop)
    }

    /// Close the session, leaving `message` on the display
    pub async fn close_session(&self, message: &str) -> Result<()> {
        self.call(CommandCode::CLOSE, vec![text(message)]).await.map(drop)
    }

    /// Show a message on the terminal display
    pub async fn display(&self, message: &str) -> Result<()> {
        self.call(CommandCode::DISPLAY, vec![text(message)]).await.map(drop)
    }

    /// Read the terminal's table timestamp
    pub async fn get_timestamp(&self) -> Result<String> {
        let record = self
            .call(CommandCode::GET_TIMESTAMP, vec![text(DEFAULT_ACQUIRER)])
            .await?;
        first_parameter(&record)
    }

    /// Read terminal information for an acquirer
    pub async fn get_info(&self, acquirer_code: &str) -> Result<String> {
        let record = self
            .call(CommandCode::GET_INFO, vec![text(acquirer_code)])
            .await?;
        first_parameter(&record)
    }

    /// Read the DUKPT encryption context
    pub async fn get_encryption_context(&self) -> Result<String> {
        let record = self
            .call(CommandCode::GET_DUKPT, vec![text(DUKPT_KEY_SLOT)])
            .await?;
        first_parameter(&record)
    }

    /// Encrypt a buffer with the terminal's keys
    pub async fn encrypt_buffer(&self, buffer: &str) -> Result<String> {
        let record = self
            .call(CommandCode::ENCRYPT_BUFFER, vec![text(buffer)])
            .await?;
        first_parameter(&record)
    }

    /// Ask the cardholder for a card and read it
    ///
    /// `amount` is in minor currency units; `table_timestamp` comes from
    /// [`Peripheral::get_timestamp`].
    pub async fn get_card(&self, amount: u64, table_timestamp: &str) -> Result<CardData> {
        self.get_card_at(amount, table_timestamp, Local::now().naive_local())
            .await
    }

    /// [`Peripheral::get_card`] with an explicit transaction time
    pub async fn get_card_at(
        &self,
        amount: u64,
        table_timestamp: &str,
        at: NaiveDateTime,
    ) -> Result<CardData> {
        let request = card_request(amount, table_timestamp, at)?;
        let record = self
            .call(CommandCode::GET_CARD, vec![Bytes::from(request)])
            .await?;

        let raw = record
            .parameters
            .first()
            .ok_or_else(|| Error::InvalidResponse("card reply has no record".into()))?;

        let card = CardData::parse(raw)?;
        debug!("Card read: {}", card);
        Ok(card)
    }

    async fn call(&self, command: CommandCode, parameters: Vec<Bytes>) -> Result<ResponseRecord> {
        let record = self.device.invoke(command, parameters).await?;

        match record.response_code {
            Some(code) if code.is_success() => Ok(record),
            Some(code) => Err(Error::Application { command, code }),
            None => Err(Error::InvalidResponse(format!("{} reply has no response code", command))),
        }
    }
}

/// Build the single card-request parameter
fn card_request(amount: u64, table_timestamp: &str, at: NaiveDateTime) -> Result<String> {
    if amount > MAX_AMOUNT {
        return Err(mpos_types::Error::Validation(format!(
            "amount {} does not fit 12 digits",
            amount
        ))
        .into());
    }

    Ok(format!(
        "{}{}{:012}{}{}{}00",
        DEFAULT_ACQUIRER,
        DEFAULT_APPLICATION,
        amount,
        at.format("%y%m%d"),
        at.format("%H%M%S"),
        table_timestamp,
    ))
}

fn text(value: &str) -> Bytes {
    Bytes::copy_from_slice(value.as_bytes())
}

fn first_parameter(record: &ResponseRecord) -> Result<String> {
    record
        .parameter_str(0)
        .ok_or_else(|| Error::InvalidResponse(format!("{} reply has no parameters", record)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::NaiveDate;
    use mpos_transport::{MemoryPeer, MemoryTransport};
    use pretty_assertions::assert_eq;

    use crate::device::tests::reply;

    async fn terminal() -> (Peripheral, MemoryPeer) {
        let (transport, peer) = MemoryTransport::pair();
        let device = Device::with_transport(Box::new(transport)).with_timeout(Duration::from_secs(5));
        device.connect().await.unwrap();
        (Peripheral::new(Arc::new(device)), peer)
    }

    /// Answer each expected request in turn, returning what was written
    fn respond(mut peer: MemoryPeer, replies: Vec<Vec<u8>>) -> tokio::task::JoinHandle<Vec<Bytes>> {
        tokio::spawn(async move {
            let mut requests = Vec::new();
            for raw in replies {
                requests.push(peer.next_write().await.unwrap());
                peer.deliver(raw);
            }
            requests
        })
    }

    fn body(request: &Bytes) -> &[u8] {
        &request[1..request.len() - 3]
    }

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 30)
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_display_close() {
        let (terminal, peer) = terminal().await;
        let peer = respond(
            peer,
            vec![
                reply(b"OPN", b"000", &[]),
                reply(b"DSP", b"000", &[]),
                reply(b"CLO", b"000", &[]),
            ],
        );

        terminal.open_session().await.unwrap();
        terminal.display("Approved").await.unwrap();
        terminal.close_session("SumUp").await.unwrap();

        let requests = peer.await.unwrap();
        assert_eq!(body(&requests[0]), b"OPN");
        assert_eq!(body(&requests[1]), b"DSP008Approved");
        assert_eq!(body(&requests[2]), b"CLO005SumUp");
    }

    #[tokio::test]
    async fn test_disconnect_through_facade() {
        let (terminal, peer) = terminal().await;
        let _peer = respond(peer, vec![reply(b"CLO", b"000", &[])]);

        terminal.close_session("Bye").await.unwrap();
        terminal.disconnect().await.unwrap();

        assert!(!terminal.device().is_connected());
        assert!(matches!(
            terminal.open_session().await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_application_error() {
        let (terminal, peer) = terminal().await;
        let _peer = respond(peer, vec![reply(b"DSP", b"012", &[])]);

        let result = terminal.display("Hello").await;

        match result {
            Err(Error::Application { command, code }) => {
                assert_eq!(command, CommandCode::DISPLAY);
                assert_eq!(code.as_str(), "012");
            }
            other => panic!("Expected application error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_timestamp() {
        let (terminal, peer) = terminal().await;
        let peer = respond(peer, vec![reply(b"GTS", b"000", &[b"20240309"])]);

        assert_eq!(terminal.get_timestamp().await.unwrap(), "20240309");
        assert_eq!(body(&peer.await.unwrap()[0]), b"GTS00200");
    }

    #[tokio::test]
    async fn test_get_timestamp_requires_success() {
        let (terminal, peer) = terminal().await;
        let _peer = respond(peer, vec![reply(b"GTS", b"001", &[b"20240309"])]);

        assert!(matches!(
            terminal.get_timestamp().await,
            Err(Error::Application { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_parameter() {
        let (terminal, peer) = terminal().await;
        let _peer = respond(peer, vec![reply(b"GIN", b"000", &[])]);

        assert!(matches!(
            terminal.get_info("00").await,
            Err(Error::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_encryption_commands() {
        let (terminal, peer) = terminal().await;
        let peer = respond(
            peer,
            vec![
                reply(b"GDU", b"000", &[b"FFFFED1AD0000060000B"]),
                reply(b"ENB", b"000", &[b"69c74ee0ff66a7fc"]),
                reply(b"GIN", b"000", &[b"PAX D180"]),
            ],
        );

        assert_eq!(terminal.get_encryption_context().await.unwrap(), "FFFFED1AD0000060000B");
        assert_eq!(terminal.encrypt_buffer("4111").await.unwrap(), "69c74ee0ff66a7fc");
        assert_eq!(terminal.get_info("00").await.unwrap(), "PAX D180");

        let requests = peer.await.unwrap();
        assert_eq!(body(&requests[0]), b"GDU003323");
        assert_eq!(body(&requests[1]), b"ENB0044111");
        assert_eq!(body(&requests[2]), b"GIN00200");
    }

    #[tokio::test]
    async fn test_get_card() {
        let record = mpos_types::test_support::sample_record();
        let (terminal, peer) = terminal().await;
        let peer = respond(peer, vec![reply(b"GCR", b"000", &[record.as_bytes()])]);

        let card = terminal.get_card_at(1250, "20240309", at()).await.unwrap();

        assert_eq!(card.pan, "4111111111111111");
        assert_eq!(card.cardholder_name, "DOE/JANE");

        let requests = peer.await.unwrap();
        assert_eq!(
            std::str::from_utf8(body(&requests[0])).unwrap(),
            "GCR03800010000000012502403091405302024030900"
        );
    }

    #[test]
    fn test_card_request_layout() {
        let request = card_request(1250, "TS", at()).unwrap();
        assert_eq!(request, "0001000000001250240309140530TS00");
    }

    #[test]
    fn test_card_request_amount_limit() {
        assert!(card_request(MAX_AMOUNT, "TS", at()).is_ok());
        assert!(matches!(
            card_request(MAX_AMOUNT + 1, "TS", at()),
            Err(Error::Types(mpos_types::Error::Validation(_)))
        ));
    }
}
