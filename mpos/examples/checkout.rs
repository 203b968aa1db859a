//! Run a card payment against a simulated terminal and gateway

use std::sync::Arc;

use async_trait::async_trait;
use mpos::{
    card_payment, AuthorisationOutcome, AuthorisationRequest, CardPayment, Device, GatewayResponse,
    MemoryPeer, MemoryTransport, PaymentGateway, Peripheral,
};
use mpos_core::{checksum, constants::control};

/// Approves anything under 100.00
struct LimitGateway;

#[async_trait]
impl PaymentGateway for LimitGateway {
    async fn authorise(&self, request: &AuthorisationRequest) -> mpos::Result<AuthorisationOutcome> {
        println!("Authorising {:?}", request);

        if request.amount < 10_000 {
            Ok(AuthorisationOutcome::new(GatewayResponse::Approved, ""))
        } else {
            Ok(AuthorisationOutcome::new(GatewayResponse::Declined, "limit exceeded"))
        }
    }
}

fn reply(command: &[u8], params: &[&[u8]]) -> Vec<u8> {
    let mut body = command.to_vec();
    body.extend_from_slice(b"000");
    for p in params {
        body.extend_from_slice(format!("{:03}", p.len()).as_bytes());
        body.extend_from_slice(p);
    }
    body.push(control::ETX);
    let crc = checksum::calculate(&body);

    let mut frame = vec![control::ACK, control::STX];
    frame.extend_from_slice(&body);
    frame.extend_from_slice(&crc.to_be_bytes());
    frame
}

fn card_record() -> String {
    [
        "05", "0", "01", "00", "03", "42",
        format!("{:<76}", "B5500000000000004^PUBLIC/JOHN^2812101").as_str(),
        "37",
        format!("{:<37}", "5500000000000004=28121010000000000").as_str(),
        "000",
        format!("{:<104}", "").as_str(),
        "16",
        format!("{:<19}", "5500000000000004").as_str(),
        "01",
        format!("{:<16}", "MASTERCARD").as_str(),
        "101",
        format!("{:<26}", "PUBLIC/JOHN").as_str(),
        "281231", "00",
        format!("{:<19}", "").as_str(),
        "00000000", "642",
    ]
    .concat()
}

/// Answer the driver the way a terminal would
async fn simulate(mut peer: MemoryPeer) {
    let card = card_record();

    while let Some(request) = peer.next_write().await {
        let body = &request[1..request.len() - 3];
        let raw = match &body[..3] {
            b"GTS" => reply(b"GTS", &[b"20240309"]),
            b"GCR" => {
                // Cardholder inserts the card
                peer.deliver(reply(b"NTM", &[b"CARD INSERTED"]));
                reply(b"GCR", &[card.as_bytes()])
            }
            b"DSP" => {
                println!("[terminal] {}", String::from_utf8_lossy(&body[6..]));
                reply(b"DSP", &[])
            }
            command => reply(command, &[]),
        };
        peer.deliver(raw);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mpos=debug".into()),
        )
        .init();

    let amount = std::env::args()
        .nth(1)
        .and_then(|a| a.parse().ok())
        .unwrap_or(1250);

    let (transport, peer) = MemoryTransport::pair();
    tokio::spawn(simulate(peer));

    let device = Device::with_transport(Box::new(transport));
    device.connect().await?;
    device.subscribe(|notification| println!("Notification: {}", notification));

    let terminal = Peripheral::new(Arc::new(device));
    terminal.open_session().await?;

    let payment = CardPayment::new(amount, "123", "checkout-1");
    let outcome = card_payment(&terminal, &LimitGateway, &payment).await?;
    println!("✓ {}", outcome);

    terminal.close_session("Thank you").await?;
    terminal.disconnect().await?;
    Ok(())
}
