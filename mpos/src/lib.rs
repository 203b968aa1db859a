//! # mpos
//!
//! Driver for mPOS payment terminal peripherals.
//!
//! ## Features
//!
//! - Framed command/response protocol with CRC-16 trailers
//! - Async/await API using Tokio
//! - Unsolicited notifications delivered to subscribers
//! - Card-present payment flow over a pluggable gateway
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use mpos::{Device, Peripheral};
//!
//! #[tokio::main]
//! async fn main() -> mpos::Result<()> {
//!     // Connect through a BLE-to-TCP bridge
//!     let device = Device::new("192.168.1.50", 7000);
//!     device.connect().await?;
//!     device.subscribe(|notification| println!("{}", notification));
//!
//!     let terminal = Peripheral::new(Arc::new(device));
//!     terminal.open_session().await?;
//!
//!     let table_timestamp = terminal.get_timestamp().await?;
//!     let card = terminal.get_card(1250, &table_timestamp).await?;
//!     println!("{}", card);
//!
//!     terminal.close_session("Thank you").await?;
//!     terminal.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod device;
pub mod dispatcher;
pub mod error;
pub mod payment;
pub mod peripheral;

// Re-exports
pub use device::Device;
pub use dispatcher::Subscribers;
pub use error::{Error, Result};
pub use payment::{card_payment, CardPayment, PaymentGateway};
pub use peripheral::Peripheral;

// Re-export protocol and domain types
pub use mpos_core::{ChecksumPolicy, CommandCode, CommandFrame, ResponseCode, ResponseRecord};
pub use mpos_transport::{MemoryPeer, MemoryTransport, TcpTransport, Transport};
pub use mpos_types::{AuthorisationOutcome, AuthorisationRequest, CardData, GatewayResponse};

