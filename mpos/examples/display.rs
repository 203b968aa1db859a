//! Show a message on a terminal reached through a BLE-to-TCP bridge

use std::sync::Arc;

use mpos::{Device, Peripheral};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mpos=debug".into()),
        )
        .init();

    // Change to your bridge address
    let ip = std::env::var("BRIDGE_IP").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("BRIDGE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(7000);

    println!("Connecting to {}:{}...", ip, port);

    let device = Device::new(ip, port);
    device.connect().await?;
    device.subscribe(|notification| println!("Notification: {}", notification));
    println!("✓ Connected!");

    let terminal = Peripheral::new(Arc::new(device));
    terminal.open_session().await?;

    println!("✓ Info: {}", terminal.get_info("00").await?);
    terminal.display("Hello from Rust").await?;
    tokio::time::sleep(std::time::Duration::from_secs(3)).await;

    terminal.close_session("Goodbye").await?;
    println!("✓ Session closed");

    terminal.disconnect().await?;
    println!("✓ Disconnected");

    Ok(())
}
