//! Basic example: Scan for nearby BLE devices
//!
//! Run with: cargo run --example scan_devices [name-filter]

use futures::StreamExt;
use gatt_session::{BleCentral, Result, ScanFilter};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gatt_session=info".parse().unwrap()),
        )
        .init();

    let filter = std::env::args().nth(1).map(ScanFilter::name);

    println!("Scanning for BLE devices for 10 seconds...");
    if let Some(filter) = &filter {
        println!("Only showing names containing {:?}", filter.name_contains);
    }
    println!();

    let central = BleCentral::new().await?;
    let scan = central.scan_session();
    scan.start(filter)?;

    let mut devices = Box::pin(scan.devices());
    let mut count = 0;

    let deadline = tokio::time::sleep(Duration::from_secs(10));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            next = devices.next() => match next {
                Some(Ok(device)) => {
                    count += 1;
                    println!("{:>3}. {}", count, device);
                }
                Some(Err(e)) => {
                    eprintln!("Scan error: {}", e);
                    break;
                }
                None => break,
            },
            _ = &mut deadline => break,
        }
    }

    scan.stop();
    println!("\nFound {} device(s)", count);

    Ok(())
}
