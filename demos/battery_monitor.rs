//! Example: Connect to a device and print battery / heart rate updates
//!
//! Run with: cargo run --example battery_monitor [name-filter]
//!
//! Connects to the first device advertising the Battery or Heart Rate
//! service (or matching the given name), subscribes to whichever of the two
//! characteristics it exposes and prints every update until Ctrl+C.

use futures::StreamExt;
use gatt_session::{
    BleCentral, DecodedValue, Error, LinkConfig, LinkUpdate, Result, ScanFilter,
    BATTERY_LEVEL_UUID, BATTERY_SERVICE_UUID, HEART_RATE_MEASUREMENT_UUID,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gatt_session=debug".parse().unwrap()),
        )
        .init();

    let filter = match std::env::args().nth(1) {
        Some(name) => ScanFilter::name(name),
        None => ScanFilter::service(BATTERY_SERVICE_UUID),
    };

    let central = BleCentral::new().await?;

    println!("Scanning...");
    let scan = central.scan_session();
    scan.start(Some(filter))?;

    let device = {
        let mut devices = Box::pin(scan.devices());
        match devices.next().await {
            Some(device) => device?,
            None => {
                println!("Scan ended without finding a device");
                return Ok(());
            }
        }
    };
    scan.stop();

    println!("Connecting to {}...", device);

    // Read battery once, then follow both characteristics if present.
    let config = LinkConfig::default()
        .read_on_ready(BATTERY_LEVEL_UUID)
        .notify_on_ready(BATTERY_LEVEL_UUID)
        .notify_on_ready(HEART_RATE_MEASUREMENT_UUID);

    let (link, mut updates) = central.gatt_link(config);
    link.connect(device)?;

    loop {
        let update = tokio::select! {
            update = updates.recv() => update,
            _ = tokio::signal::ctrl_c() => break,
        };

        match update {
            Some(Ok(LinkUpdate::StateChanged { from, to })) => {
                println!("State: {} -> {}", from, to);
            }
            Some(Ok(LinkUpdate::ServicesReady(services))) => {
                println!("Discovered {} service(s)", services.len());
                for service in &services {
                    println!("  {}", service.uuid);
                }
            }
            Some(Ok(LinkUpdate::Characteristic(update))) => match update.value {
                DecodedValue::BatteryPercent(level) => println!("Battery: {}%", level),
                DecodedValue::HeartRate(bpm) => println!("Heart rate: {} bpm", bpm),
                other => println!("{}: {}", update.uuid, other),
            },
            Some(Ok(LinkUpdate::NotificationsChanged { uuid, enabled })) => {
                println!(
                    "Notifications {} for {}",
                    if enabled { "enabled" } else { "disabled" },
                    uuid
                );
            }
            Some(Ok(LinkUpdate::Error(e))) => eprintln!("Link error: {}", e),
            Some(Err(Error::ChannelOverflow { dropped })) => {
                eprintln!("Missed {} update(s)", dropped);
            }
            Some(Err(e)) => eprintln!("Error: {}", e),
            None => break,
        }

        if !link.state().is_connected() && !link.state().is_transitioning() {
            println!("Disconnected");
            break;
        }
    }

    link.close();
    Ok(())
}
