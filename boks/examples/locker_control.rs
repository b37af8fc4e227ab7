//! Locker control example
//!
//! Drives the session layer against the scripted in-memory transport so
//! the full flow can be run without a physical locker. Swap in a real
//! BLE adapter implementing [`boks_transport::Transport`] to talk to
//! actual hardware.

use boks::{BoksDevice, CodeKind, StatusUpdate};
use boks_transport::testing::{frame, ScriptedTransport};
use std::sync::Arc;

#[tokio::main]
async fn main() -> boks::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let (transport, script) = ScriptedTransport::new();

    // Script the device side of the conversation
    script.reply_to(0x02, vec![frame(0x85, &[0x01, 0x00])]);
    script.reply_to(0x12, vec![frame(0x77, &[])]);
    script.reply_to(0x07, vec![frame(0x79, &[0x00, 0x02])]);
    script.reply_to(
        0x03,
        vec![
            frame(0x91, &[0x00, 0x0E, 0x10]),
            frame(0x90, &[0x00, 0x0D, 0xFB]),
            frame(0x92, &[0x00, 0x00, 0x00]),
        ],
    );

    let device = BoksDevice::new(Box::new(transport)).with_config_key("12345678")?;

    device.register_status_callback(Arc::new(|update| {
        if let StatusUpdate::Door { open } = update {
            println!("door is now {}", if open { "open" } else { "closed" });
        }
    }));

    device.connect().await?;
    println!("Locker connected!");

    let open = device.get_door_status().await?;
    println!("Door open: {open}");

    let code = device.create_pin_code(None, CodeKind::SingleUse, 0).await?;
    println!("New single-use code: {code}");

    let logs = device.get_logs(None).await?;
    for entry in &logs {
        println!("{} at {}", entry.event, entry.timestamp);
    }

    device.disconnect().await?;
    println!("Done!");

    Ok(())
}
