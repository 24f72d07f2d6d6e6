//! Duplicate audio from one endpoint to another for 30 seconds.
//!
//! Usage: `duplicate [source-device-id destination-device-id]`
//!
//! With no arguments, taps the default render device (loopback) and plays
//! the copy onto the first other render device found.

#[cfg(target_os = "windows")]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::sync::Arc;
    use std::time::Duration;

    use audio_duplex_core::{
        AudioBackend, DeviceEvent, DeviceFlow, DeviceWatchdog, DuplexSession, LatencyPreset,
        SessionConfig,
    };
    use audio_duplex_windows::WasapiBackend;

    let backend = Arc::new(WasapiBackend::new());

    let mut args = std::env::args().skip(1);
    let (source_id, dest_id) = match (args.next(), args.next()) {
        (Some(src), Some(dst)) => (src, dst),
        _ => {
            let source_id = backend.default_device_id(DeviceFlow::Render)?;
            let dest = backend
                .list_devices()?
                .into_iter()
                .find(|d| d.flow == DeviceFlow::Render && d.id != source_id)
                .ok_or("no second render device to duplicate onto")?;
            println!("duplicating default output onto \"{}\"", dest.name);
            (source_id, dest.id)
        }
    };

    let config =
        SessionConfig::new(source_id.clone(), dest_id).with_latency(LatencyPreset::Balanced);
    let mut session = DuplexSession::new(backend.clone() as Arc<dyn AudioBackend>, config);
    session.start()?;
    println!("session active ({:?})", session.status());

    let _watchdog = DeviceWatchdog::spawn(
        backend as Arc<dyn AudioBackend>,
        source_id,
        Duration::from_secs(1),
        Arc::new(|event| match event {
            DeviceEvent::Disconnected => println!("source device lost"),
            DeviceEvent::Connected => println!("source device back; restart the session to resume"),
        }),
    );

    std::thread::sleep(Duration::from_secs(30));

    if let Some(stats) = session.buffer_stats() {
        println!(
            "copied {} bytes ({} overflows, {} underflows)",
            stats.bytes_written, stats.overflows, stats.underflows
        );
    }
    session.stop();
    Ok(())
}

#[cfg(not(target_os = "windows"))]
fn main() {
    eprintln!("this example only runs on Windows");
}
