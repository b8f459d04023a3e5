//! Print what every player is playing and follow changes live
//!
//! Run with: cargo run -p heos-sdk --example now_playing -- <device ip>
//!
//! Set HEOS_LOG_MODE=development to see session activity (heartbeats,
//! recovery) on stderr.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use heos_sdk::{logging, EventKind, HeosEvent, HeosListener, HeosSystem, Media};

/// Prints events; looks up volume through the system on volume changes
struct Printer {
    system: HeosSystem,
}

impl HeosListener for Printer {
    fn on_event(&self, event: &HeosEvent) {
        match event.kind {
            EventKind::PlayerNowPlayingChanged => {
                if let (Some(pid), Some(media)) = (event.player_id(), &event.now_playing) {
                    println!("[{}] now playing {}", pid, describe(media));
                }
            }
            EventKind::PlayerVolumeChanged => {
                let Some(pid) = event.player_id() else { return };
                // Calling back into the system from a listener is allowed.
                match self.system.get_player_by_id(pid).and_then(|p| p.volume()) {
                    Ok(level) => println!("[{}] volume {}", pid, level),
                    Err(e) => println!("[{}] volume changed, lookup failed: {}", pid, e),
                }
            }
            _ => println!("[event] {} {:?}", event.command, event.attributes),
        }
    }

    fn on_connection_lost(&self) {
        println!("Connection lost, waiting for the device to come back...");
    }

    fn on_connection_restored(&self) {
        println!("Connection restored");
    }
}

fn describe(media: &Media) -> String {
    if media.song.is_empty() {
        media.station.clone().unwrap_or_else(|| "nothing".to_string())
    } else {
        format!("{} - {}", media.artist, media.song)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging_from_env()?;

    let host = std::env::args()
        .nth(1)
        .ok_or("usage: now_playing <device ip>")?;

    println!("Connecting to {}...", host);
    let system = HeosSystem::connect(&host)?;

    for player in system.players()? {
        match player.now_playing() {
            Ok(media) => println!("{} ({}): {}", player.name, player.model, describe(&media)),
            Err(e) => println!("{} ({}): {}", player.name, player.model, e),
        }
    }

    let printer = Arc::new(Printer {
        system: system.clone(),
    });
    system.add_listener(&printer);

    println!("\nWaiting for events (Ctrl+C to quit)...\n");

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(200));
    }

    println!("\nShutting down...");
    system.shutdown();
    Ok(())
}
