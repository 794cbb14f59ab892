//! Simulated channel forking its audio to a UDP monitor.
//!
//! Usage: cargo run --example fork_sender -- <ip:port[,channel_id][,exten][,caller_id][,called_id]> [seconds]
//!
//! Two threads play the host's read and write paths, each delivering one
//! 160-byte (20 ms G.711) frame every 20 ms, then the hook is torn down.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use forkstream::{
    config, parse_arguments, Direction, ForkHook, Frame, FrameSink, HookEvent, StreamIdGenerator,
};

fn main() {
    config::init_logging();

    let mut argv = std::env::args().skip(1);
    let Some(spec) = argv.next() else {
        eprintln!("usage: fork_sender <ip:port[,channel_id][,exten][,caller_id][,called_id]> [seconds]");
        std::process::exit(2);
    };
    let seconds: u64 = argv.next().and_then(|s| s.parse().ok()).unwrap_or(5);

    let args = match parse_arguments(&spec) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Invalid arguments: {}", e);
            std::process::exit(2);
        }
    };

    let ids = StreamIdGenerator::new();
    let hook = match ForkHook::attach(&args, "Local/demo-00000001;1", &ids) {
        Ok(hook) => Arc::new(hook),
        Err(e) => {
            eprintln!("Failed to start fork: {}", e);
            std::process::exit(1);
        }
    };

    println!(
        "Forking to {} (stream_id: {:#010x}) for {}s",
        args.destination,
        hook.stream_id().unwrap_or(0),
        seconds
    );

    let deadline = Instant::now() + Duration::from_secs(seconds);
    let legs: Vec<_> = [(HookEvent::Read, 0x55u8), (HookEvent::Write, 0xD5u8)]
        .into_iter()
        .map(|(event, fill)| {
            let hook = hook.clone();
            thread::spawn(move || {
                let frame = [fill; 160];
                let mut next = Instant::now();
                while Instant::now() < deadline {
                    let out = hook.on_frame(event, Frame::voice(&frame));
                    debug_assert_eq!(out.data.len(), frame.len());
                    next += Duration::from_millis(20);
                    if let Some(wait) = next.checked_duration_since(Instant::now()) {
                        thread::sleep(wait);
                    }
                }
            })
        })
        .collect();

    for leg in legs {
        let _ = leg.join();
    }

    if let Some(stats) = hook.stats() {
        println!(
            "RX seq: {}, TX seq: {}, packets: {}, bytes: {}, errors: {}",
            hook.sequence(Direction::Rx).unwrap_or(0),
            hook.sequence(Direction::Tx).unwrap_or(0),
            stats.packets_sent,
            stats.bytes_sent,
            stats.send_errors
        );
    }

    hook.on_teardown();
}
