//! FTL publish walkthrough: bring a stream up, watch it, take it down
//!
//! Run with: cargo run --example publish HOST CHANNEL_ID STREAM_KEY
//!
//! Examples:
//!   cargo run --example publish ingest.example.com 1234 aBcDeF123456
//!   cargo run --example publish 127.0.0.1 1234 test          # local ingest_sim
//!
//! The example performs the full control handshake, prints the negotiated
//! RTP parameters and the media port, then keeps the session alive until
//! Ctrl+C (or until the ingest stops answering keepalives). An actual
//! media pipeline would send RTP to the announced port in parallel.

use std::time::Duration;

use ftl_rs::{AudioComponent, SessionEvent, VideoComponent};

struct Args {
    host: String,
    channel_id: u64,
    stream_key: String,
}

fn parse_args() -> Result<Args, String> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 4 {
        return Err("expected exactly three arguments".into());
    }

    let channel_id = args[2]
        .parse()
        .map_err(|_| format!("invalid channel id: '{}'", args[2]))?;

    Ok(Args {
        host: args[1].clone(),
        channel_id,
        stream_key: args[3].clone(),
    })
}

fn print_usage() {
    eprintln!("Usage: publish HOST CHANNEL_ID STREAM_KEY");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  HOST        Ingest hostname or IP address");
    eprintln!("  CHANNEL_ID  Numeric channel id");
    eprintln!("  STREAM_KEY  Stream key for the channel");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  publish ingest.example.com 1234 aBcDeF123456");
    eprintln!("  publish 127.0.0.1 1234 test          # against a local ingest_sim");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ftl_rs=debug".parse()?)
                .add_directive("publish=info".parse()?),
        )
        .init();

    ftl_rs::init()?;

    let mut slot = None;
    ftl_rs::create_stream(&mut slot)?;
    let stream = slot.as_mut().unwrap();

    stream.set_ingest_location(&args.host)?;
    stream.set_authentication(args.channel_id, &args.stream_key)?;
    stream.attach_audio_component(AudioComponent::opus())?;
    stream.attach_video_component(VideoComponent::vp8(1920, 1080)?)?;

    println!("Connecting to {} (channel {})...", args.host, args.channel_id);
    stream.activate().await?;

    let plan = stream.negotiated_media().expect("active stream has a plan");
    println!("Stream is live.");
    if let Some(audio) = plan.audio {
        println!(
            "  audio: payload type {}, SSRC {}",
            audio.payload_type, audio.ssrc
        );
    }
    if let Some(video) = plan.video {
        println!(
            "  video: payload type {}, SSRC {}",
            video.payload_type, video.ssrc
        );
    }
    match stream.media_port() {
        Some(port) => println!("  send RTP to {}:{}", args.host, port),
        None => println!("  ingest announced no media port"),
    }
    println!();
    println!("Press Ctrl+C to stop.");

    let mut events = stream.take_events().expect("events not yet taken");
    let mut stats_tick = tokio::time::interval(Duration::from_secs(5));
    stats_tick.tick().await; // first tick is immediate

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
            event = events.recv() => {
                match event {
                    Some(SessionEvent::KeepaliveMissed { consecutive }) => {
                        println!("keepalive missed ({} in a row)", consecutive);
                    }
                    Some(SessionEvent::ConnectionLost { reason }) => {
                        println!("connection lost: {}", reason);
                        break;
                    }
                    None => break,
                }
            }
            _ = stats_tick.tick() => {
                let stats = stream.stats();
                println!(
                    "up {:?}: {} pings sent, {} answered, {} missed, last rtt {:?}",
                    stats.duration,
                    stats.pings_sent,
                    stats.pongs_received,
                    stats.pings_missed,
                    stats.last_rtt,
                );
            }
        }
    }

    stream.deactivate().await?;
    ftl_rs::destroy_stream(&mut slot).await?;
    println!("Done.");
    Ok(())
}
