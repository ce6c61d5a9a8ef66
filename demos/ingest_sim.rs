//! Minimal FTL ingest simulator for local testing
//!
//! Run with: cargo run --example ingest_sim [BIND_ADDR] [STREAM_KEY]
//!
//! Examples:
//!   cargo run --example ingest_sim                      # 0.0.0.0:8084, key "test"
//!   cargo run --example ingest_sim 127.0.0.1:8084       # explicit bind
//!   cargo run --example ingest_sim 127.0.0.1:8084 s3cr3t
//!
//! Speaks just enough of the control protocol to exercise a client: it
//! issues HMAC salts, verifies CONNECT proofs against the configured key,
//! acknowledges negotiation with a media port announcement, and answers
//! keepalive pings. No RTP is received; the announced port goes nowhere.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use ftl_rs::protocol::auth;
use ftl_rs::protocol::{Command, Response};

const MEDIA_PORT: u16 = 8082;

fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    const DEFAULT_PORT: u16 = 8084;

    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: ingest_sim [BIND_ADDR] [STREAM_KEY]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR   Address to bind to (default: 0.0.0.0:8084)");
    eprintln!("  STREAM_KEY  Key accepted for any channel (default: test)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let bind_addr = match args.get(1) {
        Some(addr_str) => match parse_bind_addr(addr_str) {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => "0.0.0.0:8084".parse().unwrap(),
    };
    let stream_key: Arc<Vec<u8>> = Arc::new(
        args.get(2)
            .map(|s| s.as_bytes().to_vec())
            .unwrap_or_else(|| b"test".to_vec()),
    );

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ftl_rs=debug".parse()?)
                .add_directive("ingest_sim=debug".parse()?),
        )
        .init();

    let listener = TcpListener::bind(bind_addr).await?;
    println!("Ingest simulator listening on {}", bind_addr);
    println!("Accepting any channel with the configured stream key.");
    println!();
    println!("Point a client at it:");
    println!("  cargo run --example publish 127.0.0.1 1234 <STREAM_KEY>");
    println!();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, peer) = accepted?;
                let key = Arc::clone(&stream_key);
                tokio::spawn(async move {
                    println!("[{}] connected", peer);
                    if let Err(e) = serve(socket, peer, &key).await {
                        println!("[{}] connection error: {}", peer, e);
                    }
                    println!("[{}] closed", peer);
                });
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                return Ok(());
            }
        }
    }
}

async fn serve(mut socket: TcpStream, peer: SocketAddr, stream_key: &[u8]) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut salt: Option<String> = None;
    let mut channel: Option<u64> = None;

    while let Some(frame) = read_frame(&mut socket, &mut buf).await? {
        let cmd = match Command::parse(&frame) {
            Ok(cmd) => cmd,
            Err(e) => {
                println!("[{}] rejected frame: {}", peer, e);
                socket.write_all(&Response::new(400).encode()).await?;
                continue;
            }
        };

        let reply = match &cmd {
            Command::Hmac => {
                let fresh = auth::generate_salt();
                let reply = Response::with_detail(200, fresh.clone());
                salt = Some(fresh);
                Some(reply)
            }
            Command::Connect { channel_id, proof } => match &salt {
                Some(salt) if auth::verify(stream_key, salt, proof) => {
                    println!("[{}] channel {} authenticated", peer, channel_id);
                    channel = Some(*channel_id);
                    Some(Response::new(200))
                }
                Some(_) => {
                    println!("[{}] channel {} presented a bad proof", peer, channel_id);
                    Some(Response::new(401))
                }
                None => Some(Response::new(400)),
            },
            Command::Attribute { key, value } => {
                println!("[{}]   {}: {}", peer, key, value);
                None
            }
            Command::EndAttributes => {
                println!(
                    "[{}] channel {:?} negotiated, announcing media port {}",
                    peer, channel, MEDIA_PORT
                );
                Some(Response::with_detail(
                    200,
                    format!("Use UDP port {}", MEDIA_PORT),
                ))
            }
            Command::Ping { .. } => Some(Response::new(201)),
            Command::Disconnect => {
                println!("[{}] channel {:?} disconnected cleanly", peer, channel);
                return Ok(());
            }
        };

        if let Some(reply) = reply {
            socket.write_all(&reply.encode()).await?;
        }
    }

    Ok(())
}

/// Read one terminated command frame; `None` at EOF
async fn read_frame(socket: &mut TcpStream, buf: &mut Vec<u8>) -> std::io::Result<Option<String>> {
    loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let frame: Vec<u8> = buf.drain(..pos + 4).collect();
            return Ok(Some(String::from_utf8_lossy(&frame[..pos]).into_owned()));
        }

        let mut chunk = [0u8; 1024];
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}
