//! Scripted ingest peer for tests
//!
//! Binds a real loopback listener, speaks just enough of the control
//! protocol to walk a client through the handshake, and records every
//! command it sees. One connection is served at a time; a stream that
//! reconnects is picked up by the next accept.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::protocol::auth;
use crate::protocol::wire::{Command, Response};

/// How the peer treats each step of the exchange
pub(crate) enum MockBehavior {
    /// Verify proofs against the key and accept everything
    Accept {
        stream_key: Vec<u8>,
        media_port: Option<u16>,
        answer_pings: bool,
    },
    /// Hand out a salt, then refuse the credentials with `code`
    RejectAuth { code: u16 },
    /// Accept authentication, refuse at end-of-attributes with `code`
    RejectNegotiation { stream_key: Vec<u8>, code: u16 },
    /// Answer the first command with an unparseable line
    Garbage,
}

impl MockBehavior {
    pub(crate) fn accept_all(stream_key: &[u8]) -> Self {
        MockBehavior::Accept {
            stream_key: stream_key.to_vec(),
            media_port: None,
            answer_pings: true,
        }
    }

    /// Announce a UDP media port in the accept response
    pub(crate) fn media_port(mut self, port: u16) -> Self {
        if let MockBehavior::Accept { media_port, .. } = &mut self {
            *media_port = Some(port);
        }
        self
    }

    /// Let pings go unanswered
    pub(crate) fn ignore_pings(mut self) -> Self {
        if let MockBehavior::Accept { answer_pings, .. } = &mut self {
            *answer_pings = false;
        }
        self
    }
}

pub(crate) struct MockIngest {
    port: u16,
    log: Arc<Mutex<Vec<Command>>>,
    stop_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockIngest {
    pub(crate) async fn spawn(behavior: MockBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock ingest");
        let port = listener.local_addr().expect("local addr").port();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (stop_tx, mut stop_rx) = oneshot::channel();

        let task_log = log.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { break };
                        serve_connection(stream, &behavior, &task_log).await;
                    }
                    _ = &mut stop_rx => break,
                }
            }
        });

        MockIngest {
            port,
            log,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    pub(crate) fn host(&self) -> &'static str {
        "127.0.0.1"
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    /// Commands recorded so far, oldest first
    pub(crate) fn commands(&self) -> Vec<Command> {
        self.log.lock().unwrap().clone()
    }

    /// Stop serving and return the recorded commands
    ///
    /// Close the client side first; the server finishes its current
    /// connection at EOF before shutting down.
    pub(crate) async fn stop(mut self) -> Vec<Command> {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut handle) = self.handle.take() {
            if tokio::time::timeout(Duration::from_secs(2), &mut handle)
                .await
                .is_err()
            {
                handle.abort();
            }
        }
        let log = self.log.lock().unwrap().clone();
        log
    }
}

impl Drop for MockIngest {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    behavior: &MockBehavior,
    log: &Arc<Mutex<Vec<Command>>>,
) {
    let mut buf = Vec::new();
    let mut salt: Option<String> = None;
    let mut garbage_sent = false;

    loop {
        let frame = match read_frame(&mut stream, &mut buf).await {
            Ok(Some(frame)) => frame,
            Ok(None) | Err(_) => return,
        };

        if let MockBehavior::Garbage = behavior {
            if !garbage_sent {
                garbage_sent = true;
                let _ = stream.write_all(b"banana\n").await;
            }
            continue;
        }

        let cmd = match Command::parse(&frame) {
            Ok(cmd) => cmd,
            Err(_) => {
                let _ = stream.write_all(&Response::new(400).encode()).await;
                continue;
            }
        };
        log.lock().unwrap().push(cmd.clone());

        let reply = match (&cmd, behavior) {
            (Command::Hmac, _) => {
                let fresh = auth::generate_salt();
                let reply = Response::with_detail(200, fresh.clone());
                salt = Some(fresh);
                Some(reply)
            }
            (Command::Connect { .. }, MockBehavior::RejectAuth { code }) => {
                Some(Response::new(*code))
            }
            (
                Command::Connect { proof, .. },
                MockBehavior::Accept { stream_key, .. }
                | MockBehavior::RejectNegotiation { stream_key, .. },
            ) => match &salt {
                Some(salt) if auth::verify(stream_key, salt, proof) => Some(Response::new(200)),
                Some(_) => Some(Response::new(401)),
                None => Some(Response::new(400)),
            },
            (Command::Attribute { .. }, _) => None,
            (Command::EndAttributes, MockBehavior::Accept { media_port, .. }) => {
                Some(match media_port {
                    Some(port) => Response::with_detail(200, format!("Use UDP port {}", port)),
                    None => Response::new(200),
                })
            }
            (Command::EndAttributes, MockBehavior::RejectNegotiation { code, .. }) => {
                Some(Response::new(*code))
            }
            (Command::Ping { .. }, MockBehavior::Accept { answer_pings, .. }) => {
                answer_pings.then(|| Response::new(201))
            }
            (Command::Ping { .. }, _) => Some(Response::new(201)),
            (Command::Disconnect, _) => None,
            (Command::Connect { .. }, _) | (Command::EndAttributes, _) => None,
        };

        if let Some(reply) = reply {
            if stream.write_all(&reply.encode()).await.is_err() {
                return;
            }
        }
    }
}

/// Read one terminated command frame; `None` at EOF
pub(crate) async fn read_frame<S: tokio::io::AsyncRead + Unpin>(
    stream: &mut S,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<String>> {
    loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let frame: Vec<u8> = buf.drain(..pos + 4).collect();
            return Ok(Some(String::from_utf8_lossy(&frame[..pos]).into_owned()));
        }

        let mut chunk = [0u8; 1024];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}
