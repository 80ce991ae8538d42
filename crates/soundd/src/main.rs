//! soundd daemon entry point.
//!
//! Wires a listening socket to the Audio Engine: each accepted connection
//! gets its own [`ContextSession`] driven on a dedicated thread (the
//! "single-threaded cooperative io on each Context's io-context" of the
//! concurrency model, realized as one OS thread per context rather than a
//! shared reactor). The daemon itself owns only the listener and the
//! engine; everything else is the core crate's.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;

use anyhow::Context as _;
use tracing::{error, info, warn};

use soundd_core::{AudioEngine, CloseReason, ConfigWatcher, ContextSession, DaemonConfig};

/// Environment variable carrying the path to the daemon's JSON config
/// file. The config loader is out of scope for the core; the daemon's
/// `main` is the one piece of CLI/env plumbing the spec leaves to us.
const CONFIG_PATH_VAR: &str = "SOUNDD_CONFIG";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| "soundd.json".into());
    let watcher = ConfigWatcher::spawn(&config_path);
    let initial = watcher
        .try_recv_latest()
        .unwrap_or_else(DaemonConfig::default);

    info!(port = initial.server.port, path = %config_path, "starting soundd");

    let engine = Arc::new(AudioEngine::new(initial.sound.clone()).context("failed to start audio engine")?);
    engine.start().context("failed to start audio streams")?;

    let listener = TcpListener::bind(("0.0.0.0", initial.server.port))
        .with_context(|| format!("failed to bind port {}", initial.server.port))?;
    info!(addr = %listener.local_addr()?, "listening");

    for incoming in listener.incoming() {
        match incoming {
            Ok(stream) => {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || serve_connection(stream, engine));
            }
            Err(e) => {
                warn!(error = %e, "failed to accept connection");
            }
        }
    }

    Ok(())
}

/// Drives one [`ContextSession`] to completion: asks the framer how many
/// bytes it needs, reads exactly that many off the socket, feeds them in,
/// and writes back whatever replies were enqueued. Runs until the client
/// closes the socket or the context reports a fatal protocol error.
fn serve_connection(mut stream: TcpStream, engine: Arc<AudioEngine>) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".into());
    info!(peer = %peer, "context opened");

    let mut context = ContextSession::new();
    let mut buf = vec![0u8; soundd_core::MAX_BYTES_ON_MESSAGE as usize];

    let reason = loop {
        let needed = context.next_needed();
        if needed > buf.len() {
            buf.resize(needed, 0);
        }
        match stream.read_exact(&mut buf[..needed]) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break CloseReason::Closing;
            }
            Err(e) => {
                warn!(peer = %peer, error = %e, "read error, aborting context");
                break CloseReason::Aborting;
            }
        }

        if let Err(e) = context.feed(&buf[..needed], engine.as_ref()) {
            warn!(peer = %peer, error = %e, "protocol error, aborting context");
            break CloseReason::Aborting;
        }

        let outgoing = context.drain_outgoing();
        if !outgoing.is_empty() {
            if let Err(e) = stream.write_all(&outgoing) {
                warn!(peer = %peer, error = %e, "write error, aborting context");
                break CloseReason::Aborting;
            }
        }
    };

    match reason {
        CloseReason::Closing => info!(peer = %peer, "context closed"),
        CloseReason::Aborting => error!(peer = %peer, "context aborted"),
    }
    let _ = stream.shutdown(std::net::Shutdown::Both);
}
