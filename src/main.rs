//! Sotto - pairwise encrypted messaging over TCP.
//!
//! Interactive client: binds a listener for inbound sessions and messages,
//! and drives a prompt loop. Type a hostname or IP address to open a
//! session with that peer; once a session is open, every line you type is
//! sent to them.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sotto::{
    establish_outbound_port, send_to, serve_connection, Inbound, MemoryKeyStore, MemoryRegistry,
    Session, DEFAULT_KEY_BITS, DEFAULT_PORT,
};

/// Pairwise encrypted messaging over TCP.
#[derive(Parser)]
#[command(name = "sotto", version)]
#[command(about = "Pairwise encrypted messaging over TCP")]
struct Cli {
    /// Address to listen on for inbound sessions and messages
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// TCP port for inbound and outbound connections
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// RSA modulus size for the lazily generated identity
    #[arg(long, default_value_t = DEFAULT_KEY_BITS)]
    key_bits: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "sotto=info".into()))
        .init();
    let cli = Cli::parse();

    let keystore = Arc::new(MemoryKeyStore::with_bits(cli.key_bits));
    let registry = Arc::new(MemoryRegistry::new());

    let listener = TcpListener::bind((cli.bind.as_str(), cli.port))
        .await
        .with_context(|| format!("binding {}:{}", cli.bind, cli.port))?;
    info!(addr = %listener.local_addr()?, "listening");

    tokio::spawn(accept_loop(listener, keystore.clone(), registry.clone()));

    prompt_loop(cli.port, keystore, registry).await
}

/// One task per accepted connection; a failed exchange never takes the
/// loop down.
async fn accept_loop(
    listener: TcpListener,
    keystore: Arc<MemoryKeyStore>,
    registry: Arc<MemoryRegistry>,
) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!(error = %e, "accept failed");
                continue;
            }
        };
        let keystore = keystore.clone();
        let registry = registry.clone();
        tokio::spawn(async move {
            match serve_connection(stream, &*keystore, &*registry).await {
                Ok(Inbound::Established(session)) => {
                    println!("* session {} opened by {}", session.id(), session.peer());
                }
                Ok(Inbound::Delivered { session, plaintext }) => {
                    println!("<{}> {}", session.peer(), plaintext);
                }
                Err(e) => error!(%peer, error = %e, "inbound exchange failed"),
            }
        });
    }
}

/// Read stdin lines: the first input opens a session, later lines are
/// messages to the current peer.
async fn prompt_loop(
    port: u16,
    keystore: Arc<MemoryKeyStore>,
    registry: Arc<MemoryRegistry>,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut current: Option<Arc<Session>> = None;

    println!("Type a hostname or IP address to open a session.");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match &current {
            None => {
                println!("* opening session with {line} (key generation may take a while)");
                match establish_outbound_port(line, port, &*keystore, &*registry).await {
                    Ok(session) => {
                        println!("* session {} established with {}", session.id(), session.peer());
                        current = Some(session);
                    }
                    Err(e) => error!(remote = line, error = %e, "could not open session"),
                }
            }
            Some(session) => {
                if let Err(e) = send_to(session, port, line).await {
                    error!(id = %session.id(), error = %e, "could not send message");
                }
            }
        }
    }
    Ok(())
}
