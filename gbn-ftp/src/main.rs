//! Entry point for `gbn-ftp`.
//!
//! Parses CLI arguments and dispatches into either **send** or **receive**
//! mode.  All protocol work is delegated to the library; `main.rs` owns only
//! process setup (logging, argument parsing, file handling).

use std::fs::File;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gbn_ftp::receiver::{ReceiverServer, Session};
use gbn_ftp::SenderConfig;

/// Reliable file transfer over UDP with Go-Back-N.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Send one file to a receiver.
    Send {
        /// Receiver host name or address.
        #[arg(short, long, default_value = "localhost")]
        server: String,
        /// Receiver port (control and data share it).
        #[arg(short, long)]
        port: u16,
        /// Go-Back-N window, in segments.
        #[arg(short, long, default_value_t = gbn_ftp::config::DEFAULT_WINDOW_SIZE)]
        window: usize,
        /// Retransmission timeout in milliseconds.
        #[arg(short, long, default_value_t = 100)]
        timeout_ms: u64,
        /// Give up after this many consecutive timeouts.
        #[arg(long)]
        max_timeouts: Option<u32>,
        /// File to send; transferred under its file name.
        file: PathBuf,
    },
    /// Run the reference receiver.
    Receive {
        /// Local address to bind (TCP and UDP).
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: String,
        /// Directory received files are written to.
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
        /// Exit after the first session.
        #[arg(long)]
        once: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    match Cli::parse().mode {
        Mode::Send {
            server,
            port,
            window,
            timeout_ms,
            max_timeouts,
            file,
        } => {
            let mut config = SenderConfig::default()
                .with_window_size(window)
                .with_timeout(Duration::from_millis(timeout_ms));
            config.max_timeouts = max_timeouts;
            send(&server, port, &file, config).await
        }
        Mode::Receive {
            bind,
            out_dir,
            once,
        } => receive(&bind, &out_dir, once).await,
    }
}

async fn send(host: &str, port: u16, file: &Path, config: SenderConfig) -> Result<()> {
    let meta = std::fs::metadata(file).with_context(|| format!("cannot stat {}", file.display()))?;
    if !meta.is_file() {
        bail!("{} is not a regular file", file.display());
    }
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("{} has no UTF-8 file name", file.display()))?
        .to_owned();
    let source = File::open(file).with_context(|| format!("cannot open {}", file.display()))?;

    let server = tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("cannot resolve {host}"))?
        .next()
        .with_context(|| format!("{host} resolved to no address"))?;
    log::info!("Sending {} to {server}", file.display());

    let stats = tokio::task::spawn_blocking(move || {
        gbn_ftp::send_stream(server, &name, source, config)
    })
    .await
    .context("sender thread panicked")??;

    println!("{stats}");
    Ok(())
}

async fn receive(bind: &str, out_dir: &Path, once: bool) -> Result<()> {
    let addr = bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid bind address {bind}"))?;
    let mut server = ReceiverServer::bind(addr).await?;
    log::info!("Receiving into {}", out_dir.display());

    loop {
        let session = server
            .accept_one(|name| match output_name(name) {
                Some(_) => gbn_ftp::control::STATUS_PROCEED,
                None => -1,
            })
            .await;

        match session {
            Ok(Session::Received(object)) => {
                // Admission already checked the name.
                if let Some(file_name) = output_name(&object.name) {
                    let path = out_dir.join(file_name);
                    tokio::fs::write(&path, &object.data)
                        .await
                        .with_context(|| format!("cannot write {}", path.display()))?;
                    println!("{} ({} bytes)", path.display(), object.data.len());
                }
            }
            Ok(Session::Rejected { name, status }) => {
                log::warn!("Refused {name:?} (status {status})");
            }
            Err(e) => log::error!("Session failed: {e}"),
        }

        if once {
            return Ok(());
        }
    }
}

/// Last path component of `name`, if it is a usable file name.
fn output_name(name: &str) -> Option<&str> {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
}
