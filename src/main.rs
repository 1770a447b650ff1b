//! dapid - desktop API daemon
//!
//! Serves the DAPI protocol on a Unix socket so that applications can ask the
//! desktop to open URLs, compose mail, suspend the screensaver and resolve
//! local files.

mod config;
mod desktop;
mod handlers;
mod server;
mod x11;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use dapi_ipc::Protocol;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use desktop::SystemDesktop;
use handlers::HandlerTable;
use server::Server;
use x11::X11Display;

const USAGE: &str = "Usage: dapid [--config PATH] [--socket PATH]";

/// Command line options
#[derive(Debug, Default)]
struct Options {
    config: Option<PathBuf>,
    socket: Option<PathBuf>,
}

impl Options {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Option<Self>> {
        let mut options = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let path = args.next().context("--config needs a path")?;
                    options.config = Some(PathBuf::from(path));
                }
                "--socket" => {
                    let path = args.next().context("--socket needs a path")?;
                    options.socket = Some(PathBuf::from(path));
                }
                "-h" | "--help" => return Ok(None),
                other => bail!("Unknown argument `{}`\n{}", other, USAGE),
            }
        }
        Ok(Some(options))
    }
}

fn main() -> Result<()> {
    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "dapid=debug,dapi_ipc=info,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let Some(options) = Options::parse(std::env::args().skip(1))? else {
        println!("{}", USAGE);
        return Ok(());
    };

    info!("Starting dapid");

    let config = match &options.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load().unwrap_or_else(|e| {
            warn!("Failed to load config: {:#}, using defaults", e);
            Config::default()
        }),
    };

    let protocol = Protocol::builtin().context("Built-in protocol schema is invalid")?;
    let handlers = HandlerTable::standard(&protocol)?;

    let display = if config.desktop.x11 {
        match X11Display::connect() {
            Ok(display) => Some(display),
            Err(e) => {
                warn!("Screensaver control unavailable: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    let desktop = SystemDesktop::new(&config, display.as_ref().map(X11Display::dpms));
    let socket_path = options.socket.unwrap_or_else(|| config.socket_path());

    let mut server = Server::bind(&socket_path, protocol, handlers, desktop)?
        .with_max_payload_len(config.server.max_payload_len);
    if let Some(display) = display {
        server = server.with_event_source(Box::new(display));
    }

    server.run()
}
