//! DAPI daemon server
//!
//! One thread multiplexes the listening socket, every client connection and
//! an optional foreign event source (the X display) with `poll(2)`.
//! Each wake first drains the event source, then serves one command from
//! every readable client, then accepts at most one new connection.

pub mod table;

use std::fs;
use std::io;
use std::os::fd::AsFd;
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, bail};
use dapi_ipc::{Args, Code, Connection, FrameError, Operation, Protocol, Role};
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use tracing::{debug, error, info, warn};

use crate::desktop::Desktop;
use crate::handlers::{Context, HandlerTable, Inhibitors, Session};
use table::ConnectionTable;

/// A descriptor polled alongside the clients
pub trait EventSource: AsFd {
    fn name(&self) -> &str;

    /// Handle whatever made the descriptor readable
    fn drain(&mut self) -> Result<()>;
}

/// One connected client
struct Client {
    conn: Connection,
    session: Session,
}

pub struct Server<D: Desktop> {
    listener: UnixListener,
    socket_path: PathBuf,
    protocol: Protocol,
    handlers: HandlerTable,
    capabilities: Vec<Code>,
    desktop: D,
    clients: ConnectionTable<Client>,
    inhibitors: Inhibitors,
    events: Option<Box<dyn EventSource>>,
    max_payload_len: usize,
}

impl<D: Desktop> Server<D> {
    /// Listen on `socket_path`, replacing a stale socket file
    pub fn bind(
        socket_path: &Path,
        protocol: Protocol,
        handlers: HandlerTable,
        desktop: D,
    ) -> Result<Self> {
        // Remove existing socket if it exists
        if socket_path.exists() {
            fs::remove_file(socket_path)
                .with_context(|| format!("Failed to remove stale socket {:?}", socket_path))?;
        }
        if let Some(parent) = socket_path.parent() {
            fs::create_dir_all(parent).context("Failed to create socket directory")?;
        }

        let listener = UnixListener::bind(socket_path)
            .with_context(|| format!("Failed to bind IPC socket {:?}", socket_path))?;
        listener
            .set_nonblocking(true)
            .context("Failed to make listener non-blocking")?;
        info!("IPC server listening on {:?}", socket_path);

        let capabilities = handlers.capabilities();
        Ok(Self {
            listener,
            socket_path: socket_path.to_path_buf(),
            protocol,
            handlers,
            capabilities,
            desktop,
            clients: ConnectionTable::new(),
            inhibitors: Inhibitors::default(),
            events: None,
            max_payload_len: dapi_ipc::wire::DEFAULT_MAX_PAYLOAD_LEN,
        })
    }

    pub fn with_event_source(mut self, source: Box<dyn EventSource>) -> Self {
        self.events = Some(source);
        self
    }

    pub fn with_max_payload_len(mut self, max_payload_len: usize) -> Self {
        self.max_payload_len = max_payload_len;
        self
    }

    /// Number of connected clients
    pub fn connections(&self) -> usize {
        self.clients.len()
    }

    /// Serve forever
    pub fn run(&mut self) -> Result<()> {
        loop {
            self.turn(PollTimeout::NONE)?;
        }
    }

    /// Wait up to `timeout` for activity and handle it
    pub fn turn(&mut self, timeout: PollTimeout) -> Result<()> {
        self.desktop.tick();

        let (listener_ready, events_ready, ready) = {
            let mut fds = vec![PollFd::new(self.listener.as_fd(), PollFlags::POLLIN)];
            if let Some(events) = &self.events {
                fds.push(PollFd::new(events.as_fd(), PollFlags::POLLIN));
            }
            let first_client = fds.len();
            let mut slots = Vec::with_capacity(first_client);
            for (slot, client) in self.clients.iter() {
                slots.push(slot);
                fds.push(PollFd::new(client.conn.as_fd(), PollFlags::POLLIN));
            }

            match poll(&mut fds, timeout) {
                Ok(_) => {}
                Err(Errno::EINTR) => return Ok(()),
                Err(e) => return Err(e).context("poll failed"),
            }

            // Hang-ups count as readable: the read reports the close
            let is_ready = |fd: &PollFd| fd.revents().is_some_and(|r| !r.is_empty());
            let ready: Vec<usize> = slots
                .iter()
                .zip(&fds[first_client..])
                .filter(|&(_, fd)| is_ready(fd))
                .map(|(&slot, _)| slot)
                .collect();
            (
                is_ready(&fds[0]),
                self.events.is_some() && is_ready(&fds[1]),
                ready,
            )
        };

        if events_ready {
            self.drain_events();
        }
        for slot in ready {
            self.serve(slot);
        }
        if listener_ready {
            self.accept();
        }
        Ok(())
    }

    fn drain_events(&mut self) {
        let Some(events) = self.events.as_mut() else {
            return;
        };
        if let Err(e) = events.drain() {
            error!("Event source {} failed, no longer polling it: {:#}", events.name(), e);
            self.events = None;
        }
    }

    fn accept(&mut self) {
        match self.listener.accept() {
            Ok((stream, _)) => {
                let conn = Connection::new(stream).with_max_payload_len(self.max_payload_len);
                let slot = self.clients.insert(Client {
                    conn,
                    session: Session::default(),
                });
                info!(slot, connections = self.connections(), "Client connected");
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => warn!("Failed to accept connection: {}", e),
        }
    }

    /// Handle one command from the client in `slot`
    fn serve(&mut self, slot: usize) {
        let Some(client) = self.clients.get_mut(slot) else {
            return;
        };
        let result = serve_command(
            client,
            &self.protocol,
            &self.handlers,
            &self.capabilities,
            &mut self.desktop,
            &mut self.inhibitors,
        );
        if let Err(e) = result {
            if e.downcast_ref::<FrameError>().is_some_and(FrameError::is_closed) {
                debug!(slot, "Client disconnected");
            } else {
                warn!(slot, "Closing client: {:#}", e);
            }
            self.close(slot);
        }
    }

    fn close(&mut self, slot: usize) {
        let Some(mut client) = self.clients.remove(slot) else {
            return;
        };
        if client.session.suspends_screensaver && !self.inhibitors.release(&mut client.session) {
            info!(slot, "Last screensaver hold released");
            self.desktop.set_screensaver_suspended(false);
        }
    }
}

impl<D: Desktop> Drop for Server<D> {
    fn drop(&mut self) {
        if self.inhibitors.active() {
            self.desktop.set_screensaver_suspended(false);
        }
        if let Err(e) = fs::remove_file(&self.socket_path) {
            debug!("Failed to remove socket {:?}: {}", self.socket_path, e);
        }
    }
}

fn serve_command(
    client: &mut Client,
    protocol: &Protocol,
    handlers: &HandlerTable,
    capabilities: &[Code],
    desktop: &mut dyn Desktop,
    inhibitors: &mut Inhibitors,
) -> Result<()> {
    let header = client.conn.read_header()?;
    let Some(op) = protocol.by_command_code(header.code) else {
        bail!(
            "Unexpected code {} (seq {}), stream is out of sync",
            header.code,
            header.sequence
        );
    };
    let args = client.conn.read_command(&op)?;
    debug!(op = op.name(), seq = header.sequence, code = header.code, "command received");

    let reply = match handlers.get(header.code) {
        Some(handler) => {
            let mut ctx = Context {
                desktop,
                session: &mut client.session,
                inhibitors,
                capabilities,
            };
            complete_reply(&op, handler(&mut ctx, &args))
        }
        None => {
            warn!("No handler for {}, replying with defaults", op.name());
            Args::zeroed(op.layout(Role::WriteReply))
        }
    };

    client
        .conn
        .write_reply(&op, header.sequence, &reply)
        .with_context(|| format!("Failed to reply to {}", op.name()))?;
    Ok(())
}

/// Fill reply arguments the handler left out with zero values
fn complete_reply(op: &Operation<'_>, out: Args) -> Args {
    let mut reply = Args::zeroed(op.layout(Role::WriteReply));
    for (name, value) in out.iter() {
        reply.insert(name, value.clone());
    }
    reply
}
