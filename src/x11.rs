//! X11 display connection
//!
//! The daemon keeps one connection to the X server: its socket is polled
//! alongside the clients so pending events are drained, and DPMS requests
//! implement screensaver suspension.

use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::io::AsRawFd;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, trace};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::dpms::{self, ConnectionExt as _};
use x11rb::rust_connection::RustConnection;

use crate::server::EventSource;

/// Connection to the X server
pub struct X11Display {
    conn: Arc<RustConnection>,
}

impl X11Display {
    /// Connect to `$DISPLAY`
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X server")?;
        info!("Connected to X server, screen {}", screen_num);
        Ok(Self {
            conn: Arc::new(conn),
        })
    }

    /// Screensaver control sharing this connection
    pub fn dpms(&self) -> Dpms {
        Dpms {
            conn: self.conn.clone(),
        }
    }
}

impl AsFd for X11Display {
    fn as_fd(&self) -> BorrowedFd<'_> {
        // SAFETY: the descriptor belongs to the connection owned by `self`
        unsafe { BorrowedFd::borrow_raw(self.conn.stream().as_raw_fd()) }
    }
}

impl EventSource for X11Display {
    fn name(&self) -> &str {
        "x11"
    }

    /// Non-blocking: drains every event already buffered or readable
    fn drain(&mut self) -> Result<()> {
        while let Some(event) = self
            .conn
            .poll_for_event()
            .context("X11 connection lost")?
        {
            trace!("X11 event: {:?}", event);
        }
        Ok(())
    }
}

/// DPMS based screensaver control
pub struct Dpms {
    conn: Arc<RustConnection>,
}

impl Dpms {
    /// Disable (`suspended`) or re-enable DPMS.
    ///
    /// Returns `false` when the server lacks the extension or is not DPMS
    /// capable.
    pub fn set_suspended(&self, suspended: bool) -> Result<bool> {
        if self
            .conn
            .extension_information(dpms::X11_EXTENSION_NAME)?
            .is_none()
        {
            debug!("X server has no DPMS extension");
            return Ok(false);
        }
        if !self.conn.dpms_capable()?.reply()?.capable {
            debug!("X server is not DPMS capable");
            return Ok(false);
        }

        if suspended {
            self.conn.dpms_disable()?.check()?;
        } else {
            self.conn.dpms_enable()?.check()?;
        }
        self.conn.flush()?;
        info!("DPMS {}", if suspended { "disabled" } else { "enabled" });
        Ok(true)
    }
}
