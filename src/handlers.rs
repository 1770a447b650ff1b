//! Command handlers
//!
//! Each handler receives the decoded command arguments and returns the reply
//! arguments. Handlers never fail: a refusal is reported through the reply.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;

use anyhow::{Result, bail};
use dapi_ipc::{Args, Code, Mail, Protocol, Value};
use tracing::{debug, info, warn};

use crate::desktop::{Desktop, files};

/// Per-connection state
#[derive(Debug, Default)]
pub struct Session {
    /// This connection asked for the screensaver to be suspended
    pub suspends_screensaver: bool,
}

/// Connections currently keeping the screensaver suspended
#[derive(Debug, Default)]
pub struct Inhibitors {
    count: usize,
}

impl Inhibitors {
    /// Apply a request from `session`; returns whether the screensaver
    /// should now be suspended
    pub fn update(&mut self, session: &mut Session, suspend: bool) -> bool {
        if session.suspends_screensaver != suspend {
            session.suspends_screensaver = suspend;
            if suspend {
                self.count += 1;
            } else {
                self.count = self.count.saturating_sub(1);
            }
        }
        self.active()
    }

    /// Drop whatever `session` held
    pub fn release(&mut self, session: &mut Session) -> bool {
        self.update(session, false)
    }

    pub fn active(&self) -> bool {
        self.count > 0
    }
}

/// Everything a handler may touch
pub struct Context<'a> {
    pub desktop: &'a mut dyn Desktop,
    pub session: &'a mut Session,
    pub inhibitors: &'a mut Inhibitors,
    /// Command codes with a handler, ascending
    pub capabilities: &'a [Code],
}

pub type Handler = fn(&mut Context<'_>, &Args) -> Args;

/// Handlers keyed by command code
#[derive(Default)]
pub struct HandlerTable {
    handlers: BTreeMap<Code, Handler>,
}

/// Functions the daemon implements. `ExecuteUrl` and `RunAsUser` are left
/// out and therefore never advertised.
pub(crate) const STANDARD: &[(&str, Handler)] = &[
    ("Init", init),
    ("Capabilities", capabilities),
    ("OpenUrl", open_url),
    ("ButtonOrder", button_order),
    ("SuspendScreensaving", suspend_screensaving),
    ("MailTo", mail_to),
    ("LocalFile", local_file),
    ("UploadFile", upload_file),
    ("RemoveTemporaryLocalFile", remove_temporary_local_file),
];

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding every handler the daemon ships
    pub fn standard(protocol: &Protocol) -> Result<Self> {
        let mut table = Self::new();
        for &(name, handler) in STANDARD {
            table.register(protocol, name, handler)?;
        }
        Ok(table)
    }

    pub fn register(
        &mut self,
        protocol: &Protocol,
        name: &str,
        handler: Handler,
    ) -> Result<()> {
        let Some(op) = protocol.operation(name) else {
            bail!("No function `{}` in the protocol schema", name);
        };
        debug!("Registered handler for {} (code {})", name, op.command_code);
        self.handlers.insert(op.command_code, handler);
        Ok(())
    }

    pub fn get(&self, code: Code) -> Option<Handler> {
        self.handlers.get(&code).copied()
    }

    /// Command codes with a handler, ascending
    pub fn capabilities(&self) -> Vec<Code> {
        self.handlers.keys().copied().collect()
    }
}

fn init(_ctx: &mut Context<'_>, _args: &Args) -> Args {
    info!("Client initialized");
    Args::new().with("ok", true)
}

fn capabilities(ctx: &mut Context<'_>, _args: &Args) -> Args {
    Args::new()
        .with("capabilities", ctx.capabilities.to_vec())
        .with("ok", true)
}

fn open_url(ctx: &mut Context<'_>, args: &Args) -> Args {
    let url = args.bytes("url").unwrap_or_default();
    info!("OpenUrl: {}", String::from_utf8_lossy(url));
    let ok = !url.is_empty() && ctx.desktop.open_url(OsStr::from_bytes(url));
    Args::new().with("ok", ok)
}

fn button_order(ctx: &mut Context<'_>, _args: &Args) -> Args {
    Args::new().with("order", ctx.desktop.button_order())
}

fn suspend_screensaving(ctx: &mut Context<'_>, args: &Args) -> Args {
    let suspend = args.bool("suspend").unwrap_or(false);
    let suspended = ctx.inhibitors.update(ctx.session, suspend);
    info!("SuspendScreensaving: {} (session suspended: {})", suspend, suspended);
    let ok = ctx.desktop.set_screensaver_suspended(suspended);
    Args::new().with("ok", ok)
}

fn mail_to(ctx: &mut Context<'_>, args: &Args) -> Args {
    let text = |name: &str| args.lossy(name).unwrap_or_default().into_owned();
    let mail = Mail {
        subject: text("subject"),
        body: text("body"),
        to: text("to"),
        cc: text("cc"),
        bcc: text("bcc"),
        attachments: args.string_list("attachments").unwrap_or_default(),
    };
    info!("MailTo: {}", mail.to);
    let ok = ctx.desktop.mail_to(&mail);
    Args::new().with("ok", ok)
}

fn local_file(_ctx: &mut Context<'_>, args: &Args) -> Args {
    let file = args.bytes("file").unwrap_or_default();
    let result = files::local_path(file).unwrap_or_default();
    if result.is_empty() && args.bool("allow_download") == Some(true) {
        warn!(
            "LocalFile: downloading {} is not supported",
            String::from_utf8_lossy(file)
        );
    }
    Args::new().with("result", Value::bytes(result))
}

fn upload_file(_ctx: &mut Context<'_>, args: &Args) -> Args {
    let local = args.bytes("local").unwrap_or_default();
    let file = args.bytes("file").unwrap_or_default();
    let ok = files::is_same_file(local, file);
    if !ok {
        warn!(
            "UploadFile: cannot upload {} to {}",
            String::from_utf8_lossy(local),
            String::from_utf8_lossy(file)
        );
    }
    Args::new().with("ok", ok)
}

/// Only local files are ever handed out, so there is nothing to remove
fn remove_temporary_local_file(_ctx: &mut Context<'_>, _args: &Args) -> Args {
    Args::new().with("ok", true)
}
