//! Typed client for the built-in desktop protocol.

use std::ffi::OsString;
use std::io::{Read, Write};
use std::os::unix::ffi::OsStringExt;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

use tracing::warn;

use crate::call::{CallError, CallReply};
use crate::codec::{Args, Value};
use crate::connection::Connection;
use crate::parser::SchemaError;
use crate::protocol::{Code, Protocol, Sequence};
use crate::wire::FrameError;

/// Mail composition request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mail {
    pub subject: String,
    pub body: String,
    pub to: String,
    pub cc: String,
    pub bcc: String,
    pub attachments: Vec<String>,
}

/// Client side of the desktop daemon
pub struct DesktopClient<S = UnixStream> {
    conn: Connection<S>,
    protocol: Protocol,
}

impl<S: Read + Write + 'static> DesktopClient<S> {
    /// Wrap a connection.
    ///
    /// Unless a sync callback is already registered, one is installed that
    /// logs and discards frames nobody waits for. A frame it cannot skip
    /// fails the pending call.
    pub fn new(mut conn: Connection<S>) -> Result<Self, SchemaError> {
        let protocol = Protocol::builtin()?;
        if !conn.has_sync_callback() {
            let skip = protocol.clone();
            conn.set_sync_callback(move |conn, code, seq| discard_frame(&skip, conn, code, seq));
        }
        Ok(Self { conn, protocol })
    }

    pub fn connection(&mut self) -> &mut Connection<S> {
        &mut self.conn
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// Generic blocking call by function name
    pub fn call(&mut self, name: &str, inputs: &Args) -> Result<CallReply, CallError> {
        let op = self
            .protocol
            .operation(name)
            .ok_or_else(|| CallError::UnknownFunction(name.to_string()))?;
        self.conn.call(&op, inputs)
    }

    fn call_bool(&mut self, name: &str, inputs: &Args) -> Result<bool, CallError> {
        let reply = self.call(name, inputs)?;
        Ok(reply.value.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    pub fn init(&mut self) -> Result<bool, CallError> {
        self.call_bool("Init", &Args::new())
    }

    /// Command codes the daemon implements, or `None` if it refused
    pub fn capabilities(&mut self) -> Result<Option<Vec<Code>>, CallError> {
        let mut reply = self.call("Capabilities", &Args::new())?;
        if reply.value.and_then(|v| v.as_bool()) != Some(true) {
            return Ok(None);
        }
        match reply.outputs.remove("capabilities") {
            Some(Value::IntList(codes)) => Ok(Some(codes)),
            _ => Ok(None),
        }
    }

    /// Whether the daemon implements `function`
    pub fn supports(&mut self, function: &str) -> Result<bool, CallError> {
        let Some(code) = self.protocol.operation(function).map(|op| op.command_code) else {
            return Ok(false);
        };
        Ok(self.capabilities()?.is_some_and(|codes| codes.contains(&code)))
    }

    pub fn open_url(&mut self, url: &str, window: i32) -> Result<bool, CallError> {
        self.call_bool("OpenUrl", &Args::new().with("url", url).with("window", window))
    }

    pub fn execute_url(&mut self, url: &str, window: i32) -> Result<bool, CallError> {
        self.call_bool("ExecuteUrl", &Args::new().with("url", url).with("window", window))
    }

    pub fn button_order(&mut self) -> Result<Option<i32>, CallError> {
        let reply = self.call("ButtonOrder", &Args::new())?;
        Ok(reply.value.and_then(|v| v.as_int()))
    }

    pub fn run_as_user(
        &mut self,
        user: &str,
        command: &str,
        window: i32,
    ) -> Result<bool, CallError> {
        let args = Args::new()
            .with("user", user)
            .with("command", command)
            .with("window", window);
        self.call_bool("RunAsUser", &args)
    }

    pub fn suspend_screensaving(&mut self, suspend: bool) -> Result<bool, CallError> {
        self.call_bool("SuspendScreensaving", &Args::new().with("suspend", suspend))
    }

    pub fn mail_to(&mut self, mail: &Mail, window: i32) -> Result<bool, CallError> {
        let args = Args::new()
            .with("subject", mail.subject.as_str())
            .with("body", mail.body.as_str())
            .with("to", mail.to.as_str())
            .with("cc", mail.cc.as_str())
            .with("bcc", mail.bcc.as_str())
            .with("attachments", mail.attachments.clone())
            .with("window", window);
        self.call_bool("MailTo", &args)
    }

    /// Local path for `file`, or `None` if it cannot be made local
    pub fn local_file(
        &mut self,
        file: &str,
        local: &str,
        allow_download: bool,
        window: i32,
    ) -> Result<Option<PathBuf>, CallError> {
        let args = Args::new()
            .with("file", file)
            .with("local", local)
            .with("allow_download", allow_download)
            .with("window", window);
        let reply = self.call("LocalFile", &args)?;
        Ok(match reply.value {
            Some(Value::String(path)) => Some(PathBuf::from(OsString::from_vec(path))),
            _ => None,
        })
    }

    pub fn upload_file(
        &mut self,
        local: &str,
        file: &str,
        remove_local: bool,
        window: i32,
    ) -> Result<bool, CallError> {
        let args = Args::new()
            .with("local", local)
            .with("file", file)
            .with("remove_local", remove_local)
            .with("window", window);
        self.call_bool("UploadFile", &args)
    }

    pub fn remove_temporary_local_file(&mut self, file: &str) -> Result<bool, CallError> {
        self.call_bool("RemoveTemporaryLocalFile", &Args::new().with("file", file))
    }
}

/// Read and drop the body of a frame nobody is waiting for
fn discard_frame<S: Read + Write>(
    protocol: &Protocol,
    conn: &mut Connection<S>,
    code: Code,
    seq: Sequence,
) {
    let result = if let Some(op) = protocol.by_reply_code(code) {
        conn.read_reply(&op).map(|_| op.name())
    } else if let Some(op) = protocol.by_command_code(code) {
        conn.read_command(&op).map(|_| op.name())
    } else {
        warn!(code, seq, "unsolicited frame with unknown code, stream is out of sync");
        conn.mark_failed(FrameError::UnexpectedCode(code));
        return;
    };
    match result {
        Ok(name) => warn!(code, seq, function = name, "discarded unsolicited frame"),
        Err(e) => {
            warn!(code, seq, "failed to skip unsolicited frame: {}", e);
            conn.mark_failed(e);
        }
    }
}
