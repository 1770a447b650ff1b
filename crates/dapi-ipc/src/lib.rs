//! DAPI IPC Protocol
//!
//! Schema-driven binary protocol spoken between the desktop API daemon
//! (`dapid`) and its clients (browser plugins and the like).
//!
//! The schema describes each remote function once. From it the crate derives
//! command/reply codes and the record layout of every protocol role, and a
//! single codec reads and writes all of them.

pub mod call;
pub mod client;
pub mod codec;
pub mod connection;
pub mod parser;
pub mod protocol;
pub mod schema;
pub mod views;
pub mod wire;

pub use call::{CallError, CallReply};
pub use client::{DesktopClient, Mail};
pub use codec::{Args, EncodeError, Value};
pub use connection::{Connection, SyncCallback};
pub use parser::{SchemaError, SchemaErrorKind};
pub use protocol::{Code, Operation, Protocol, RecordLayout, Role, Sequence};
pub use schema::{Arg, ArgType, Function, Schema};
pub use wire::{FrameError, Header};

/// Schema of the desktop API spoken by `dapid`
pub const BUILTIN_SCHEMA: &str = include_str!("dapi.schema");

/// Environment variable overriding the socket location
pub const SOCKET_ENV: &str = "DAPI_SOCKET";

/// Socket path for IPC communication
pub fn socket_path() -> std::path::PathBuf {
    if let Ok(path) = std::env::var(SOCKET_ENV) {
        return std::path::PathBuf::from(path);
    }
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .unwrap_or_else(|_| format!("/run/user/{}", unsafe { libc::getuid() }));
    std::path::PathBuf::from(runtime_dir).join("dapi.sock")
}
