//! Blocking calls.
//!
//! A call writes one command and then reads frames until the reply carrying
//! its sequence number arrives. Anything else arriving meanwhile is handed to
//! the connection's sync callback.
//!
//! There is no timeout: a peer that never answers blocks the caller until the
//! connection closes.

use std::io::{Read, Write};

use tracing::debug;

use crate::codec::{Args, EncodeError, Value};
use crate::connection::Connection;
use crate::protocol::{Code, Operation, Role, Sequence};
use crate::schema::ArgType;
use crate::wire::FrameError;

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("failed to send command: {0}")]
    Encode(#[from] EncodeError),
    #[error("failed to read reply: {0}")]
    Frame(#[from] FrameError),
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
}

/// Decoded reply of a blocking call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallReply {
    /// The `RETURN` argument. An empty string counts as no value. Functions
    /// without a `RETURN` argument report `Bool(true)` on success.
    pub value: Option<Value>,
    /// Every reply argument as received, including the return argument
    pub outputs: Args,
}

impl<S: Read + Write> Connection<S> {
    /// Call `op` with `inputs` and wait for its reply.
    ///
    /// `inputs` must hold every argument of the call's input view.
    ///
    /// # Panics
    ///
    /// Panics if no sync callback is registered; unrelated frames could
    /// otherwise not be delivered anywhere.
    pub fn call(&mut self, op: &Operation<'_>, inputs: &Args) -> Result<CallReply, CallError> {
        if !self.has_sync_callback() {
            panic!("DAPI sync callback not set on connection");
        }

        let sequence = self.write_command(op, inputs)?;

        loop {
            let header = self.read_header()?;
            if header.sequence == sequence && header.code == op.code(Role::WriteReply) {
                break;
            }
            debug!(
                op = op.name(),
                seq = header.sequence,
                code = header.code,
                "routing unrelated frame to sync callback"
            );
            self.dispatch_unrelated(header.code, header.sequence);
            if let Some(error) = self.take_failure() {
                return Err(CallError::Frame(error));
            }
        }

        let outputs = self.read_reply(op)?;
        let value = match op.function().return_arg() {
            Some(ret) => match outputs.get(&ret.name) {
                Some(Value::String(s)) if ret.ty == ArgType::String && s.is_empty() => None,
                other => other.cloned(),
            },
            None => Some(Value::Bool(true)),
        };
        Ok(CallReply { value, outputs })
    }

    fn dispatch_unrelated(&mut self, code: Code, sequence: Sequence) {
        let Some(mut callback) = self.sync_callback.take() else {
            return;
        };
        callback(self, code, sequence);
        // The callback may have installed a replacement
        if self.sync_callback.is_none() {
            self.sync_callback = Some(callback);
        }
    }
}
