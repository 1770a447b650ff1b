//! A peer connection speaking the frame protocol.

use std::io::{Read, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::path::Path;

use tracing::trace;

use crate::codec::{self, Args, EncodeError};
use crate::protocol::{Code, Operation, Role, Sequence};
use crate::wire::{self, FrameError, Header};

/// Receives frames that arrive while a blocking call waits for its own reply.
///
/// The callback owns the frame body: it must consume it from the connection
/// (for instance by answering the command) before returning. If it cannot,
/// it reports the stream as broken with [`Connection::mark_failed`].
pub type SyncCallback<S> = Box<dyn FnMut(&mut Connection<S>, Code, Sequence)>;

pub struct Connection<S = UnixStream> {
    stream: S,
    last_sequence: Sequence,
    max_payload_len: usize,
    pub(crate) sync_callback: Option<SyncCallback<S>>,
    failure: Option<FrameError>,
}

impl Connection<UnixStream> {
    /// Connect to a daemon listening on `path`
    pub fn connect(path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self::new(UnixStream::connect(path)?))
    }
}

impl<S> Connection<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            last_sequence: 0,
            max_payload_len: wire::DEFAULT_MAX_PAYLOAD_LEN,
            sync_callback: None,
            failure: None,
        }
    }

    /// Limit for any single string or list received on this connection
    pub fn with_max_payload_len(mut self, max_payload_len: usize) -> Self {
        self.max_payload_len = max_payload_len;
        self
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    pub fn set_sync_callback(
        &mut self,
        callback: impl FnMut(&mut Connection<S>, Code, Sequence) + 'static,
    ) {
        self.sync_callback = Some(Box::new(callback));
    }

    pub fn clear_sync_callback(&mut self) {
        self.sync_callback = None;
    }

    pub fn has_sync_callback(&self) -> bool {
        self.sync_callback.is_some()
    }

    /// Record that the stream lost framing; the pending call fails with
    /// `error` once the sync callback returns
    pub fn mark_failed(&mut self, error: FrameError) {
        self.failure.get_or_insert(error);
    }

    pub(crate) fn take_failure(&mut self) -> Option<FrameError> {
        self.failure.take()
    }

    /// Sequence number for the next command; never 0
    fn next_sequence(&mut self) -> Sequence {
        self.last_sequence = match self.last_sequence.checked_add(1) {
            Some(next) if next > 0 => next,
            _ => 1,
        };
        self.last_sequence
    }
}

impl<S: Read + Write> Connection<S> {
    /// Read the next frame header
    pub fn read_header(&mut self) -> Result<Header, FrameError> {
        Header::read_from(&mut self.stream)
    }

    /// Read the body of a command for `op`, after its header
    pub fn read_command(&mut self, op: &Operation<'_>) -> Result<Args, FrameError> {
        codec::decode_body(
            &mut self.stream,
            op.layout(Role::ReadCommand),
            self.max_payload_len,
        )
    }

    /// Read the body of a reply for `op`, after its header
    pub fn read_reply(&mut self, op: &Operation<'_>) -> Result<Args, FrameError> {
        codec::decode_body(
            &mut self.stream,
            op.layout(Role::ReadReply),
            self.max_payload_len,
        )
    }

    /// Send a command, returning the sequence number its reply will carry
    pub fn write_command(
        &mut self,
        op: &Operation<'_>,
        args: &Args,
    ) -> Result<Sequence, EncodeError> {
        let sequence = self.next_sequence();
        let header = Header::new(op.code(Role::WriteCommand), sequence);
        let frame = codec::encode_frame(header, op.layout(Role::WriteCommand), args)?;
        self.stream.write_all(&frame)?;
        trace!(op = op.name(), seq = sequence, len = frame.len(), "command written");
        Ok(sequence)
    }

    /// Answer the command that carried `sequence`
    pub fn write_reply(
        &mut self,
        op: &Operation<'_>,
        sequence: Sequence,
        args: &Args,
    ) -> Result<(), EncodeError> {
        let header = Header::new(op.code(Role::WriteReply), sequence);
        let frame = codec::encode_frame(header, op.layout(Role::WriteReply), args)?;
        self.stream.write_all(&frame)?;
        trace!(op = op.name(), seq = sequence, len = frame.len(), "reply written");
        Ok(())
    }
}

impl<S: AsFd> AsFd for Connection<S> {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.stream.as_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Protocol;

    const SCHEMA: &str = "
FUNCTION SuspendScreensaving
  ARG suspend
    TYPE bool
  ENDARG
  ARG ok
    TYPE bool
    RETURN
  ENDARG
ENDFUNCTION
";

    #[test]
    fn test_sequences_start_at_one_and_increase() {
        let protocol = Protocol::parse(SCHEMA).unwrap();
        let op = protocol.operation("SuspendScreensaving").unwrap();
        let (client, _server) = UnixStream::pair().unwrap();
        let mut conn = Connection::new(client);

        let args = Args::new().with("suspend", true);
        assert_eq!(conn.write_command(&op, &args).unwrap(), 1);
        assert_eq!(conn.write_command(&op, &args).unwrap(), 2);
    }

    #[test]
    fn test_sequence_wraps_past_zero() {
        let (client, _server) = UnixStream::pair().unwrap();
        let mut conn = Connection::new(client);
        conn.last_sequence = i32::MAX;
        assert_eq!(conn.next_sequence(), 1);
    }

    #[test]
    fn test_command_and_reply_over_socket() {
        let protocol = Protocol::parse(SCHEMA).unwrap();
        let op = protocol.operation("SuspendScreensaving").unwrap();
        let (client, server) = UnixStream::pair().unwrap();
        let mut client = Connection::new(client);
        let mut server = Connection::new(server);

        let seq = client
            .write_command(&op, &Args::new().with("suspend", true))
            .unwrap();

        let header = server.read_header().unwrap();
        assert_eq!(header.code, op.command_code);
        assert_eq!(header.sequence, seq);
        let args = server.read_command(&op).unwrap();
        assert_eq!(args.bool("suspend"), Some(true));
        server
            .write_reply(&op, header.sequence, &Args::new().with("ok", true))
            .unwrap();

        let header = client.read_header().unwrap();
        assert_eq!(header, Header::new(op.reply_code, seq));
        assert_eq!(client.read_reply(&op).unwrap().bool("ok"), Some(true));
    }

    #[test]
    fn test_first_failure_is_kept() {
        let (client, _server) = UnixStream::pair().unwrap();
        let mut conn = Connection::new(client);
        conn.mark_failed(FrameError::UnexpectedCode(999));
        conn.mark_failed(FrameError::Closed);
        assert!(matches!(conn.take_failure(), Some(FrameError::UnexpectedCode(999))));
        assert!(conn.take_failure().is_none());
    }

    #[test]
    fn test_peer_close_is_closed_error() {
        let (client, server) = UnixStream::pair().unwrap();
        drop(server);
        let mut conn = Connection::new(client);
        assert!(conn.read_header().unwrap_err().is_closed());
    }

    #[test]
    fn test_payload_limit_applies_to_reads() {
        let protocol = Protocol::parse(
            "FUNCTION Echo\nARG text\nTYPE string\nENDARG\nENDFUNCTION\n",
        )
        .unwrap();
        let op = protocol.operation("Echo").unwrap();
        let (client, server) = UnixStream::pair().unwrap();
        let mut client = Connection::new(client);
        let mut server = Connection::new(server).with_max_payload_len(4);

        client
            .write_command(&op, &Args::new().with("text", "too long"))
            .unwrap();
        server.read_header().unwrap();
        assert!(matches!(
            server.read_command(&op),
            Err(FrameError::TooLarge { len: 8, limit: 4, .. })
        ));
    }
}
