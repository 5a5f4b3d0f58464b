//! Deadline-bounded TCP client speaking the emulator's line protocol.
//!
//! Outbound messages are terminated by a single `'\n'`. Replies are framed by
//! [`TERMINATOR`] (three CRLF pairs), which is not part of the returned payload.
//!
//! Each operation carries its own deadline. The socket timeouts are recomputed from the
//! remaining time before every partial read or write, so a trickling peer cannot stretch an
//! operation past its deadline. When a deadline expires the socket is shut down and
//! dropped: the pending call returns an error and every later call on the same client
//! fails immediately with [`io::ErrorKind::NotConnected`].

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, trace, warn};

use crate::endpoint::Endpoint;
use crate::error::TransportError;

/// Reply frame delimiter.
pub const TERMINATOR: &[u8] = b"\r\n\r\n\r\n";

const READ_CHUNK: usize = 4096;

/// One TCP connection to a master or worker endpoint.
///
/// All operations take `&mut self`, so at most one request is ever in flight. The client
/// is not meant to be shared: create one per connection and drop it at episode end.
#[derive(Debug)]
pub struct Client {
    endpoint: Endpoint,
    stream: Option<TcpStream>,
    // bytes received after the last returned frame
    pending: Vec<u8>,
}

impl Client {
    /// Default deadline for [`Client::connect`].
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    /// Default deadline for [`Client::send`]. Sends rarely stall.
    pub const SEND_TIMEOUT: Duration = Duration::from_secs(60);
    /// Default deadline for [`Client::receive`].
    pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(10);

    /// Resolve `endpoint` and open a connection, giving up after `timeout`.
    ///
    /// # Errors
    /// [`TransportError::Connect`] when resolution fails, every resolved address refuses,
    /// or the deadline expires first.
    #[instrument(skip_all, fields(%endpoint))]
    pub fn connect(endpoint: &Endpoint, timeout: Duration) -> Result<Client, TransportError> {
        let connect_error = |source| TransportError::Connect {
            endpoint: endpoint.clone(),
            source,
        };
        let deadline = Instant::now() + timeout;

        let addrs = resolve(endpoint, timeout).map_err(connect_error)?;

        let mut last_error = io::Error::new(io::ErrorKind::NotFound, "no address resolved");
        for addr in addrs {
            let remaining = remaining(deadline).map_err(connect_error)?;
            trace!(%addr, ?remaining, "trying address");
            match TcpStream::connect_timeout(&addr, remaining) {
                Ok(stream) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!("could not disable nagle: {e}");
                    }
                    debug!(%addr, "connected");
                    return Ok(Client {
                        endpoint: endpoint.clone(),
                        stream: Some(stream),
                        pending: Vec::new(),
                    });
                }
                Err(e) => {
                    debug!(%addr, "connect attempt failed: {e}");
                    last_error = e;
                }
            }
        }
        Err(connect_error(last_error))
    }

    /// Endpoint this client was connected to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// False once the connection has been closed, by a timeout or explicitly.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Write `message` followed by `'\n'`.
    ///
    /// # Errors
    /// [`TransportError::Write`] if the bytes cannot all be written before `timeout`. The
    /// connection is closed on any write failure.
    #[instrument(skip(self, timeout), fields(endpoint = %self.endpoint))]
    pub fn send(&mut self, message: &str, timeout: Duration) -> Result<(), TransportError> {
        let deadline = Instant::now() + timeout;
        let mut bytes = Vec::with_capacity(message.len() + 1);
        bytes.extend_from_slice(message.as_bytes());
        bytes.push(b'\n');

        self.write_before(&bytes, deadline).map_err(|e| {
            self.close();
            TransportError::Write(e)
        })
    }

    /// Read the next reply frame as UTF-8 text, without its terminator.
    ///
    /// # Errors
    /// [`TransportError::Read`] on timeout, when the peer closes before a terminator, or
    /// when the frame is not UTF-8 (only the last case leaves the connection open).
    #[instrument(skip(self, timeout), fields(endpoint = %self.endpoint))]
    pub fn receive(&mut self, timeout: Duration) -> Result<String, TransportError> {
        let frame = self.receive_bytes(timeout)?;
        String::from_utf8(frame)
            .map_err(|e| TransportError::Read(io::Error::new(io::ErrorKind::InvalidData, e)))
    }

    /// Read the next reply frame as raw bytes, without its terminator.
    ///
    /// Game images are JPEG data, so they go through this instead of [`Client::receive`].
    ///
    /// # Errors
    /// Same as [`Client::receive`]; the connection is closed on every error.
    pub fn receive_bytes(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let deadline = Instant::now() + timeout;
        self.read_frame_before(deadline).map_err(|e| {
            self.close();
            TransportError::Read(e)
        })
    }

    /// [`Client::send`] then [`Client::receive`], each with its own deadline.
    ///
    /// # Errors
    /// Whatever the failing half returns.
    pub fn request(
        &mut self,
        message: &str,
        send_timeout: Duration,
        receive_timeout: Duration,
    ) -> Result<String, TransportError> {
        self.send(message, send_timeout)?;
        self.receive(receive_timeout)
    }

    /// Shut the socket down. Idempotent.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            // the peer may already be gone
            let _ = stream.shutdown(Shutdown::Both);
            debug!(endpoint = %self.endpoint, "connection closed");
        }
        self.pending.clear();
    }

    fn write_before(&mut self, mut buf: &[u8], deadline: Instant) -> io::Result<()> {
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        while !buf.is_empty() {
            stream.set_write_timeout(Some(remaining(deadline)?))?;
            match stream.write(buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "connection closed by server",
                    ))
                }
                Ok(n) => buf = &buf[n..],
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_socket_timeout(&e) => return Err(timed_out()),
                Err(e) => return Err(e),
            }
        }
        stream.flush()
    }

    fn read_frame_before(&mut self, deadline: Instant) -> io::Result<Vec<u8>> {
        let mut scanned = 0;
        loop {
            if let Some(end) = find_terminator(&self.pending, scanned) {
                let mut frame: Vec<u8> = self.pending.drain(..end + TERMINATOR.len()).collect();
                frame.truncate(end);
                trace!(len = frame.len(), "frame received");
                return Ok(frame);
            }
            // a terminator may straddle two chunks
            scanned = self.pending.len().saturating_sub(TERMINATOR.len() - 1);

            let stream = self.stream.as_mut().ok_or_else(not_connected)?;
            stream.set_read_timeout(Some(remaining(deadline)?))?;
            let mut chunk = [0u8; READ_CHUNK];
            match stream.read(&mut chunk) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed before terminator",
                    ))
                }
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_socket_timeout(&e) => return Err(timed_out()),
                Err(e) => return Err(e),
            }
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

/// Resolve on a helper thread so a stuck resolver cannot outlive the connect deadline.
fn resolve(endpoint: &Endpoint, timeout: Duration) -> io::Result<Vec<SocketAddr>> {
    let port: u16 = endpoint.port.trim().parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid port '{}'", endpoint.port),
        )
    })?;
    let host = endpoint.host.clone();
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("smb-resolve".to_string())
        .spawn(move || {
            let result = (host.as_str(), port)
                .to_socket_addrs()
                .map(|addrs| addrs.collect::<Vec<_>>());
            // receiver is gone if the deadline already passed
            let _ = tx.send(result);
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(timed_out()),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(io::Error::new(
            io::ErrorKind::Other,
            "resolver thread died",
        )),
    }
}

fn find_terminator(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .windows(TERMINATOR.len())
        .position(|w| w == TERMINATOR)
        .map(|pos| pos + from)
}

fn remaining(deadline: Instant) -> io::Result<Duration> {
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() {
        Err(timed_out())
    } else {
        Ok(left)
    }
}

// unix reports an expired SO_RCVTIMEO/SO_SNDTIMEO as WouldBlock, windows as TimedOut
fn is_socket_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

fn timed_out() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "deadline expired")
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection is closed")
}
