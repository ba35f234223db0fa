//! Moving blobs between the producer and the viewer
//!
//! A blob travels as a 4-byte little-endian length followed by the payload.
//! The link underneath is anything byte-oriented: a USB bulk pipe, a file, a
//! socket, or the in-process [`byte_channel`]. Readers pull the payload in
//! [`CHUNK_SIZE`] pieces, the bulk packet size of the vendor interface.
//!
//! The producer side runs a [`DumpService`]. A `CMD_REQUEST_DUMP` byte from
//! the host resets the capture; once it halts, the next `poll` ships it.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use scroll::{IOwrite, LE};

use framescope_common::{CMD_REQUEST_DUMP, LENGTH_PREFIX_SIZE};

use crate::capture::Capture;
use crate::domain::{DumpError, TransportError};

/// Bulk packet size; reads and channel sends happen in pieces this big
pub const CHUNK_SIZE: usize = 64;

/// Largest blob a reader accepts unless told otherwise
pub const DEFAULT_MAX_BLOB_SIZE: usize = 256 * 1024 * 1024;

/// Write `payload` with its length prefix.
///
/// # Errors
/// [`TransportError::TooLarge`] if the length does not fit the prefix, or
/// the underlying I/O error.
pub fn write_blob<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), TransportError> {
    let len = u32::try_from(payload.len())
        .map_err(|_| TransportError::TooLarge(payload.len(), u32::MAX as usize))?;
    writer.iowrite_with(len, LE)?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Read one length-prefixed blob.
///
/// # Errors
/// [`TransportError::TooLarge`] if the announced length exceeds `max_len`,
/// [`TransportError::Truncated`] if the link closes early.
pub fn read_blob<R: Read>(reader: &mut R, max_len: usize) -> Result<Vec<u8>, TransportError> {
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    let received = read_chunked(reader, &mut prefix)?;
    if received < LENGTH_PREFIX_SIZE {
        return Err(TransportError::Truncated { expected: LENGTH_PREFIX_SIZE, received });
    }

    let len = u32::from_le_bytes(prefix) as usize;
    if len > max_len {
        return Err(TransportError::TooLarge(len, max_len));
    }

    let mut payload = vec![0u8; len];
    let received = read_chunked(reader, &mut payload)?;
    if received < len {
        return Err(TransportError::Truncated { expected: len, received });
    }
    log::debug!("received blob of {len} bytes");
    Ok(payload)
}

/// Fill `buf` one chunk at a time; returns how much arrived before EOF.
fn read_chunked<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let end = (filled + CHUNK_SIZE).min(buf.len());
        match reader.read(&mut buf[filled..end]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

/// Host side: ask the producer to start a fresh capture and send it.
///
/// # Errors
/// The underlying I/O error.
pub fn request_dump<W: Write>(commands: &mut W) -> Result<(), TransportError> {
    commands.write_all(&[CMD_REQUEST_DUMP])?;
    commands.flush()?;
    Ok(())
}

/// Producer-side dump task
#[derive(Debug)]
pub struct DumpService {
    capture: Arc<Capture>,
    requested: AtomicBool,
}

impl DumpService {
    #[must_use]
    pub fn new(capture: Arc<Capture>) -> Self {
        Self { capture, requested: AtomicBool::new(false) }
    }

    #[must_use]
    pub fn capture(&self) -> &Arc<Capture> {
        &self.capture
    }

    /// A dump has been requested and not shipped yet
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Act on one command byte from the host. Unknown commands are ignored.
    pub fn handle_command(&self, command: u8) {
        if command == CMD_REQUEST_DUMP {
            self.capture.reset();
            self.requested.store(true, Ordering::Release);
            log::info!("dump requested, capture reset");
        } else {
            log::debug!("ignoring unknown command {command:#04x}");
        }
    }

    /// Ship the capture if one was requested and it has halted.
    ///
    /// Returns whether a blob was written.
    ///
    /// # Errors
    /// The underlying I/O error, or [`TransportError::Dump`] if the capture
    /// cannot be encoded. Either way the request and the dump stay pending,
    /// and the next `poll` tries again.
    pub fn poll<W: Write>(&self, writer: &mut W) -> Result<bool, TransportError> {
        if !self.is_requested() || !self.capture.dump_ready() {
            return Ok(false);
        }
        let shipped = self.capture.try_dump_with(|blob| {
            write_blob(writer, &blob)?;
            Ok::<_, TransportError>(blob.len())
        });
        match shipped {
            Ok(len) => {
                self.requested.store(false, Ordering::Release);
                log::info!("shipped {len} byte capture");
                Ok(true)
            }
            Err(TransportError::Dump(DumpError::NotHalted | DumpError::AlreadyDumped)) => Ok(false),
            Err(err) => {
                log::warn!("capture not shipped, will retry: {err}");
                Err(err)
            }
        }
    }
}

/// Connected in-process byte pipe
#[must_use]
pub fn byte_channel() -> (ByteSender, ByteReceiver) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (ByteSender { tx }, ByteReceiver { rx, packet: Vec::new(), pos: 0 })
}

/// Write half of [`byte_channel`]; dropping it signals EOF
#[derive(Debug, Clone)]
pub struct ByteSender {
    tx: Sender<Vec<u8>>,
}

impl Write for ByteSender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for packet in buf.chunks(CHUNK_SIZE) {
            self.tx
                .send(packet.to_vec())
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "byte channel receiver dropped"))?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Read half of [`byte_channel`]
#[derive(Debug)]
pub struct ByteReceiver {
    rx: Receiver<Vec<u8>>,
    packet: Vec<u8>,
    pos: usize,
}

impl Read for ByteReceiver {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.packet.len() {
            match self.rx.recv() {
                Ok(packet) => {
                    self.packet = packet;
                    self.pos = 0;
                }
                // All senders gone
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.packet.len() - self.pos);
        buf[..n].copy_from_slice(&self.packet[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;

    fn small_config() -> Configuration {
        Configuration {
            max_threads: 1,
            max_call_stack_depth: 4,
            max_entries_per_thread: 16,
            max_frames: 1,
            max_regions: 4,
        }
    }

    #[test]
    fn test_blob_round_trip_over_channel() {
        let (mut tx, mut rx) = byte_channel();
        let payload: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        write_blob(&mut tx, &payload).unwrap();
        assert_eq!(read_blob(&mut rx, DEFAULT_MAX_BLOB_SIZE).unwrap(), payload);
    }

    #[test]
    fn test_prefix_is_little_endian_length() {
        let mut out = Vec::new();
        write_blob(&mut out, b"abc").unwrap();
        assert_eq!(out, [3, 0, 0, 0, b'a', b'b', b'c']);
    }

    #[test]
    fn test_oversized_blob_rejected() {
        let mut out = Vec::new();
        write_blob(&mut out, &[0u8; 100]).unwrap();
        let err = read_blob(&mut out.as_slice(), 10).unwrap_err();
        assert!(matches!(err, TransportError::TooLarge(100, 10)));
    }

    #[test]
    fn test_early_eof_is_truncation() {
        let mut out = Vec::new();
        write_blob(&mut out, &[7u8; 200]).unwrap();
        out.truncate(150);
        let err = read_blob(&mut out.as_slice(), DEFAULT_MAX_BLOB_SIZE).unwrap_err();
        assert!(matches!(err, TransportError::Truncated { expected: 200, received: 146 }));

        let err = read_blob(&mut [1u8, 0].as_slice(), DEFAULT_MAX_BLOB_SIZE).unwrap_err();
        assert!(matches!(err, TransportError::Truncated { expected: 4, received: 2 }));
    }

    #[test]
    fn test_dropped_sender_reads_as_eof() {
        let (tx, mut rx) = byte_channel();
        drop(tx);
        let mut buf = [0u8; 8];
        assert_eq!(rx.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_service_ships_once_after_request() {
        let capture = Arc::new(Capture::new(small_config()).unwrap());
        let service = DumpService::new(Arc::clone(&capture));
        let mut out = Vec::new();

        capture.request_pause();
        assert!(!service.poll(&mut out).unwrap(), "nothing was requested");

        service.handle_command(CMD_REQUEST_DUMP);
        assert!(!capture.is_halted());
        assert!(!service.poll(&mut out).unwrap(), "capture still armed");

        capture.begin_frame();
        assert!(service.poll(&mut out).unwrap());
        assert!(!service.is_requested());
        assert!(!service.poll(&mut out).unwrap());

        let blob = read_blob(&mut out.as_slice(), DEFAULT_MAX_BLOB_SIZE).unwrap();
        let snapshot = crate::protocol::restore(&blob).unwrap();
        assert_eq!(snapshot.frames.len(), 1);
    }

    /// Fails the first write, like a stalled bulk endpoint, then accepts everything
    #[derive(Default)]
    struct StallOnceWriter {
        stalled: bool,
        written: Vec<u8>,
    }

    impl Write for StallOnceWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if !self.stalled {
                self.stalled = true;
                return Err(io::Error::new(io::ErrorKind::TimedOut, "bulk endpoint stalled"));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_write_is_retried_on_next_poll() {
        let capture = Arc::new(Capture::new(small_config()).unwrap());
        let service = DumpService::new(Arc::clone(&capture));
        service.handle_command(CMD_REQUEST_DUMP);
        capture.enter_section("tick", 0, "f", 1);
        capture.request_pause();

        let mut link = StallOnceWriter::default();
        let err = service.poll(&mut link).unwrap_err();
        assert!(matches!(err, TransportError::Io(ref e) if e.kind() == io::ErrorKind::TimedOut));
        assert!(service.is_requested());
        assert!(capture.dump_ready());

        assert!(service.poll(&mut link).unwrap());
        assert!(!service.is_requested());
        assert!(!capture.dump_ready());

        let blob = read_blob(&mut link.written.as_slice(), DEFAULT_MAX_BLOB_SIZE).unwrap();
        let snapshot = crate::protocol::restore(&blob).unwrap();
        assert_eq!(&*snapshot.threads[0].entries[0].section, "tick");
    }

    #[test]
    fn test_unknown_command_ignored() {
        let capture = Arc::new(Capture::new(small_config()).unwrap());
        capture.request_pause();
        let service = DumpService::new(Arc::clone(&capture));
        service.handle_command(0x7F);
        assert!(capture.is_halted());
        assert!(!service.is_requested());
    }
}
