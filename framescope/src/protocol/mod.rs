//! Dump/restore wire protocol
//!
//! [`dump`] turns a halted [`Capture`](crate::Capture) into a self-contained
//! little-endian blob, [`restore`] turns a blob back into a read-only
//! [`CaptureSnapshot`](crate::snapshot::CaptureSnapshot), and [`transport`]
//! moves blobs across a byte link.

pub(crate) mod dump;
mod restore;
pub mod transport;

pub use restore::restore;
pub use transport::{byte_channel, read_blob, request_dump, write_blob, ByteReceiver, ByteSender, DumpService};
