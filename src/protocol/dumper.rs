//! Debug tee for offline packet replay.
//!
//! When `EXPENSIVE_DEBUG_LOGGING` is set, each tunnel decorates its reader
//! and writer with a dumper that records every plaintext byte passing
//! through. Bytes are written out as one hex line per packet so the packet
//! boundaries survive into the dump.

use std::{
    fmt::Write as _,
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

pub struct StreamDumper {
    out: BufWriter<File>,
    pending: Vec<u8>,
}

impl StreamDumper {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self {
            out: BufWriter::new(File::create(path)?),
            pending: Vec::new(),
        })
    }

    /// Buffers bytes until the next packet boundary.
    pub fn record(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Marks a packet boundary, emitting the buffered bytes as one hex line.
    pub fn packet_finished(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut line = String::with_capacity(self.pending.len() * 2);
        for byte in &self.pending {
            let _ = write!(line, "{byte:02x}");
        }
        self.pending.clear();
        writeln!(self.out, "{line}")
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

impl Drop for StreamDumper {
    fn drop(&mut self) {
        self.packet_finished().ok();
        self.out.flush().ok();
    }
}
