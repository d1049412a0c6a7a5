//! Typed big-endian writes onto the raw (possibly encrypted) byte stream.

use crate::protocol::dumper::StreamDumper;
use aes::{cipher::generic_array::GenericArray, Aes128};
use cfb8::cipher::{BlockEncryptMut, KeyIvInit};
use std::{io, slice};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Cipher half installed on the write side after the 0xFC upgrade.
pub type StreamEncryptor = cfb8::Encryptor<Aes128>;

/// A typed writer that buffers until [`StreamWriter::flush`].
///
/// Every `write_*` returns the value written so callers can fold
/// "parse, remember, forward" into a single expression. Bytes are
/// encrypted as they are pushed, so a cipher installed mid-stream only
/// affects writes made after the install.
pub struct StreamWriter {
    inner: Box<dyn AsyncWrite + Send + Unpin>,
    buffer: Vec<u8>,
    cipher: Option<StreamEncryptor>,
    dumper: Option<StreamDumper>,
    bytes_written: u64,
}

impl StreamWriter {
    pub fn new(inner: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            cipher: None,
            dumper: None,
            bytes_written: 0,
        }
    }

    pub fn set_dumper(&mut self, dumper: StreamDumper) {
        self.dumper = Some(dumper);
    }

    pub fn dumper_mut(&mut self) -> Option<&mut StreamDumper> {
        self.dumper.as_mut()
    }

    /// Installs the AES/CFB8 encryptor for all bytes written from now on.
    pub fn install_cipher(&mut self, key: [u8; 16]) {
        self.cipher = Some(StreamEncryptor::new(&key.into(), &key.into()));
    }

    /// Total plaintext bytes accepted so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Bytes buffered but not yet flushed.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn push(&mut self, bytes: &[u8]) {
        self.bytes_written += bytes.len() as u64;
        if let Some(dumper) = &mut self.dumper {
            dumper.record(bytes);
        }
        let start = self.buffer.len();
        self.buffer.extend_from_slice(bytes);
        if let Some(cipher) = &mut self.cipher {
            for byte in &mut self.buffer[start..] {
                cipher.encrypt_block_mut(GenericArray::from_mut_slice(slice::from_mut(byte)));
            }
        }
    }

    pub fn write_u8(&mut self, x: u8) -> u8 {
        self.push(&[x]);
        x
    }

    pub fn write_i8(&mut self, x: i8) -> i8 {
        self.push(&[bytemuck::cast(x)]);
        x
    }

    pub fn write_i16(&mut self, x: i16) -> i16 {
        self.push(&x.to_be_bytes());
        x
    }

    pub fn write_u16(&mut self, x: u16) -> u16 {
        self.push(&x.to_be_bytes());
        x
    }

    pub fn write_i32(&mut self, x: i32) -> i32 {
        self.push(&x.to_be_bytes());
        x
    }

    pub fn write_i64(&mut self, x: i64) -> i64 {
        self.push(&x.to_be_bytes());
        x
    }

    pub fn write_f32(&mut self, x: f32) -> f32 {
        self.push(&x.to_be_bytes());
        x
    }

    pub fn write_f64(&mut self, x: f64) -> f64 {
        self.push(&x.to_be_bytes());
        x
    }

    pub fn write_bool(&mut self, x: bool) -> bool {
        self.push(&[u8::from(x)]);
        x
    }

    /// Writes raw bytes without any length prefix.
    pub fn write_slice(&mut self, bytes: &[u8]) {
        self.push(bytes);
    }

    /// Writes a UTF-16 string prefixed with its 16-bit code-unit count.
    pub fn write_utf16<'a>(&mut self, x: &'a str) -> &'a str {
        let count = x.encode_utf16().count() as u16;
        self.write_u16(count);
        for unit in x.encode_utf16() {
            self.push(&unit.to_be_bytes());
        }
        x
    }

    /// Writes a little-endian base-128 variable-length integer.
    pub fn write_var_long(&mut self, x: u64) -> u64 {
        let mut rest = x;
        loop {
            let mut group = (rest & 0x7F) as u8;
            rest >>= 7;
            if rest != 0 {
                group |= 0x80;
            }
            self.push(&[group]);
            if rest == 0 {
                break x;
            }
        }
    }

    /// Flushes all buffered bytes to the underlying stream.
    pub async fn flush(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            self.inner.write_all(&self.buffer).await?;
            self.buffer.clear();
        }
        self.inner.flush().await
    }
}
