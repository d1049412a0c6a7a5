//! Buffered typed reads over the raw (possibly encrypted) byte stream.

use crate::protocol::dumper::StreamDumper;
use aes::{cipher::generic_array::GenericArray, Aes128};
use cfb8::cipher::{BlockDecryptMut, KeyIvInit};
use std::{
    io::{self, ErrorKind},
    slice,
};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Cipher half installed on the read side after the 0xFC upgrade.
pub type StreamDecryptor = cfb8::Decryptor<Aes128>;

const FILL_CHUNK: usize = 1024;
const COMPACT_THRESHOLD: usize = 4096;

/// A typed big-endian reader over a raw byte stream.
///
/// Incoming bytes are decrypted as they arrive, so bytes buffered before
/// [`StreamReader::install_cipher`] stay plaintext and the first read after
/// the install yields the next plaintext byte regardless of buffering.
pub struct StreamReader {
    inner: Box<dyn AsyncRead + Send + Unpin>,
    buffer: Vec<u8>,
    pos: usize,
    cipher: Option<StreamDecryptor>,
    dumper: Option<StreamDumper>,
    bytes_read: u64,
}

impl StreamReader {
    pub fn new(inner: Box<dyn AsyncRead + Send + Unpin>) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            pos: 0,
            cipher: None,
            dumper: None,
            bytes_read: 0,
        }
    }

    pub fn set_dumper(&mut self, dumper: StreamDumper) {
        self.dumper = Some(dumper);
    }

    pub fn dumper_mut(&mut self) -> Option<&mut StreamDumper> {
        self.dumper.as_mut()
    }

    /// Installs the AES/CFB8 decryptor for all bytes arriving from now on.
    pub fn install_cipher(&mut self, key: [u8; 16]) {
        self.cipher = Some(StreamDecryptor::new(&key.into(), &key.into()));
    }

    /// Total plaintext bytes consumed so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    async fn fill(&mut self, n: usize) -> io::Result<()> {
        if self.pos == self.buffer.len() {
            self.buffer.clear();
            self.pos = 0;
        } else if self.pos > COMPACT_THRESHOLD {
            self.buffer.drain(..self.pos);
            self.pos = 0;
        }

        while self.buffer.len() - self.pos < n {
            let mut chunk = [0u8; FILL_CHUNK];
            let read = self.inner.read(&mut chunk).await?;
            if read == 0 {
                return Err(ErrorKind::UnexpectedEof.into());
            }
            let chunk = &mut chunk[..read];
            if let Some(cipher) = &mut self.cipher {
                for byte in chunk.iter_mut() {
                    cipher.decrypt_block_mut(GenericArray::from_mut_slice(slice::from_mut(byte)));
                }
            }
            self.buffer.extend_from_slice(chunk);
        }
        Ok(())
    }

    fn advance(&mut self, n: usize) -> &[u8] {
        let bytes = &self.buffer[self.pos..self.pos + n];
        self.pos += n;
        self.bytes_read += n as u64;
        if let Some(dumper) = &mut self.dumper {
            dumper.record(bytes);
        }
        bytes
    }

    async fn consume<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        self.fill(N).await?;
        Ok(<[u8; N]>::try_from(self.advance(N)).unwrap())
    }

    /// Reads exactly `out.len()` bytes into `out`.
    pub async fn read_exact(&mut self, out: &mut [u8]) -> io::Result<()> {
        self.fill(out.len()).await?;
        out.copy_from_slice(self.advance(out.len()));
        Ok(())
    }

    /// Discards `n` bytes from the stream.
    pub async fn skip(&mut self, n: usize) -> io::Result<()> {
        let mut remaining = n;
        while remaining > 0 {
            let step = remaining.min(FILL_CHUNK);
            self.fill(step).await?;
            self.advance(step);
            remaining -= step;
        }
        Ok(())
    }

    pub async fn read_u8(&mut self) -> io::Result<u8> {
        self.consume::<1>().await.map(|[x]| x)
    }

    pub async fn read_i8(&mut self) -> io::Result<i8> {
        self.consume().await.map(i8::from_be_bytes)
    }

    pub async fn read_i16(&mut self) -> io::Result<i16> {
        self.consume().await.map(i16::from_be_bytes)
    }

    pub async fn read_u16(&mut self) -> io::Result<u16> {
        self.consume().await.map(u16::from_be_bytes)
    }

    pub async fn read_i32(&mut self) -> io::Result<i32> {
        self.consume().await.map(i32::from_be_bytes)
    }

    pub async fn read_i64(&mut self) -> io::Result<i64> {
        self.consume().await.map(i64::from_be_bytes)
    }

    pub async fn read_f32(&mut self) -> io::Result<f32> {
        self.consume().await.map(f32::from_be_bytes)
    }

    pub async fn read_f64(&mut self) -> io::Result<f64> {
        self.consume().await.map(f64::from_be_bytes)
    }

    pub async fn read_bool(&mut self) -> io::Result<bool> {
        Ok(self.read_u8().await? != 0)
    }

    /// Reads a length-prefixed UTF-16 string. The prefix counts 16-bit code
    /// units; surrogate pairs are not interpreted. The allocation grows with
    /// the bytes actually present on the stream, so a hostile length prefix
    /// cannot force an oversized buffer.
    pub async fn read_utf16(&mut self) -> io::Result<String> {
        let length = usize::from(self.read_u16().await?);
        let mut units = Vec::with_capacity(length.min(512));
        for _ in 0..length {
            units.push(self.read_u16().await?);
        }
        Ok(String::from_utf16_lossy(&units))
    }

    /// Reads a little-endian base-128 variable-length integer. The width is
    /// not bounded; at least 64 bits of payload are accepted.
    pub async fn read_var_long(&mut self) -> io::Result<u64> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8().await?;
            value |= u64::from(byte & 0x7F).overflowing_shl(shift).0;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        Ok(value)
    }
}
