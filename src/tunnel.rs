//! One directional packet pipe with per-packet policy.
//!
//! Two tunnels run per player: one relaying client→server, the other
//! server→client. Each worker loops reading exactly one packet, applying
//! policy, draining its side's chat queue and flushing. The reader cursor
//! sits on a packet boundary between iterations; a partial parse either
//! completes or aborts the tunnel.

use crate::{
    message,
    message::Color,
    protocol::{
        dumper::StreamDumper,
        grammar,
        grammar::{Field, Reg, Scalar},
        StreamReader, StreamWriter, SCRATCH_SIZE,
    },
    server::Server,
    session::Session,
};
use futures::future::BoxFuture;
use std::{
    io,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::{SystemTime, UNIX_EPOCH},
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    task::JoinHandle,
};

/// A tunnel whose last read is older than this is considered idle.
pub const IDLE_MILLIS: u64 = 30_000;

const FLUSH_THRESHOLD: usize = 8 * 1024;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Relays packets the upstream server sends to the client.
    ServerToClient,
    /// Relays packets the client sends to the upstream server.
    ClientToServer,
}

impl Direction {
    pub fn from_server(self) -> bool {
        matches!(self, Direction::ServerToClient)
    }

    /// Label used for log lines and debug dump file names.
    pub fn stream_label(self) -> &'static str {
        match self {
            Direction::ServerToClient => "ServerStream",
            Direction::ClientToServer => "PlayerStream",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error("unable to parse unknown packet 0x{opcode:02x} (previous packet {previous:?})")]
    UnknownPacket { opcode: u8, previous: Option<u8> },
    #[error("bad length prefix inside packet 0x{opcode:02x}")]
    BadLength { opcode: u8 },
    #[error("encryption upgrade failed")]
    Upgrade(#[source] anyhow::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub struct Tunnel {
    pub(crate) direction: Direction,
    pub(crate) session: Arc<Session>,
    pub(crate) server: Arc<Server>,
    pub(crate) reader: StreamReader,
    pub(crate) writer: StreamWriter,
    pub(crate) scratch: [u8; SCRATCH_SIZE],
    pub(crate) in_game: bool,
    pub(crate) last_opcode: Option<u8>,
    pub(crate) command_prefix: char,
    pub(crate) debug_dump: bool,
    run: Arc<AtomicBool>,
    last_read: Arc<AtomicU64>,
}

/// Control handle for a spawned tunnel worker. The acceptor polls
/// [`TunnelHandle::is_active`] and stops idle tunnels.
pub struct TunnelHandle {
    run: Arc<AtomicBool>,
    last_read: Arc<AtomicU64>,
    session: Arc<Session>,
    task: JoinHandle<()>,
}

impl TunnelHandle {
    /// Requests shutdown; the worker observes it at the next loop head.
    pub fn stop(&self) {
        self.run.store(false, Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        !self.task.is_finished()
    }

    /// Whether the tunnel has read anything recently. Robots are exempt
    /// from the idle watchdog.
    pub fn is_active(&self) -> bool {
        self.session.is_robot()
            || now_millis().saturating_sub(self.last_read.load(Ordering::Relaxed)) < IDLE_MILLIS
    }

    /// Waits for the worker to finish.
    pub async fn join(self) {
        self.task.await.ok();
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn debug_dump_enabled() -> bool {
    std::env::var("EXPENSIVE_DEBUG_LOGGING")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

impl Tunnel {
    /// Creates the tunnel and starts its worker task.
    pub fn spawn(
        direction: Direction,
        input: Box<dyn AsyncRead + Send + Unpin>,
        output: Box<dyn AsyncWrite + Send + Unpin>,
        session: Arc<Session>,
        server: Arc<Server>,
    ) -> TunnelHandle {
        let debug_dump = debug_dump_enabled();
        let mut reader = StreamReader::new(input);
        let mut writer = StreamWriter::new(output);
        if debug_dump {
            let label = direction.stream_label();
            match StreamDumper::create(format!("{label}Input.debug")) {
                Ok(dumper) => reader.set_dumper(dumper),
                Err(e) => tracing::warn!("Unable to open input debug dump: {e}"),
            }
            match StreamDumper::create(format!("{label}Output.debug")) {
                Ok(dumper) => writer.set_dumper(dumper),
                Err(e) => tracing::warn!("Unable to open output debug dump: {e}"),
            }
        }

        let run = Arc::new(AtomicBool::new(true));
        let last_read = Arc::new(AtomicU64::new(now_millis()));
        let tunnel = Tunnel {
            direction,
            session: Arc::clone(&session),
            command_prefix: server.config.command_prefix(),
            server,
            reader,
            writer,
            scratch: [0u8; SCRATCH_SIZE],
            in_game: false,
            last_opcode: None,
            debug_dump,
            run: Arc::clone(&run),
            last_read: Arc::clone(&last_read),
        };
        let task = tokio::spawn(tunnel.run());
        TunnelHandle {
            run,
            last_read,
            session,
            task,
        }
    }

    async fn run(mut self) {
        while self.run.load(Ordering::SeqCst) && !self.session.is_closed() {
            self.last_read.store(now_millis(), Ordering::Relaxed);

            if let Err(e) = self.handle_packet().await {
                self.report_error(&e);
                break;
            }
            self.drain_chat();
            if let Err(e) = self.writer.flush().await {
                self.report_error(&e.into());
                break;
            }
        }

        if self.session.is_kicked() {
            if let Some(reason) = self.session.kick_reason() {
                self.send_kick(&reason);
            }
        }
        self.writer.flush().await.ok();
        self.release_dumpers();
    }

    fn report_error(&self, error: &TunnelError) {
        if self.run.load(Ordering::SeqCst) && !self.session.is_robot() {
            let previous = self
                .last_opcode
                .map(|opcode| format!(" (after 0x{opcode:02x})"))
                .unwrap_or_default();
            tracing::warn!(
                "{} error handling traffic for {}{previous}: {error}",
                self.direction.stream_label(),
                self.session.ip(),
            );
        }
    }

    fn release_dumpers(&mut self) {
        if let Some(dumper) = self.reader.dumper_mut() {
            dumper.packet_finished().ok();
            dumper.flush().ok();
        }
        if let Some(dumper) = self.writer.dumper_mut() {
            dumper.packet_finished().ok();
            dumper.flush().ok();
        }
    }

    /// Reads, inspects and re-emits exactly one packet.
    pub(crate) async fn handle_packet(&mut self) -> Result<(), TunnelError> {
        let opcode = self.reader.read_u8().await?;
        match opcode {
            0x01 => self.handle_login(opcode).await?,
            0x02 => self.handle_handshake(opcode).await?,
            0x03 => self.handle_chat(opcode).await?,
            0x06 => self.handle_spawn_position(opcode).await?,
            0x07 => self.handle_use_entity(opcode).await?,
            0x09 => self.handle_respawn(opcode).await?,
            0x0a => self.handle_flying(opcode).await?,
            0x0b => self.handle_position(opcode).await?,
            0x0c => self.handle_look(opcode).await?,
            0x0d => self.handle_position_look(opcode).await?,
            0x0e => self.handle_dig(opcode).await?,
            0x0f => self.handle_place(opcode).await?,
            0x14 => self.handle_named_entity_spawn(opcode).await?,
            0x35 => self.handle_block_change(opcode).await?,
            0x64 => self.handle_open_window(opcode).await?,
            0xfc => self.handle_encryption_response(opcode).await?,
            0xfd => self.handle_encryption_request(opcode).await?,
            0xff => self.handle_disconnect(opcode).await?,
            _ => match grammar::layout(opcode, self.server.config.allow_mod_packets) {
                Some(fields) => {
                    self.writer.write_u8(opcode);
                    let mut regs = [0i64; grammar::REGISTERS];
                    self.copy_fields(opcode, fields, &mut regs).await?;
                }
                None if self.debug_dump => {
                    // Drain the stream byte-wise so the dump captures the
                    // unparsed remainder for offline inspection.
                    tracing::warn!(
                        "{} capturing unknown packet 0x{opcode:02x}",
                        self.direction.stream_label()
                    );
                    loop {
                        self.reader.skip(1).await?;
                        if let Some(dumper) = self.reader.dumper_mut() {
                            dumper.flush().ok();
                        }
                    }
                }
                None => {
                    return Err(TunnelError::UnknownPacket {
                        opcode,
                        previous: self.last_opcode,
                    })
                }
            },
        }
        self.packet_finished();
        if opcode != 0x00 {
            self.last_opcode = Some(opcode);
        }
        Ok(())
    }

    /// Runs the grammar interpreter over one instruction sequence.
    fn copy_fields<'a>(
        &'a mut self,
        opcode: u8,
        fields: &'static [Field],
        regs: &'a mut [i64; grammar::REGISTERS],
    ) -> BoxFuture<'a, Result<(), TunnelError>> {
        Box::pin(async move {
            for field in fields {
                match *field {
                    Field::Byte => {
                        self.copy_i8().await?;
                    }
                    Field::Short => {
                        self.copy_i16().await?;
                    }
                    Field::Int => {
                        self.copy_i32().await?;
                    }
                    Field::Long => {
                        self.copy_i64().await?;
                    }
                    Field::Float => {
                        self.copy_f32().await?;
                    }
                    Field::Double => {
                        self.copy_f64().await?;
                    }
                    Field::Bool => {
                        self.copy_u8().await?;
                    }
                    Field::Str => {
                        self.copy_utf16().await?;
                    }
                    Field::Item => self.copy_item().await?,
                    Field::Metadata => self.copy_metadata().await?,
                    Field::VarLong => {
                        self.copy_var_long().await?;
                    }
                    Field::Remember(scalar, Reg(reg)) => {
                        regs[reg] = match scalar {
                            Scalar::Byte => i64::from(self.copy_i8().await?),
                            Scalar::Short => i64::from(self.copy_i16().await?),
                            Scalar::Int => i64::from(self.copy_i32().await?),
                            Scalar::VarLong => self.copy_var_long().await? as i64,
                        };
                    }
                    Field::Span(len) => {
                        let count = len
                            .resolve(regs)
                            .ok_or(TunnelError::BadLength { opcode })?;
                        self.copy_bytes(count).await?;
                    }
                    Field::When(Reg(reg), pred, body) => {
                        if pred.matches(regs[reg]) {
                            self.copy_fields(opcode, body, regs).await?;
                        }
                    }
                    Field::Repeat(Reg(reg), body) => {
                        let count = regs[reg].max(0);
                        for _ in 0..count {
                            self.copy_fields(opcode, body, regs).await?;
                        }
                    }
                }
            }
            Ok(())
        })
    }

    // Forwarding helpers: read a value, mirror it downstream, return it.

    pub(crate) async fn copy_u8(&mut self) -> io::Result<u8> {
        Ok(self.writer.write_u8(self.reader.read_u8().await?))
    }

    pub(crate) async fn copy_i8(&mut self) -> io::Result<i8> {
        Ok(self.writer.write_i8(self.reader.read_i8().await?))
    }

    pub(crate) async fn copy_i16(&mut self) -> io::Result<i16> {
        Ok(self.writer.write_i16(self.reader.read_i16().await?))
    }

    pub(crate) async fn copy_i32(&mut self) -> io::Result<i32> {
        Ok(self.writer.write_i32(self.reader.read_i32().await?))
    }

    pub(crate) async fn copy_i64(&mut self) -> io::Result<i64> {
        Ok(self.writer.write_i64(self.reader.read_i64().await?))
    }

    pub(crate) async fn copy_f32(&mut self) -> io::Result<f32> {
        Ok(self.writer.write_f32(self.reader.read_f32().await?))
    }

    pub(crate) async fn copy_f64(&mut self) -> io::Result<f64> {
        Ok(self.writer.write_f64(self.reader.read_f64().await?))
    }

    pub(crate) async fn copy_utf16(&mut self) -> io::Result<String> {
        let value = self.reader.read_utf16().await?;
        self.writer.write_utf16(&value);
        Ok(value)
    }

    pub(crate) async fn copy_var_long(&mut self) -> io::Result<u64> {
        Ok(self.writer.write_var_long(self.reader.read_var_long().await?))
    }

    /// Mirrors `count` opaque bytes through the scratch buffer.
    pub(crate) async fn copy_bytes(&mut self, count: usize) -> io::Result<()> {
        let mut remaining = count;
        while remaining > 0 {
            let step = remaining.min(SCRATCH_SIZE);
            self.reader.read_exact(&mut self.scratch[..step]).await?;
            self.writer.write_slice(&self.scratch[..step]);
            if self.writer.pending() > FLUSH_THRESHOLD {
                self.writer.flush().await?;
            }
            remaining -= step;
        }
        Ok(())
    }

    pub(crate) async fn skip_bytes(&mut self, count: usize) -> io::Result<()> {
        self.reader.skip(count).await
    }

    /// Mirrors one item record: `(id, [count, damage, nbt])`.
    pub(crate) async fn copy_item(&mut self) -> io::Result<()> {
        if self.copy_i16().await? >= 0 {
            self.copy_i8().await?;
            self.copy_i16().await?;
            let nbt_length = self.copy_i16().await?;
            if nbt_length > 0 {
                self.copy_bytes(nbt_length as usize).await?;
            }
        }
        Ok(())
    }

    pub(crate) async fn skip_item(&mut self) -> io::Result<()> {
        if self.reader.read_i16().await? >= 0 {
            self.reader.read_i8().await?;
            self.reader.read_i16().await?;
            let nbt_length = self.reader.read_i16().await?;
            if nbt_length > 0 {
                self.skip_bytes(nbt_length as usize).await?;
            }
        }
        Ok(())
    }

    /// Mirrors one metadata blob: tagged entries until the 0x7F sentinel.
    /// The high three tag bits select the entry's primitive.
    pub(crate) async fn copy_metadata(&mut self) -> io::Result<()> {
        let mut tag = self.copy_u8().await?;
        while tag != 0x7f {
            match (tag & 0xE0) >> 5 {
                0 => {
                    self.copy_i8().await?;
                }
                1 => {
                    self.copy_i16().await?;
                }
                2 => {
                    self.copy_i32().await?;
                }
                3 => {
                    self.copy_f32().await?;
                }
                4 => {
                    self.copy_utf16().await?;
                }
                5 => self.copy_item().await?,
                _ => {
                    self.copy_i32().await?;
                    self.copy_i32().await?;
                    self.copy_i32().await?;
                }
            }
            tag = self.copy_u8().await?;
        }
        Ok(())
    }

    pub(crate) async fn skip_metadata(&mut self) -> io::Result<()> {
        let mut tag = self.reader.read_u8().await?;
        while tag != 0x7f {
            match (tag & 0xE0) >> 5 {
                0 => {
                    self.reader.read_i8().await?;
                }
                1 => {
                    self.reader.read_i16().await?;
                }
                2 => {
                    self.reader.read_i32().await?;
                }
                3 => {
                    self.reader.read_f32().await?;
                }
                4 => {
                    self.reader.read_utf16().await?;
                }
                5 => self.skip_item().await?,
                _ => {
                    self.reader.read_i32().await?;
                    self.reader.read_i32().await?;
                    self.reader.read_i32().await?;
                }
            }
            tag = self.reader.read_u8().await?;
        }
        Ok(())
    }

    /// Drains this side's chat queue into 0x03 packets.
    fn drain_chat(&mut self) {
        if self.direction.from_server() {
            while let Some(line) = self.session.next_message() {
                self.send_chat(&line);
            }
        } else {
            while let Some(line) = self.session.next_forward() {
                if self.server.config.forward_chat {
                    self.server.note_forwarded(&line);
                }
                self.send_chat(&line);
            }
        }
    }

    /// Emits one chat packet, trimming a dangling color escape.
    pub(crate) fn send_chat(&mut self, line: &str) {
        let line = message::trim_dangling_color(line);
        if line.is_empty() {
            return;
        }
        self.writer.write_u8(0x03);
        self.writer.write_utf16(line);
        self.packet_finished();
    }

    /// Queues a translated, colorized notice for the player.
    pub(crate) fn notify(&self, color: Color, text: &str) {
        self.session
            .add_message(color.wrap(&self.server.translator.tr(text)));
    }

    fn send_kick(&mut self, reason: &str) {
        self.writer.write_u8(0xff);
        self.writer.write_utf16(reason);
        self.packet_finished();
    }

    pub(crate) fn packet_finished(&mut self) {
        if let Some(dumper) = self.reader.dumper_mut() {
            dumper.packet_finished().ok();
        }
        if let Some(dumper) = self.writer.dumper_mut() {
            dumper.packet_finished().ok();
        }
    }

    /// Validates an i16 length prefix read off the wire.
    pub(crate) fn checked_len(&self, opcode: u8, value: i16) -> Result<usize, TunnelError> {
        usize::try_from(value).map_err(|_| TunnelError::BadLength { opcode })
    }
}
