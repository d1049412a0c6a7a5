//! Implements the legacy Minecraft wire protocol layer.

/// Protocol generation this proxy speaks; reported in rewritten
/// server-list ping responses.
pub const PROTOCOL_VERSION: i32 = 74;
/// Game version string paired with [`PROTOCOL_VERSION`].
pub const GAME_VERSION: &str = "1.6.2";

/// Scratch buffer size used when relaying opaque byte spans.
pub const SCRATCH_SIZE: usize = 1024;

pub mod dumper;
pub mod grammar;
pub mod reader;
pub mod writer;

pub use reader::StreamReader;
pub use writer::StreamWriter;
