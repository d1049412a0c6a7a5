//! Field-instruction table for the packet grammar.
//!
//! Every opcode without a policy hook is described here as a sequence of
//! [`Field`] instructions and relayed by one interpreter loop
//! (`Tunnel::copy_fields`). Adding an opcode means adding a row; the
//! layouts must match the wire format exactly, since a single miscounted
//! byte desynchronizes the stream.
//!
//! Variable layouts use a tiny register file: `Remember` copies a scalar
//! and stores it, `Span`/`When`/`Repeat` consume the stored value.

/// Register index used by `Remember` and the length expressions.
#[derive(Copy, Clone, Debug)]
pub struct Reg(pub usize);

pub const REGISTERS: usize = 2;

const A: Reg = Reg(0);
const B: Reg = Reg(1);

/// Scalar width for `Remember`.
#[derive(Copy, Clone, Debug)]
pub enum Scalar {
    Byte,
    Short,
    Int,
    VarLong,
}

/// Byte-span length expression over the register file.
#[derive(Copy, Clone, Debug)]
pub enum Len {
    Fixed(usize),
    Reg(Reg),
    Times(Reg, usize),
    TimesPlus(Reg, usize, Reg),
}

impl Len {
    /// Resolves to a concrete byte count; `None` for negative or
    /// overflowing lengths, which callers must treat as a desync.
    pub fn resolve(self, regs: &[i64; REGISTERS]) -> Option<usize> {
        let value = match self {
            Len::Fixed(n) => return Some(n),
            Len::Reg(r) => regs[r.0],
            Len::Times(r, k) => regs[r.0].checked_mul(k as i64)?,
            Len::TimesPlus(r, k, s) => regs[r.0].checked_mul(k as i64)?.checked_add(regs[s.0])?,
        };
        usize::try_from(value).ok()
    }
}

/// Guard condition for `When`.
#[derive(Copy, Clone, Debug)]
pub enum Pred {
    Positive,
    NotEqual(i64),
    OneOf(&'static [i64]),
}

impl Pred {
    pub fn matches(self, value: i64) -> bool {
        match self {
            Pred::Positive => value > 0,
            Pred::NotEqual(x) => value != x,
            Pred::OneOf(xs) => xs.contains(&value),
        }
    }
}

/// One field instruction. Plain variants copy a value straight through;
/// `Item` and `Metadata` are the two composite records of the protocol.
#[derive(Copy, Clone, Debug)]
pub enum Field {
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Bool,
    Str,
    Item,
    Metadata,
    VarLong,
    Remember(Scalar, Reg),
    Span(Len),
    When(Reg, Pred, &'static [Field]),
    Repeat(Reg, &'static [Field]),
}

use Field::*;
use Len::{Fixed, TimesPlus};
use Scalar as S;

/// Looks up the pass-through layout for an opcode. Opcodes with policy
/// hooks are dispatched before this table is consulted; `None` here means
/// the opcode is unknown (fatal).
pub fn layout(opcode: u8, allow_mod_packets: bool) -> Option<&'static [Field]> {
    let fields: &'static [Field] = match opcode {
        // Keep Alive: random id echoed by the other side.
        0x00 => &[Int],
        // Time Update.
        0x04 => &[Long, Long],
        // Entity Equipment.
        0x05 => &[Int, Short, Item],
        // Update Health.
        0x08 => &[Float, Short, Float],
        // Holding Change.
        0x10 => &[Span(Fixed(2))],
        // Use Bed.
        0x11 => &[Span(Fixed(14))],
        // Animation.
        0x12 => &[Span(Fixed(5))],
        // Entity Action.
        0x13 => &[Int, Byte, Int],
        // Collect Item.
        0x16 => &[Span(Fixed(8))],
        // Add Object/Vehicle: the trailing velocity triple is only present
        // when the thrower field is nonzero.
        0x17 => &[
            Int,
            Byte,
            Int,
            Int,
            Int,
            Byte,
            Byte,
            Remember(S::Int, A),
            When(A, Pred::Positive, &[Short, Short, Short]),
        ],
        // Mob Spawn.
        0x18 => &[
            Int,
            Byte,
            Int,
            Int,
            Int,
            Byte,
            Byte,
            Byte,
            Short,
            Short,
            Short,
            Metadata,
        ],
        // Entity: Painting.
        0x19 => &[Int, Str, Int, Int, Int, Int],
        // Experience Orb.
        0x1a => &[Int, Int, Int, Int, Short],
        // Steer Vehicle.
        0x1b => &[Float, Float, Bool, Bool],
        // Entity Velocity.
        0x1c => &[Span(Fixed(10))],
        // Destroy Entity: one int per destroyed id.
        0x1d => &[
            Remember(S::Byte, A),
            When(A, Pred::Positive, &[Span(Len::Times(A, 4))]),
        ],
        // Entity.
        0x1e => &[Span(Fixed(4))],
        // Entity Relative Move.
        0x1f => &[Span(Fixed(7))],
        // Entity Look.
        0x20 => &[Span(Fixed(6))],
        // Entity Look and Relative Move.
        0x21 => &[Span(Fixed(9))],
        // Entity Teleport.
        0x22 => &[Span(Fixed(18))],
        // Entity Head Look.
        0x23 => &[Int, Byte],
        // Entity Status.
        0x26 => &[Span(Fixed(5))],
        // Attach Entity.
        0x27 => &[Int, Int, Bool],
        // Entity Metadata.
        0x28 => &[Int, Metadata],
        // Entity Effect.
        0x29 => &[Int, Byte, Byte, Short],
        // Remove Entity Effect.
        0x2a => &[Int, Byte],
        // Set Experience.
        0x2b => &[Float, Short, Short],
        // Entity Properties: key/value pairs, each with a modifier list.
        0x2c => &[
            Int,
            Remember(S::Int, A),
            Repeat(
                A,
                &[
                    Str,
                    Double,
                    Remember(S::Short, B),
                    Repeat(B, &[Long, Long, Double, Byte]),
                ],
            ),
        ],
        // Map Chunk: opaque compressed payload.
        0x33 => &[
            Int,
            Int,
            Bool,
            Short,
            Short,
            Remember(S::Int, A),
            Span(Len::Reg(A)),
        ],
        // Multi Block Change.
        0x34 => &[Int, Int, Short, Remember(S::Int, A), Span(Len::Reg(A))],
        // Block Action.
        0x36 => &[Span(Fixed(14))],
        // Block Break Animation.
        0x37 => &[Int, Int, Int, Int, Byte],
        // Map Chunk Bulk: metadata records plus one shared payload.
        0x38 => &[
            Remember(S::Short, A),
            Remember(S::Int, B),
            Bool,
            Span(TimesPlus(A, 12, B)),
        ],
        // Explosion: three bytes per affected block record.
        0x3c => &[
            Span(Fixed(28)),
            Remember(S::Int, A),
            Span(Len::Times(A, 3)),
            Float,
            Float,
            Float,
        ],
        // Sound/Particle Effect.
        0x3d => &[Int, Int, Byte, Int, Int, Byte],
        // Named Sound Effect.
        0x3e => &[Str, Int, Int, Int, Float, Byte],
        // Particle.
        0x3f => &[Str, Float, Float, Float, Float, Float, Float, Float, Int],
        // Change Game State.
        0x46 => &[Byte, Byte],
        // Thunderbolt.
        0x47 => &[Span(Fixed(17))],
        // Close Window.
        0x65 => &[Byte],
        // Window Click.
        0x66 => &[Byte, Short, Byte, Short, Byte, Item],
        // Set Slot.
        0x67 => &[Byte, Short, Item],
        // Window Items.
        0x68 => &[Byte, Remember(S::Short, A), Repeat(A, &[Item])],
        // Update Window Property.
        0x69 => &[Byte, Short, Short],
        // Transaction.
        0x6a => &[Byte, Short, Byte],
        // Creative Inventory Action.
        0x6b => &[Short, Item],
        // Enchant Item.
        0x6c => &[Byte, Byte],
        // Update Sign.
        0x82 => &[Int, Short, Int, Str, Str, Str, Str],
        // Item Data.
        0x83 => &[Short, Short, Remember(S::Short, A), Span(Len::Reg(A))],
        // Update Tile Entity.
        0x84 => &[
            Int,
            Short,
            Int,
            Byte,
            Remember(S::Short, A),
            When(A, Pred::Positive, &[Span(Len::Reg(A))]),
        ],
        // Tile Editor Open.
        0x85 => &[Byte, Int, Int, Int],
        // Plugin channel payload (BukkitContrib framing).
        0xc3 => &[Int, Remember(S::Int, A), Span(Len::Reg(A))],
        // Increment Statistic.
        0xc8 => &[Int, Int],
        // Player List Item.
        0xc9 => &[Str, Byte, Short],
        // Player Abilities.
        0xca => &[Byte, Float, Float],
        // Tab-Completion.
        0xcb => &[Str],
        // Client Settings.
        0xcc => &[Str, Byte, Byte, Byte, Bool],
        // Client Statuses.
        0xcd => &[Byte],
        // Scoreboard Objectives.
        0xce => &[Str, Str, Byte],
        // Update Score: value fields absent when the action removes.
        0xcf => &[
            Str,
            Remember(S::Byte, A),
            When(A, Pred::NotEqual(1), &[Str, Int]),
        ],
        // Display Scoreboard.
        0xd0 => &[Byte, Str],
        // Teams: field presence keyed on the mode byte.
        0xd1 => &[
            Str,
            Remember(S::Byte, A),
            When(A, Pred::OneOf(&[0, 2]), &[Str, Str, Str, Byte]),
            When(
                A,
                Pred::OneOf(&[0, 3, 4]),
                &[Remember(S::Short, B), Repeat(B, &[Str])],
            ),
        ],
        // RedPower subnet traffic (mod-specific).
        0xd3 if allow_mod_packets => &[
            Span(Fixed(1)),
            VarLong,
            VarLong,
            VarLong,
            Remember(S::VarLong, A),
            Span(Len::Reg(A)),
        ],
        // ModLoaderMP payload (mod-specific).
        0xe6 if allow_mod_packets => &[
            Int,
            Int,
            Remember(S::Int, A),
            Span(Len::Times(A, 4)),
            Remember(S::Int, A),
            Span(Len::Times(A, 4)),
            Remember(S::Int, A),
            Span(Len::Times(A, 8)),
            Remember(S::Int, A),
            Repeat(A, &[Remember(S::Int, B), Span(Len::Reg(B))]),
        ],
        // Plugin Message.
        0xfa => &[Str, Remember(S::Short, A), Span(Len::Reg(A))],
        // Server List Ping.
        0xfe => &[Byte],
        _ => return None,
    };
    Some(fields)
}
