//! Area permission lookups supplied by the host.

use crate::{coordinate::Coordinate, session::Session};

/// What a player may do with a block at some coordinate.
#[derive(Copy, Clone, Debug, Default)]
pub struct BlockPermission {
    pub can_use: bool,
    pub can_destroy: bool,
    pub can_place: bool,
    /// Whether chests may be used here at all.
    pub chest: bool,
}

pub trait PermissionConfig: Send + Sync {
    /// Evaluates the permission for the session at the coordinate,
    /// optionally considering the item held in hand.
    fn block_permission(
        &self,
        session: &Session,
        coordinate: Coordinate,
        item: Option<i16>,
    ) -> BlockPermission;

    /// Whether the session's group bypasses area permissions entirely.
    fn ignores_areas(&self, session: &Session) -> bool;

    /// Whether the session's group bypasses chest locks.
    fn ignores_chest_locks(&self, session: &Session) -> bool;
}
