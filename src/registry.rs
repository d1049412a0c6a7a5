//! Chest, bot, and player registries supplied by the host.

use crate::{coordinate::Coordinate, session::Session};
use std::sync::Arc;

/// A chest known to the registry. `owner == None` means the chest is open
/// (usable by anyone); otherwise it is locked to the named player.
#[derive(Debug, Clone)]
pub struct ChestInfo {
    pub coordinate: Coordinate,
    pub owner: Option<String>,
    pub label: Option<String>,
}

impl ChestInfo {
    pub fn is_open(&self) -> bool {
        self.owner.is_none()
    }

    pub fn owned_by(&self, name: &str) -> bool {
        self.owner.as_deref() == Some(name)
    }
}

/// Persistent map from world coordinate to optional chest lock. Each
/// coordinate appears at most once; implementations synchronize internally
/// and serialize lock transitions.
pub trait ChestRegistry: Send + Sync {
    fn is_chest(&self, coordinate: Coordinate) -> bool;

    fn is_locked(&self, coordinate: Coordinate) -> bool;

    /// Whether the session may open the chest at the coordinate.
    fn can_open(&self, session: &Session, coordinate: Coordinate) -> bool;

    /// The chest (if any) in the block next to the coordinate; the other
    /// half of a would-be double chest.
    fn adjacent_chest(&self, coordinate: Coordinate) -> Option<ChestInfo>;

    /// Registers the coordinate as an open chest.
    fn add_open(&self, coordinate: Coordinate);

    /// Locks the coordinate to `owner` under the given display label.
    fn give_lock(&self, owner: &str, coordinate: Coordinate, label: Option<String>);

    /// Forgets the chest at the coordinate entirely.
    fn release_lock(&self, coordinate: Coordinate);

    /// Clears the lock, leaving the chest registered as open.
    fn unlock(&self, coordinate: Coordinate);

    /// Changes the display label of a registered chest.
    fn rename(&self, coordinate: Coordinate, label: &str);

    fn chest_label(&self, coordinate: Coordinate) -> Option<String>;

    /// Flushes the registry to its backing store. Called after every lock
    /// transition; failures are logged by the caller, never fatal.
    fn save(&self) -> anyhow::Result<()>;
}

/// Names that belong to automated observers rather than players. Their
/// spawns and join/left broadcasts are suppressed.
pub trait BotRegistry: Send + Sync {
    fn is_bot(&self, name: &str) -> bool;
}

/// Sessions of all currently connected players.
pub trait PlayerDirectory: Send + Sync {
    fn find_by_entity_id(&self, entity_id: i32) -> Option<Arc<Session>>;

    fn count(&self) -> usize;
}
