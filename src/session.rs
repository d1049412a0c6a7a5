//! Shared per-player session state.
//!
//! One `Session` is shared by the two tunnel workers of a player. All
//! mutation happens on those workers; cross-tunnel communication goes
//! through the two chat queues and the atomic flags, so there is no
//! session-wide lock.

use crate::{
    auth::EncryptionContext,
    coordinate::{Coordinate, Dimension},
};
use std::{
    net::IpAddr,
    sync::{
        atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering},
        Arc, Mutex,
    },
};

/// Last-known position, mirrored from the movement packets.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub stance: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
}

/// A pending lock or unlock the player has requested for the next chest
/// they interact with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChestAction {
    Lock { label: Option<String> },
    Unlock,
}

pub struct Session {
    ip: IpAddr,
    entity_id: AtomicI32,
    dimension: Mutex<Dimension>,
    name: Mutex<String>,
    connection_hash: Mutex<String>,
    level_type: Mutex<String>,
    guest: AtomicBool,
    muted: AtomicBool,
    god_mode: AtomicBool,
    instant_destroy: AtomicBool,
    robot: AtomicBool,
    closed: AtomicBool,
    group: AtomicI32,
    kick_reason: Mutex<Option<String>>,
    position: Mutex<Position>,
    inbound_chat: (flume::Sender<String>, flume::Receiver<String>),
    forward_chat: (flume::Sender<String>, flume::Receiver<String>),
    pending_place: Mutex<Option<Coordinate>>,
    open_target: Mutex<Option<Coordinate>>,
    chest_action: Mutex<Option<ChestAction>>,
    blocks_destroyed: AtomicU32,
    blocks_placed: AtomicU32,
    /// Encryption context facing the game client.
    pub client_encryption: Arc<dyn EncryptionContext>,
    /// Encryption context facing the upstream server.
    pub server_encryption: Arc<dyn EncryptionContext>,
}

impl Session {
    pub fn new(
        ip: IpAddr,
        client_encryption: Arc<dyn EncryptionContext>,
        server_encryption: Arc<dyn EncryptionContext>,
    ) -> Self {
        Self {
            ip,
            entity_id: AtomicI32::new(0),
            dimension: Mutex::new(Dimension::Overworld),
            name: Mutex::new(String::new()),
            connection_hash: Mutex::new(String::new()),
            level_type: Mutex::new(String::new()),
            guest: AtomicBool::new(false),
            muted: AtomicBool::new(false),
            god_mode: AtomicBool::new(false),
            instant_destroy: AtomicBool::new(false),
            robot: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            group: AtomicI32::new(0),
            kick_reason: Mutex::new(None),
            position: Mutex::new(Position::default()),
            inbound_chat: flume::unbounded(),
            forward_chat: flume::unbounded(),
            pending_place: Mutex::new(None),
            open_target: Mutex::new(None),
            chest_action: Mutex::new(None),
            blocks_destroyed: AtomicU32::new(0),
            blocks_placed: AtomicU32::new(0),
            client_encryption,
            server_encryption,
        }
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn entity_id(&self) -> i32 {
        self.entity_id.load(Ordering::Relaxed)
    }

    pub fn set_entity_id(&self, entity_id: i32) {
        self.entity_id.store(entity_id, Ordering::Relaxed);
    }

    pub fn dimension(&self) -> Dimension {
        *self.dimension.lock().unwrap()
    }

    pub fn set_dimension(&self, dimension: Dimension) {
        *self.dimension.lock().unwrap() = dimension;
    }

    /// The player name. Final for the life of the connection once the
    /// handshake has completed.
    pub fn name(&self) -> String {
        self.name.lock().unwrap().clone()
    }

    pub fn set_name(&self, name: &str) {
        *self.name.lock().unwrap() = name.to_owned();
    }

    /// Session hash used as the server id under custom auth.
    pub fn connection_hash(&self) -> String {
        self.connection_hash.lock().unwrap().clone()
    }

    pub fn set_connection_hash(&self, hash: &str) {
        *self.connection_hash.lock().unwrap() = hash.to_owned();
    }

    pub fn level_type(&self) -> String {
        self.level_type.lock().unwrap().clone()
    }

    pub fn set_level_type(&self, level_type: &str) {
        *self.level_type.lock().unwrap() = level_type.to_owned();
    }

    pub fn is_guest(&self) -> bool {
        self.guest.load(Ordering::Relaxed)
    }

    pub fn set_guest(&self, guest: bool) {
        self.guest.store(guest, Ordering::Relaxed);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    pub fn god_mode(&self) -> bool {
        self.god_mode.load(Ordering::Relaxed)
    }

    pub fn set_god_mode(&self, enabled: bool) {
        self.god_mode.store(enabled, Ordering::Relaxed);
    }

    pub fn instant_destroy(&self) -> bool {
        self.instant_destroy.load(Ordering::Relaxed)
    }

    pub fn set_instant_destroy(&self, enabled: bool) {
        self.instant_destroy.store(enabled, Ordering::Relaxed);
    }

    /// Robots are automated observers: they are exempt from the idle
    /// watchdog and their stream errors are not worth logging.
    pub fn is_robot(&self) -> bool {
        self.robot.load(Ordering::Relaxed)
    }

    pub fn set_robot(&self, robot: bool) {
        self.robot.store(robot, Ordering::Relaxed);
    }

    pub fn group(&self) -> i32 {
        self.group.load(Ordering::Relaxed)
    }

    pub fn set_group(&self, group: i32) {
        self.group.store(group, Ordering::Relaxed);
    }

    /// Whether the connection is shutting down. Both tunnel workers poll
    /// this at their loop head.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Flags the session for disconnection with the given reason. The
    /// tunnel workers emit the final kick packet on exit.
    pub fn kick(&self, reason: impl Into<String>) {
        *self.kick_reason.lock().unwrap() = Some(reason.into());
        self.close();
    }

    pub fn is_kicked(&self) -> bool {
        self.kick_reason.lock().unwrap().is_some()
    }

    pub fn kick_reason(&self) -> Option<String> {
        self.kick_reason.lock().unwrap().clone()
    }

    pub fn position(&self) -> Position {
        *self.position.lock().unwrap()
    }

    pub fn update_position(&self, x: f64, y: f64, z: f64, stance: f64) {
        let mut position = self.position.lock().unwrap();
        position.x = x;
        position.y = y;
        position.z = z;
        position.stance = stance;
    }

    pub fn update_look(&self, yaw: f32, pitch: f32) {
        let mut position = self.position.lock().unwrap();
        position.yaw = yaw;
        position.pitch = pitch;
    }

    /// Queues a chat line for delivery to the client. Drained by the
    /// server→client tunnel after each packet.
    pub fn add_message(&self, message: impl Into<String>) {
        self.inbound_chat.0.send(message.into()).ok();
    }

    pub fn next_message(&self) -> Option<String> {
        self.inbound_chat.1.try_recv().ok()
    }

    pub fn has_messages(&self) -> bool {
        !self.inbound_chat.1.is_empty()
    }

    /// Queues a chat line for delivery to the upstream server. Drained by
    /// the client→server tunnel after each packet.
    pub fn add_forward(&self, message: impl Into<String>) {
        self.forward_chat.0.send(message.into()).ok();
    }

    pub fn next_forward(&self) -> Option<String> {
        self.forward_chat.1.try_recv().ok()
    }

    /// Remembers (or clears) the coordinate where a chest placement is in
    /// flight, awaiting the confirming block change.
    pub fn placing_chest(&self, coordinate: Option<Coordinate>) {
        *self.pending_place.lock().unwrap() = coordinate;
    }

    /// Whether the block change at the coordinate confirms a pending
    /// chest placement.
    pub fn placed_chest(&self, coordinate: Coordinate) -> bool {
        *self.pending_place.lock().unwrap() == Some(coordinate)
    }

    /// Remembers the block the player last interacted with, so the
    /// following open-window packet can be attributed to a chest.
    pub fn opening_chest(&self, coordinate: Option<Coordinate>) {
        *self.open_target.lock().unwrap() = coordinate;
    }

    pub fn opened_chest(&self) -> Option<Coordinate> {
        *self.open_target.lock().unwrap()
    }

    pub fn set_chest_action(&self, action: Option<ChestAction>) {
        *self.chest_action.lock().unwrap() = action;
    }

    pub fn is_attempting_lock(&self) -> bool {
        matches!(
            *self.chest_action.lock().unwrap(),
            Some(ChestAction::Lock { .. })
        )
    }

    pub fn is_attempting_unlock(&self) -> bool {
        *self.chest_action.lock().unwrap() == Some(ChestAction::Unlock)
    }

    /// Display label requested for the next locked chest, if any.
    pub fn next_chest_label(&self) -> Option<String> {
        match &*self.chest_action.lock().unwrap() {
            Some(ChestAction::Lock { label }) => label.clone(),
            _ => None,
        }
    }

    pub fn destroyed_block(&self) {
        self.blocks_destroyed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn blocks_destroyed(&self) -> u32 {
        self.blocks_destroyed.load(Ordering::Relaxed)
    }

    pub fn placed_block(&self) {
        self.blocks_placed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn blocks_placed(&self) -> u32 {
        self.blocks_placed.load(Ordering::Relaxed)
    }
}
