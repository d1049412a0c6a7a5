//! Shared server-wide state: configuration and collaborator handles.

use crate::{
    auth::Authenticator,
    command::CommandProcessor,
    config::Config,
    event::EventHost,
    permission::PermissionConfig,
    registry::{BotRegistry, ChestRegistry, PlayerDirectory},
    translate::Translate,
};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

const FORWARDED_LEDGER_LIMIT: usize = 32;

/// The host-provided collaborators a [`Server`] is wired with.
pub struct HostServices {
    pub authenticator: Arc<dyn Authenticator>,
    pub chests: Arc<dyn ChestRegistry>,
    pub bots: Arc<dyn BotRegistry>,
    pub players: Arc<dyn PlayerDirectory>,
    pub permissions: Arc<dyn PermissionConfig>,
    pub commands: Arc<dyn CommandProcessor>,
    pub events: Arc<dyn EventHost>,
    pub translator: Arc<dyn Translate>,
}

/// Immutable configuration plus the registries shared across all players.
pub struct Server {
    pub config: Config,
    pub authenticator: Arc<dyn Authenticator>,
    pub chests: Arc<dyn ChestRegistry>,
    pub bots: Arc<dyn BotRegistry>,
    pub players: Arc<dyn PlayerDirectory>,
    pub permissions: Arc<dyn PermissionConfig>,
    pub commands: Arc<dyn CommandProcessor>,
    pub events: Arc<dyn EventHost>,
    pub translator: Arc<dyn Translate>,
    forwarded: Mutex<VecDeque<String>>,
}

impl Server {
    pub fn new(config: Config, services: HostServices) -> Self {
        Self {
            config,
            authenticator: services.authenticator,
            chests: services.chests,
            bots: services.bots,
            players: services.players,
            permissions: services.permissions,
            commands: services.commands,
            events: services.events,
            translator: services.translator,
            forwarded: Mutex::new(VecDeque::new()),
        }
    }

    /// Records a chat line forwarded to the upstream server so its echo can
    /// be recognized on the way back.
    pub fn note_forwarded(&self, line: &str) {
        let mut ledger = self.forwarded.lock().unwrap();
        if ledger.len() == FORWARDED_LEDGER_LIMIT {
            ledger.pop_front();
        }
        ledger.push_back(line.to_owned());
    }

    /// Consumes a matching entry from the forwarded ledger. Returns whether
    /// the line was one we forwarded ourselves.
    pub fn was_forwarded(&self, line: &str) -> bool {
        let mut ledger = self.forwarded.lock().unwrap();
        if let Some(index) = ledger.iter().position(|entry| entry == line) {
            ledger.remove(index);
            true
        } else {
            false
        }
    }

    /// Persists the chest registry, logging failures. Registry state keeps
    /// being served from memory when the backing store is unavailable.
    pub fn save_chests(&self) {
        if let Err(e) = self.chests.save() {
            tracing::error!("Failed to persist chest registry: {e:?}");
        }
    }
}
