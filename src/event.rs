//! Scripted-event notifications supplied by the host.
//!
//! Only consulted when `enable_events` is set in the config.

use crate::{coordinate::Coordinate, session::Session};
use std::sync::Arc;

pub trait EventHost: Send + Sync {
    /// First spawn-position packet for the session.
    fn player_connected(&self, session: &Arc<Session>);

    /// Respawn observed on the server side.
    fn player_respawned(&self, session: &Arc<Session>);

    /// Position update; lets the host fire area-entry events.
    fn location_checked(&self, session: &Arc<Session>);

    /// Block placement aimed at the coordinate; lets the host fire
    /// button-press events.
    fn button_checked(&self, session: &Arc<Session>, coordinate: Coordinate);
}
