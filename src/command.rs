//! Chat command handling supplied by the host.

use crate::session::Session;
use std::sync::Arc;

pub trait CommandProcessor: Send + Sync {
    /// Handles one command message (prefix included). `None` suppresses the
    /// message; `Some` is the rewritten text to forward upstream. Any output
    /// for the player is queued on the session by the implementation.
    fn process(&self, session: &Arc<Session>, message: &str) -> Option<String>;
}
