//! Runtime options consumed by the tunnels.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Selects `/` as the command prefix; `!` otherwise.
    pub use_slashes: bool,
    /// Advertised player cap; rewrites the login response and the
    /// server-list ping reply.
    pub max_players: i32,
    /// Whether chat forwarded to the upstream server should be tracked so
    /// its echo can be suppressed on the way back.
    pub forward_chat: bool,
    /// Whether server-side chat gets reformatted locally.
    pub use_msg_formats: bool,
    /// Wrap outgoing chat instead of forwarding it verbatim.
    pub msg_wrap: bool,
    /// Whether `[Server:…]` console relays reach ordinary players.
    pub chat_console_to_ops: bool,
    /// Run the player-list command for a player on first join.
    pub show_list_on_connect: bool,
    /// Whether scripted events fire at all.
    pub enable_events: bool,
    /// Accept the mod-specific 0xD3/0xE6 opcodes instead of treating them
    /// as a desync.
    pub allow_mod_packets: bool,
    /// Description reported in rewritten server-list ping replies.
    pub server_description: String,
    /// Message of the day, one chat line per text line.
    pub motd: String,
    /// Command (without prefix) run for `show_list_on_connect`.
    pub player_list_command: String,
}

impl Config {
    pub fn command_prefix(&self) -> char {
        if self.use_slashes {
            '/'
        } else {
            '!'
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            use_slashes: true,
            max_players: 16,
            forward_chat: false,
            use_msg_formats: true,
            msg_wrap: false,
            chat_console_to_ops: false,
            show_list_on_connect: false,
            enable_events: false,
            allow_mod_packets: false,
            server_description: String::new(),
            motd: String::new(),
            player_list_command: "list".to_owned(),
        }
    }
}
