//! Raw chat classification: join/left broadcasts, console relays, colors.

/// Section-sign color escape used by the wire protocol.
pub const COLOR_CHAR: char = '§';

/// Chat colors used for locally generated notices.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Color {
    Red,
    Yellow,
    Gray,
}

impl Color {
    pub fn code(self) -> char {
        match self {
            Color::Red => 'c',
            Color::Yellow => 'e',
            Color::Gray => '7',
        }
    }

    /// Prefixes the text with this color's escape.
    pub fn wrap(self, text: &str) -> String {
        format!("{}{}{}", COLOR_CHAR, self.code(), text)
    }
}

/// A decoded join/left broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedMessage {
    pub username: String,
    pub joined: bool,
}

/// Parses the vanilla `§e<name> joined the game.` broadcast. Anything else
/// is raw chat and returns `None`.
pub fn decode_joined(message: &str) -> Option<JoinedMessage> {
    let mut chars = message.chars();
    if chars.next()? != COLOR_CHAR {
        return None;
    }
    chars.next()?;
    let rest = chars.as_str();

    let (username, joined) = if let Some(name) = rest.strip_suffix(" joined the game.") {
        (name, true)
    } else if let Some(name) = rest.strip_suffix(" left the game.") {
        (name, false)
    } else {
        return None;
    };

    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == COLOR_CHAR)
    {
        return None;
    }

    Some(JoinedMessage {
        username: username.to_owned(),
        joined,
    })
}

/// Strips all `§x` color escapes.
pub fn strip_colors(message: &str) -> String {
    let mut clean = String::with_capacity(message.len());
    let mut chars = message.chars();
    while let Some(c) = chars.next() {
        if c == COLOR_CHAR {
            chars.next();
        } else {
            clean.push(c);
        }
    }
    clean
}

/// Whether the (color-stripped) line is formatted player chat.
pub fn is_player_chat(message: &str) -> bool {
    message.starts_with('<') && message.contains("> ")
}

/// Whether the (color-stripped) line is a console relay, `[Server:…]`.
pub fn is_console_chat(message: &str) -> bool {
    message.starts_with("[Server:") && message.ends_with(']')
}

/// Drops a dangling color escape left at the end of a line.
pub fn trim_dangling_color(message: &str) -> &str {
    message.strip_suffix(COLOR_CHAR).unwrap_or(message)
}
