//! Player-facing message translation supplied by the host.

pub trait Translate: Send + Sync {
    fn tr(&self, phrase: &str) -> String;
}

/// English pass-through used when the host supplies no translations.
pub struct Identity;

impl Translate for Identity {
    fn tr(&self, phrase: &str) -> String {
        phrase.to_owned()
    }
}
