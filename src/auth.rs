//! Authentication and key-exchange collaborators supplied by the host.

use crate::session::Session;
use std::net::IpAddr;

/// A login the authenticator has pre-approved for a connecting address.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub player_name: String,
}

pub trait Authenticator: Send + Sync {
    /// Pending authentication request for the address, if any.
    fn auth_request(&self, ip: IpAddr) -> Option<AuthRequest>;

    /// Finalizes a pending request against the session. Returns whether the
    /// login was accepted.
    fn complete_login(&self, request: &AuthRequest, session: &Session) -> bool;

    /// Next unused guest name.
    fn free_guest_name(&self) -> String;

    fn allow_guest_join(&self) -> bool;

    /// Whether this session authenticates through the custom scheme.
    fn use_cust_auth(&self, session: &Session) -> bool;

    /// Verifies the session against the premium login service.
    fn online_authenticate(&self, session: &Session) -> bool;

    /// Whether the upstream login service is reachable.
    fn is_minecraft_up(&self) -> bool;
}

/// One side of the encryption handshake. Each session carries two contexts,
/// one facing the client and one facing the upstream server; RSA key
/// handling lives entirely behind this trait. Implementations synchronize
/// internally, since both tunnel workers touch both contexts.
pub trait EncryptionContext: Send + Sync {
    fn set_public_key(&self, key: &[u8]);

    fn public_key(&self) -> Vec<u8>;

    fn set_challenge_token(&self, token: &[u8]);

    /// Verifies an RSA-encrypted challenge response against the stored token.
    fn check_challenge_token(&self, response: &[u8]) -> bool;

    /// The stored challenge token encrypted under this context's public key.
    fn encrypt_challenge_token(&self) -> Vec<u8>;

    fn set_encrypted_shared_key(&self, key: &[u8]);

    fn encrypted_shared_key(&self) -> Vec<u8>;

    /// The plaintext AES key agreed for this side. Only available once key
    /// exchange has completed; the tunnels build their CFB8 stream ciphers
    /// from it.
    fn shared_secret(&self) -> anyhow::Result<[u8; 16]>;
}
