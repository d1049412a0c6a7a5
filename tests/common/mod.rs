//! Mock collaborators and plumbing for driving whole tunnels in-memory.

use minecraft_warden_proxy::{
    auth::{AuthRequest, Authenticator, EncryptionContext},
    command::CommandProcessor,
    config::Config,
    coordinate::Coordinate,
    event::EventHost,
    permission::{BlockPermission, PermissionConfig},
    registry::{BotRegistry, ChestInfo, ChestRegistry, PlayerDirectory},
    server::{HostServices, Server},
    session::Session,
    translate::Identity,
    tunnel::{Direction, Tunnel},
};
use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr},
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub struct MockAuth {
    pub minecraft_up: bool,
    pub request: Option<AuthRequest>,
    pub complete_login: bool,
    pub guest_name: String,
    pub allow_guests: bool,
    pub cust_auth: bool,
    pub online_ok: bool,
}

impl Default for MockAuth {
    fn default() -> Self {
        Self {
            minecraft_up: true,
            request: None,
            complete_login: false,
            guest_name: "Guest1".to_owned(),
            allow_guests: true,
            cust_auth: false,
            online_ok: true,
        }
    }
}

impl Authenticator for MockAuth {
    fn auth_request(&self, _ip: IpAddr) -> Option<AuthRequest> {
        self.request.clone()
    }

    fn complete_login(&self, request: &AuthRequest, session: &Session) -> bool {
        if self.complete_login {
            session.set_name(&request.player_name);
        }
        self.complete_login
    }

    fn free_guest_name(&self) -> String {
        self.guest_name.clone()
    }

    fn allow_guest_join(&self) -> bool {
        self.allow_guests
    }

    fn use_cust_auth(&self, _session: &Session) -> bool {
        self.cust_auth
    }

    fn online_authenticate(&self, _session: &Session) -> bool {
        self.online_ok
    }

    fn is_minecraft_up(&self) -> bool {
        self.minecraft_up
    }
}

/// Encryption context with canned key material; no real RSA involved.
#[derive(Default)]
pub struct MockContext {
    pub public: Vec<u8>,
    pub token: Mutex<Vec<u8>>,
    pub encrypted_key: Mutex<Vec<u8>>,
    pub challenge_out: Vec<u8>,
    pub secret: Option<[u8; 16]>,
}

impl EncryptionContext for MockContext {
    fn set_public_key(&self, _key: &[u8]) {}

    fn public_key(&self) -> Vec<u8> {
        self.public.clone()
    }

    fn set_challenge_token(&self, token: &[u8]) {
        *self.token.lock().unwrap() = token.to_vec();
    }

    fn check_challenge_token(&self, response: &[u8]) -> bool {
        *self.token.lock().unwrap() == response
    }

    fn encrypt_challenge_token(&self) -> Vec<u8> {
        self.challenge_out.clone()
    }

    fn set_encrypted_shared_key(&self, key: &[u8]) {
        *self.encrypted_key.lock().unwrap() = key.to_vec();
    }

    fn encrypted_shared_key(&self) -> Vec<u8> {
        self.encrypted_key.lock().unwrap().clone()
    }

    fn shared_secret(&self) -> anyhow::Result<[u8; 16]> {
        self.secret
            .ok_or_else(|| anyhow::anyhow!("no shared secret configured"))
    }
}

/// In-memory chest registry with horizontal adjacency.
#[derive(Default)]
pub struct MemoryChests {
    chests: Mutex<HashMap<Coordinate, (Option<String>, Option<String>)>>,
    saves: AtomicU32,
}

impl MemoryChests {
    pub fn insert(&self, coordinate: Coordinate, owner: Option<&str>, label: Option<&str>) {
        self.chests.lock().unwrap().insert(
            coordinate,
            (owner.map(str::to_owned), label.map(str::to_owned)),
        );
    }

    pub fn get(&self, coordinate: Coordinate) -> Option<(Option<String>, Option<String>)> {
        self.chests.lock().unwrap().get(&coordinate).cloned()
    }

    pub fn save_count(&self) -> u32 {
        self.saves.load(Ordering::Relaxed)
    }
}

impl ChestRegistry for MemoryChests {
    fn is_chest(&self, coordinate: Coordinate) -> bool {
        self.chests.lock().unwrap().contains_key(&coordinate)
    }

    fn is_locked(&self, coordinate: Coordinate) -> bool {
        matches!(
            self.chests.lock().unwrap().get(&coordinate),
            Some((Some(_), _))
        )
    }

    fn can_open(&self, session: &Session, coordinate: Coordinate) -> bool {
        match self.chests.lock().unwrap().get(&coordinate) {
            Some((Some(owner), _)) => *owner == session.name(),
            _ => true,
        }
    }

    fn adjacent_chest(&self, coordinate: Coordinate) -> Option<ChestInfo> {
        let map = self.chests.lock().unwrap();
        let Coordinate { x, y, z, dimension } = coordinate;
        [
            Coordinate::new(x - 1, y, z, dimension),
            Coordinate::new(x + 1, y, z, dimension),
            Coordinate::new(x, y, z - 1, dimension),
            Coordinate::new(x, y, z + 1, dimension),
        ]
        .into_iter()
        .find_map(|neighbor| {
            map.get(&neighbor).map(|(owner, label)| ChestInfo {
                coordinate: neighbor,
                owner: owner.clone(),
                label: label.clone(),
            })
        })
    }

    fn add_open(&self, coordinate: Coordinate) {
        self.chests.lock().unwrap().insert(coordinate, (None, None));
    }

    fn give_lock(&self, owner: &str, coordinate: Coordinate, label: Option<String>) {
        self.chests
            .lock()
            .unwrap()
            .insert(coordinate, (Some(owner.to_owned()), label));
    }

    fn release_lock(&self, coordinate: Coordinate) {
        self.chests.lock().unwrap().remove(&coordinate);
    }

    fn unlock(&self, coordinate: Coordinate) {
        self.chests.lock().unwrap().insert(coordinate, (None, None));
    }

    fn rename(&self, coordinate: Coordinate, label: &str) {
        if let Some(entry) = self.chests.lock().unwrap().get_mut(&coordinate) {
            entry.1 = Some(label.to_owned());
        }
    }

    fn chest_label(&self, coordinate: Coordinate) -> Option<String> {
        self.chests
            .lock()
            .unwrap()
            .get(&coordinate)
            .and_then(|(_, label)| label.clone())
    }

    fn save(&self) -> anyhow::Result<()> {
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockBots(pub Vec<String>);

impl BotRegistry for MockBots {
    fn is_bot(&self, name: &str) -> bool {
        self.0.iter().any(|bot| bot == name)
    }
}

#[derive(Default)]
pub struct MockDirectory(pub Mutex<Vec<Arc<Session>>>);

impl PlayerDirectory for MockDirectory {
    fn find_by_entity_id(&self, entity_id: i32) -> Option<Arc<Session>> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .find(|session| session.entity_id() == entity_id)
            .cloned()
    }

    fn count(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

pub struct MockPermissions {
    pub perm: BlockPermission,
    pub ignores_areas: bool,
    pub ignores_chest_locks: bool,
}

impl Default for MockPermissions {
    fn default() -> Self {
        Self {
            perm: BlockPermission {
                can_use: true,
                can_destroy: true,
                can_place: true,
                chest: true,
            },
            ignores_areas: false,
            ignores_chest_locks: false,
        }
    }
}

impl PermissionConfig for MockPermissions {
    fn block_permission(
        &self,
        _session: &Session,
        _coordinate: Coordinate,
        _item: Option<i16>,
    ) -> BlockPermission {
        self.perm
    }

    fn ignores_areas(&self, _session: &Session) -> bool {
        self.ignores_areas
    }

    fn ignores_chest_locks(&self, _session: &Session) -> bool {
        self.ignores_chest_locks
    }
}

#[derive(Default)]
pub struct MockCommands {
    pub response: Option<String>,
    pub calls: Mutex<Vec<String>>,
}

impl CommandProcessor for MockCommands {
    fn process(&self, _session: &Arc<Session>, message: &str) -> Option<String> {
        self.calls.lock().unwrap().push(message.to_owned());
        self.response.clone()
    }
}

pub struct MockEvents;

impl EventHost for MockEvents {
    fn player_connected(&self, _session: &Arc<Session>) {}
    fn player_respawned(&self, _session: &Arc<Session>) {}
    fn location_checked(&self, _session: &Arc<Session>) {}
    fn button_checked(&self, _session: &Arc<Session>, _coordinate: Coordinate) {}
}

/// Everything a test wires a server from, with handles kept for assertions.
pub struct TestEnv {
    pub auth: Arc<MockAuth>,
    pub chests: Arc<MemoryChests>,
    pub bots: Arc<MockBots>,
    pub players: Arc<MockDirectory>,
    pub permissions: Arc<MockPermissions>,
    pub commands: Arc<MockCommands>,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self {
            auth: Arc::new(MockAuth::default()),
            chests: Arc::new(MemoryChests::default()),
            bots: Arc::new(MockBots::default()),
            players: Arc::new(MockDirectory::default()),
            permissions: Arc::new(MockPermissions::default()),
            commands: Arc::new(MockCommands::default()),
        }
    }
}

impl TestEnv {
    pub fn server(&self, config: Config) -> Arc<Server> {
        Arc::new(Server::new(
            config,
            HostServices {
                authenticator: Arc::clone(&self.auth) as _,
                chests: Arc::clone(&self.chests) as _,
                bots: Arc::clone(&self.bots) as _,
                players: Arc::clone(&self.players) as _,
                permissions: Arc::clone(&self.permissions) as _,
                commands: Arc::clone(&self.commands) as _,
                events: Arc::new(MockEvents),
                translator: Arc::new(Identity),
            },
        ))
    }
}

pub fn session_with(
    client: Arc<MockContext>,
    server: Arc<MockContext>,
) -> Arc<Session> {
    Arc::new(Session::new(
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        client,
        server,
    ))
}

pub fn plain_session() -> Arc<Session> {
    session_with(
        Arc::new(MockContext::default()),
        Arc::new(MockContext::default()),
    )
}

/// Feeds the bytes through a tunnel worker and returns everything it wrote.
/// The input pipe is closed after the last byte, so the worker exits at the
/// following read.
pub async fn run_tunnel(
    direction: Direction,
    input: &[u8],
    session: Arc<Session>,
    server: Arc<Server>,
) -> Vec<u8> {
    let (mut feed, tunnel_input) = tokio::io::duplex(1 << 20);
    let (tunnel_output, mut sink) = tokio::io::duplex(1 << 20);
    let handle = Tunnel::spawn(
        direction,
        Box::new(tunnel_input),
        Box::new(tunnel_output),
        session,
        server,
    );
    feed.write_all(input).await.unwrap();
    drop(feed);
    handle.join().await;

    let mut written = Vec::new();
    sink.read_to_end(&mut written).await.unwrap();
    written
}

/// UTF-16 wire encoding: 16-bit code-unit count, then the units.
pub fn utf16(text: &str) -> Vec<u8> {
    let mut bytes = (text.encode_utf16().count() as u16).to_be_bytes().to_vec();
    for unit in text.encode_utf16() {
        bytes.extend(unit.to_be_bytes());
    }
    bytes
}

pub fn cat(parts: &[&[u8]]) -> Vec<u8> {
    parts.concat()
}
