//! Per-opcode policy hooks.
//!
//! Each handler is invoked with the reader positioned just past the opcode
//! byte and must either re-emit a complete packet, emit a substitute, or
//! consume the packet entirely. Policy denials are handled here and never
//! propagate; only I/O and framing failures abort the tunnel.

use crate::{
    coordinate::{Coordinate, Dimension},
    message,
    message::Color,
    protocol,
    tunnel::{Tunnel, TunnelError},
};

const BLOCK_DESTROYED_STATUS: i8 = 2;
const CHEST_BLOCK_ID: i16 = 54;
const CHEST_WINDOW_TYPE: i8 = 0;
/// Highest item id that is a placeable block.
const MAX_BLOCK_ITEM_ID: i16 = 94;
/// Prefix of a disconnect reason that is really a server-list ping.
const PING_SENTINEL: &str = "§1";

impl Tunnel {
    /// 0x01 Login. The response carries the entity id, world and dimension;
    /// the advertised player cap is replaced with the configured one.
    pub(crate) async fn handle_login(&mut self, opcode: u8) -> Result<(), TunnelError> {
        self.writer.write_u8(opcode);
        if !self.direction.from_server() {
            self.copy_i32().await?;
            self.copy_utf16().await?;
            self.copy_bytes(5).await?;
            return Ok(());
        }

        let entity_id = self.copy_i32().await?;
        self.session.set_entity_id(entity_id);
        let level_type = self.copy_utf16().await?;
        self.session.set_level_type(&level_type);
        self.copy_i8().await?; // game mode
        let dimension = self.reader.read_i8().await?;
        self.session.set_dimension(Dimension::from_id(dimension.into()));
        self.writer.write_i8(dimension);
        self.copy_i8().await?; // difficulty
        self.copy_i8().await?; // world height
        self.reader.read_i8().await?;
        self.writer.write_i8(self.server.config.max_players as i8);
        Ok(())
    }

    /// 0x02 Handshake. Settles the player name: strip a `;` suffix, run the
    /// pending-auth / guest flow when needed, and re-emit the handshake with
    /// the final name. The name is final once this returns.
    pub(crate) async fn handle_handshake(&mut self, opcode: u8) -> Result<(), TunnelError> {
        let version = self.reader.read_i8().await?;
        let mut name = self.reader.read_utf16().await?;
        if let Some(split) = name.find(';') {
            name.truncate(split);
        }

        if name == "Player" || !self.server.authenticator.is_minecraft_up() {
            let request = self.server.authenticator.auth_request(self.session.ip());
            let mut verified = false;
            if let Some(request) = &request {
                name = request.player_name.clone();
                verified = self
                    .server
                    .authenticator
                    .complete_login(request, &self.session);
            }
            if !verified {
                if name != "Player" {
                    self.notify(Color::Red, "Login verification failed.");
                    self.notify(Color::Red, "You were logged in as guest.");
                }
                name = self.server.authenticator.free_guest_name();
                self.session.set_guest(true);
            }
            self.session.set_name(&name);
        } else {
            self.session.set_name(&name);
        }

        if self.session.is_guest() && !self.server.authenticator.allow_guest_join() {
            let reason = self
                .server
                .translator
                .tr("Failed to login: User not authenticated");
            self.session.kick(reason);
        }

        self.writer.write_u8(opcode);
        self.writer.write_i8(version);
        let final_name = self.session.name();
        self.writer.write_utf16(&final_name);
        self.copy_utf16().await?;
        self.copy_i32().await?;
        Ok(())
    }

    /// 0x03 Chat. Join/left broadcasts become local notices (or vanish for
    /// bots); raw server chat is filtered and optionally re-wrapped; raw
    /// client chat is gated on mute state and routed through the command
    /// processor when it starts with the command prefix.
    pub(crate) async fn handle_chat(&mut self, opcode: u8) -> Result<(), TunnelError> {
        let text = self.reader.read_utf16().await?;

        if let Some(joined) = message::decode_joined(&text) {
            if self.direction.from_server() && !self.server.bots.is_bot(&joined.username) {
                let verb = if joined.joined { "joined" } else { "left" };
                self.notify(
                    Color::Yellow,
                    &format!("{} {verb} the game.", joined.username),
                );
            }
            return Ok(());
        }

        if self.direction.from_server() {
            if !self.server.config.use_msg_formats {
                return Ok(());
            }
            if self.server.config.forward_chat && self.server.was_forwarded(&text) {
                return Ok(());
            }

            let clean = message::strip_colors(&text);
            if !message::is_player_chat(&clean)
                && message::is_console_chat(&clean)
                && !self.server.config.chat_console_to_ops
            {
                return Ok(());
            }

            if self.server.config.msg_wrap {
                self.send_chat(&text);
            } else {
                self.writer.write_u8(opcode);
                self.writer.write_utf16(&text);
            }
            return Ok(());
        }

        if self.session.is_muted() && !text.starts_with('/') && !text.starts_with('!') {
            self.notify(
                Color::Red,
                "You are muted! You may not send messages to all players.",
            );
            return Ok(());
        }

        if text.chars().next() == Some(self.command_prefix) {
            if let Some(rewritten) = self.server.commands.process(&self.session, &text) {
                self.writer.write_u8(opcode);
                self.writer.write_utf16(&rewritten);
            }
            return Ok(());
        }

        // Plain chat is re-queued so the forward drain owns its delivery.
        self.session.add_forward(text);
        Ok(())
    }

    /// 0x06 Spawn Position.
    pub(crate) async fn handle_spawn_position(&mut self, opcode: u8) -> Result<(), TunnelError> {
        self.writer.write_u8(opcode);
        self.copy_bytes(12).await?;
        if self.server.config.enable_events {
            self.server.events.player_connected(&self.session);
        }
        Ok(())
    }

    /// 0x07 Use Entity. Interactions aimed at a god-mode player are
    /// swallowed, trailing flag included.
    pub(crate) async fn handle_use_entity(&mut self, opcode: u8) -> Result<(), TunnelError> {
        let user = self.reader.read_i32().await?;
        let target = self.reader.read_i32().await?;
        if let Some(target_player) = self.server.players.find_by_entity_id(target) {
            if target_player.god_mode() {
                self.reader.read_bool().await?;
                return Ok(());
            }
        }
        self.writer.write_u8(opcode);
        self.writer.write_i32(user);
        self.writer.write_i32(target);
        self.copy_bytes(1).await?;
        Ok(())
    }

    /// 0x09 Respawn. Client-side respawns carry no payload in this protocol
    /// generation; server-side ones update the tracked dimension.
    pub(crate) async fn handle_respawn(&mut self, opcode: u8) -> Result<(), TunnelError> {
        self.writer.write_u8(opcode);
        if !self.direction.from_server() {
            return Ok(());
        }
        let dimension = self.copy_i32().await?;
        self.session.set_dimension(Dimension::from_id(dimension));
        self.copy_i8().await?;
        self.copy_i8().await?;
        self.copy_i16().await?;
        self.copy_utf16().await?; // level type
        if self.server.config.enable_events {
            self.server.events.player_respawned(&self.session);
        }
        Ok(())
    }

    /// 0x0A Player (on-ground flag). The first one from the client marks
    /// the player in-game: deliver the MOTD and optionally the player list.
    pub(crate) async fn handle_flying(&mut self, opcode: u8) -> Result<(), TunnelError> {
        self.writer.write_u8(opcode);
        self.copy_bytes(1).await?;
        if !self.in_game && !self.direction.from_server() {
            for line in self.server.config.motd.lines() {
                self.session.add_message(line);
            }
            if self.server.config.show_list_on_connect {
                let command = format!(
                    "{}{}",
                    self.command_prefix, self.server.config.player_list_command
                );
                self.server.commands.process(&self.session, &command);
            }
            self.in_game = true;
        }
        Ok(())
    }

    /// 0x0B Player Position.
    pub(crate) async fn handle_position(&mut self, opcode: u8) -> Result<(), TunnelError> {
        self.writer.write_u8(opcode);
        self.copy_player_location().await?;
        self.copy_bytes(1).await?;
        Ok(())
    }

    /// 0x0C Player Look.
    pub(crate) async fn handle_look(&mut self, opcode: u8) -> Result<(), TunnelError> {
        self.writer.write_u8(opcode);
        self.copy_player_look().await?;
        self.copy_bytes(1).await?;
        Ok(())
    }

    /// 0x0D Player Position & Look.
    pub(crate) async fn handle_position_look(&mut self, opcode: u8) -> Result<(), TunnelError> {
        self.writer.write_u8(opcode);
        self.copy_player_location().await?;
        self.copy_player_look().await?;
        self.copy_bytes(1).await?;
        Ok(())
    }

    async fn copy_player_location(&mut self) -> Result<(), TunnelError> {
        let x = self.reader.read_f64().await?;
        let y = self.reader.read_f64().await?;
        let stance = self.reader.read_f64().await?;
        let z = self.reader.read_f64().await?;
        self.session.update_position(x, y, z, stance);
        if self.server.config.enable_events {
            self.server.events.location_checked(&self.session);
        }
        self.writer.write_f64(x);
        self.writer.write_f64(y);
        self.writer.write_f64(stance);
        self.writer.write_f64(z);
        Ok(())
    }

    async fn copy_player_look(&mut self) -> Result<(), TunnelError> {
        let yaw = self.reader.read_f32().await?;
        let pitch = self.reader.read_f32().await?;
        self.session.update_look(yaw, pitch);
        self.writer.write_f32(yaw);
        self.writer.write_f32(pitch);
        Ok(())
    }

    /// 0x0E Player Digging. Client digs are gated on area permissions and
    /// chest locks; destroying a locked chest the player may open releases
    /// the lock.
    pub(crate) async fn handle_dig(&mut self, opcode: u8) -> Result<(), TunnelError> {
        if self.direction.from_server() {
            self.writer.write_u8(opcode);
            self.copy_bytes(11).await?;
            return Ok(());
        }

        let status = self.reader.read_i8().await?;
        let x = self.reader.read_i32().await?;
        let y = self.reader.read_i8().await?;
        let z = self.reader.read_i32().await?;
        let face = self.reader.read_i8().await?;
        let coordinate = Coordinate::new(x, y, z, self.session.dimension());

        if !self.server.permissions.ignores_areas(&self.session) {
            let perm = self
                .server
                .permissions
                .block_permission(&self.session, coordinate, None);
            if !perm.can_use && status == 0 {
                self.notify(Color::Red, "You can not use this block here!");
                return Ok(());
            }
            if !perm.can_destroy && status == BLOCK_DESTROYED_STATUS {
                self.notify(Color::Red, "You can not destroy this block!");
                return Ok(());
            }
        }

        let locked = self.server.chests.is_locked(coordinate);
        if !locked
            || self.server.permissions.ignores_chest_locks(&self.session)
            || self.server.chests.can_open(&self.session, coordinate)
        {
            if locked && status == BLOCK_DESTROYED_STATUS {
                self.server.chests.release_lock(coordinate);
                self.server.save_chests();
            }

            self.writer.write_u8(opcode);
            self.writer.write_i8(status);
            self.writer.write_i32(x);
            self.writer.write_i8(y);
            self.writer.write_i32(z);
            self.writer.write_i8(face);

            if self.session.instant_destroy() {
                self.packet_finished();
                self.writer.write_u8(opcode);
                self.writer.write_i8(BLOCK_DESTROYED_STATUS);
                self.writer.write_i32(x);
                self.writer.write_i8(y);
                self.writer.write_i32(z);
                self.writer.write_i8(face);
            }

            if status == BLOCK_DESTROYED_STATUS {
                self.session.destroyed_block();
            }
        }
        Ok(())
    }

    /// 0x0F Player Block Placement. Evaluates placement permission with the
    /// held item; denial drops the packet and emits a synthetic drop-item
    /// dig so the client's held-item state stays in sync with the server.
    /// Placing a chest records the target coordinate for the confirming
    /// block change.
    pub(crate) async fn handle_place(&mut self, opcode: u8) -> Result<(), TunnelError> {
        let x = self.reader.read_i32().await?;
        let y = self.reader.read_i8().await?;
        let z = self.reader.read_i32().await?;
        let direction = self.reader.read_i8().await?;
        let held_item = self.reader.read_i16().await?;
        let coordinate = Coordinate::new(x, y, z, self.session.dimension());

        let mut held_fields: Option<(i8, i16, Option<Vec<u8>>)> = None;
        if held_item != -1 {
            let item_count = self.reader.read_i8().await?;
            let uses = self.reader.read_i16().await?;
            let nbt_length = self.reader.read_i16().await?;
            let mut nbt = None;
            if nbt_length != -1 {
                let mut bytes = vec![0u8; self.checked_len(opcode, nbt_length)?];
                self.reader.read_exact(&mut bytes).await?;
                nbt = Some(bytes);
            }
            held_fields = Some((item_count, uses, nbt));
        }
        let block_x = self.reader.read_i8().await?;
        let block_y = self.reader.read_i8().await?;
        let block_z = self.reader.read_i8().await?;

        let mut write_packet = true;
        let mut drop_held = false;

        let perm = self
            .server
            .permissions
            .block_permission(&self.session, coordinate, Some(held_item));

        if self.server.config.enable_events {
            // The block above the placement; saturate so the top of the
            // world does not wrap to a negative height.
            let button = Coordinate::new(
                x + i32::from(x < 0),
                y.saturating_add(1),
                z + i32::from(z < 0),
                self.session.dimension(),
            );
            self.server.events.button_checked(&self.session, button);
        }

        if self.direction.from_server() || self.server.chests.is_chest(coordinate) {
            // Chest interactions are judged by the open-window hook.
        } else if !self.server.permissions.ignores_areas(&self.session)
            && ((held_item != -1 && !perm.can_place) || !perm.can_use)
        {
            if !perm.can_use {
                self.notify(Color::Red, "You can not use this block here!");
            } else {
                self.notify(Color::Red, "You can not place this block here!");
            }
            write_packet = false;
            drop_held = true;
        } else if held_item == CHEST_BLOCK_ID {
            let target = coordinate.offset_face(direction);
            let adjacent = self.server.chests.adjacent_chest(target);
            match adjacent {
                Some(adjacent)
                    if !adjacent.is_open() && !adjacent.owned_by(&self.session.name()) =>
                {
                    self.notify(Color::Red, "The adjacent chest is locked!");
                    write_packet = false;
                    drop_held = true;
                }
                _ => self.session.placing_chest(Some(target)),
            }
        }

        if write_packet {
            self.writer.write_u8(opcode);
            self.writer.write_i32(x);
            self.writer.write_i8(y);
            self.writer.write_i32(z);
            self.writer.write_i8(direction);
            self.writer.write_i16(held_item);
            if let Some((item_count, uses, nbt)) = &held_fields {
                self.writer.write_i8(*item_count);
                self.writer.write_i16(*uses);
                match nbt {
                    Some(bytes) => {
                        self.writer.write_i16(bytes.len() as i16);
                        self.writer.write_slice(bytes);
                    }
                    None => {
                        self.writer.write_i16(-1);
                    }
                }
                if held_item <= MAX_BLOCK_ITEM_ID && direction >= 0 {
                    self.session.placed_block();
                }
            }
            self.writer.write_i8(block_x);
            self.writer.write_i8(block_y);
            self.writer.write_i8(block_z);

            self.session.opening_chest(Some(coordinate));
        } else if drop_held {
            // Synthetic drop-item dig keeps client and server in sync
            // about what is actually in hand.
            self.writer.write_u8(0x0e);
            self.writer.write_i8(4);
            self.writer.write_i32(x);
            self.writer.write_i8(y);
            self.writer.write_i32(z);
            self.writer.write_i8(direction);
        }
        Ok(())
    }

    /// 0x14 Named Entity Spawn. Spawns of registered bots are suppressed,
    /// trailing metadata included.
    pub(crate) async fn handle_named_entity_spawn(
        &mut self,
        opcode: u8,
    ) -> Result<(), TunnelError> {
        let entity_id = self.reader.read_i32().await?;
        let name = self.reader.read_utf16().await?;
        if self.server.bots.is_bot(&name) {
            self.skip_bytes(16).await?;
            self.skip_metadata().await?;
        } else {
            self.writer.write_u8(opcode);
            self.writer.write_i32(entity_id);
            self.writer.write_utf16(&name);
            self.copy_bytes(16).await?;
            self.copy_metadata().await?;
        }
        Ok(())
    }

    /// 0x35 Block Change. A chest appearing at the coordinate the player
    /// was placing one confirms the placement and runs the lock protocol.
    pub(crate) async fn handle_block_change(&mut self, opcode: u8) -> Result<(), TunnelError> {
        self.writer.write_u8(opcode);
        let x = self.reader.read_i32().await?;
        let y = self.reader.read_i8().await?;
        let z = self.reader.read_i32().await?;
        let block_type = self.reader.read_i16().await?;
        let metadata = self.reader.read_i8().await?;
        let coordinate = Coordinate::new(x, y, z, self.session.dimension());

        if block_type == CHEST_BLOCK_ID && self.session.placed_chest(coordinate) {
            self.lock_chest(coordinate);
            self.session.placing_chest(None);
        }

        self.writer.write_i32(x);
        self.writer.write_i8(y);
        self.writer.write_i32(z);
        self.writer.write_i16(block_type);
        self.writer.write_i8(metadata);
        Ok(())
    }

    /// Runs the lock protocol for a freshly confirmed chest. A closed
    /// adjacent chest extends its lock (double chests share one owner);
    /// otherwise an explicit lock request wins; otherwise the chest is
    /// registered open. Every transition is persisted.
    pub(crate) fn lock_chest(&mut self, coordinate: Coordinate) {
        let adjacent = self.server.chests.adjacent_chest(coordinate);
        let adjacent_locked = adjacent.as_ref().is_some_and(|chest| !chest.is_open());

        if self.session.is_attempting_lock() || adjacent_locked {
            match adjacent.as_ref().filter(|chest| !chest.is_open()) {
                Some(locked_adjacent) => {
                    if let Some(owner) = &locked_adjacent.owner {
                        self.server
                            .chests
                            .give_lock(owner, coordinate, locked_adjacent.label.clone());
                    }
                }
                None => {
                    let owner = self.session.name();
                    if let Some(adjacent) = &adjacent {
                        self.server.chests.give_lock(
                            &owner,
                            adjacent.coordinate,
                            self.session.next_chest_label(),
                        );
                    }
                    self.server
                        .chests
                        .give_lock(&owner, coordinate, self.session.next_chest_label());
                }
            }
            self.session.set_chest_action(None);
            self.notify(Color::Gray, "This chest is now locked.");
        } else if !self.server.chests.is_chest(coordinate) {
            self.server.chests.add_open(coordinate);
        }
        self.server.save_chests();
    }

    /// 0x64 Open Window. For chest windows: register or inherit the lock,
    /// evaluate chest permissions (both halves of a double chest), apply a
    /// pending lock/unlock request, and rewrite the window title. Denial
    /// replies with a close-window packet instead of forwarding.
    pub(crate) async fn handle_open_window(&mut self, opcode: u8) -> Result<(), TunnelError> {
        let window_id = self.reader.read_i8().await?;
        let window_type = self.reader.read_i8().await?;
        let mut title = self.reader.read_utf16().await?;
        let slots = self.reader.read_i8().await?;
        let use_title = self.reader.read_u8().await?;
        let mut horse_entity = 0i32;
        if window_type == 11 {
            horse_entity = self.reader.read_i32().await?;
        }

        let mut allow = true;
        if window_type == CHEST_WINDOW_TYPE {
            if let Some(opened) = self.session.opened_chest() {
                let adjacent = self.server.chests.adjacent_chest(opened);
                if !self.server.chests.is_chest(opened) {
                    match adjacent.as_ref().and_then(|chest| chest.owner.as_deref()) {
                        Some(owner) => {
                            let label = adjacent.as_ref().and_then(|chest| chest.label.clone());
                            self.server.chests.give_lock(owner, opened, label);
                        }
                        None => self.server.chests.add_open(opened),
                    }
                    self.server.save_chests();
                }

                let chest_denied = !self.server.permissions.ignores_areas(&self.session)
                    && (!self
                        .server
                        .permissions
                        .block_permission(&self.session, opened, None)
                        .chest
                        || adjacent.as_ref().is_some_and(|chest| {
                            !self
                                .server
                                .permissions
                                .block_permission(&self.session, chest.coordinate, None)
                                .chest
                        }));

                if chest_denied {
                    self.notify(Color::Red, "You can't use chests here");
                    allow = false;
                } else if self.server.chests.can_open(&self.session, opened)
                    || self.server.permissions.ignores_chest_locks(&self.session)
                {
                    if self.server.chests.is_locked(opened) {
                        if self.session.is_attempting_unlock() {
                            self.server.chests.unlock(opened);
                            self.server.save_chests();
                            self.session.set_chest_action(None);
                            self.notify(Color::Red, "This chest is no longer locked!");
                            title = self.server.translator.tr("Open Chest");
                        } else {
                            title = self
                                .server
                                .chests
                                .chest_label(opened)
                                .unwrap_or_else(|| self.server.translator.tr("Locked Chest"));
                        }
                    } else {
                        title = self.server.translator.tr("Open Chest");
                        if self.session.is_attempting_lock() {
                            self.lock_chest(opened);
                            title = self
                                .session
                                .next_chest_label()
                                .unwrap_or_else(|| self.server.translator.tr("Locked Chest"));
                        }
                    }
                } else {
                    self.notify(Color::Red, "This chest is locked!");
                    allow = false;
                }
            }
        }

        if !allow {
            self.writer.write_u8(0x65);
            self.writer.write_i8(window_id);
        } else {
            self.writer.write_u8(opcode);
            self.writer.write_i8(window_id);
            self.writer.write_i8(window_type);
            self.writer.write_utf16(&title);
            self.writer.write_i8(slots);
            self.writer.write_u8(use_title);
            if window_type == 11 {
                self.writer.write_i32(horse_entity);
            }
        }
        Ok(())
    }

    /// 0xFC Encryption Response. Client→server responses are verified
    /// against the client context and may trigger premium auth; both
    /// directions re-emit the server-context key material and then swap
    /// this tunnel's reader and writer onto the encrypted layers.
    pub(crate) async fn handle_encryption_response(
        &mut self,
        opcode: u8,
    ) -> Result<(), TunnelError> {
        let key_length = self.reader.read_i16().await?;
        let mut shared_key = vec![0u8; self.checked_len(opcode, key_length)?];
        self.reader.read_exact(&mut shared_key).await?;
        let response_length = self.reader.read_i16().await?;
        let mut challenge_response = vec![0u8; self.checked_len(opcode, response_length)?];
        self.reader.read_exact(&mut challenge_response).await?;

        if !self.direction.from_server() {
            if !self
                .session
                .client_encryption
                .check_challenge_token(&challenge_response)
            {
                self.session.kick("Invalid client response");
                return Ok(());
            }
            self.session
                .client_encryption
                .set_encrypted_shared_key(&shared_key);
            shared_key = self.session.server_encryption.encrypted_shared_key();

            if self.server.authenticator.use_cust_auth(&self.session)
                && !self.server.authenticator.online_authenticate(&self.session)
            {
                let reason = self
                    .server
                    .translator
                    .tr("[CustAuth] Failed to login: User not premium");
                self.session.kick(reason);
                return Ok(());
            }
        }

        self.writer.write_u8(opcode);
        self.writer.write_i16(shared_key.len() as i16);
        self.writer.write_slice(&shared_key);
        let challenge = self.session.server_encryption.encrypt_challenge_token();
        self.writer.write_i16(challenge.len() as i16);
        self.writer.write_slice(&challenge);

        // Swap both halves onto the encrypted layers. The response above is
        // already buffered as plaintext; only later bytes are ciphered.
        let (read_context, write_context) = if self.direction.from_server() {
            (&self.session.server_encryption, &self.session.client_encryption)
        } else {
            (&self.session.client_encryption, &self.session.server_encryption)
        };
        let read_key = read_context.shared_secret().map_err(TunnelError::Upgrade)?;
        let write_key = write_context.shared_secret().map_err(TunnelError::Upgrade)?;
        self.reader.install_cipher(read_key);
        self.writer.install_cipher(write_key);
        Ok(())
    }

    /// 0xFD Encryption Request (server→client). Stores the server's key
    /// material in the server-side context and reflects the client-side
    /// public key and token back to the client.
    pub(crate) async fn handle_encryption_request(
        &mut self,
        opcode: u8,
    ) -> Result<(), TunnelError> {
        self.writer.write_u8(opcode);
        let _upstream_id = self.reader.read_utf16().await?;
        let server_id = if self.server.authenticator.use_cust_auth(&self.session) {
            self.session.connection_hash()
        } else {
            "-".to_owned()
        };
        self.writer.write_utf16(&server_id);

        let key_length = self.reader.read_i16().await?;
        let mut public_key = vec![0u8; self.checked_len(opcode, key_length)?];
        self.reader.read_exact(&mut public_key).await?;
        let token_length = self.reader.read_i16().await?;
        let mut challenge_token = vec![0u8; self.checked_len(opcode, token_length)?];
        self.reader.read_exact(&mut challenge_token).await?;

        self.session.server_encryption.set_public_key(&public_key);
        let client_key = self.session.client_encryption.public_key();
        self.writer.write_i16(client_key.len() as i16);
        self.writer.write_slice(&client_key);
        self.writer.write_i16(challenge_token.len() as i16);
        self.writer.write_slice(&challenge_token);
        self.session
            .server_encryption
            .set_challenge_token(&challenge_token);
        self.session
            .client_encryption
            .set_challenge_token(&challenge_token);
        Ok(())
    }

    /// 0xFF Disconnect. Ping probes get the standard five-field reply;
    /// "Took too long" marks the session as a robot. Either way the
    /// session closes.
    pub(crate) async fn handle_disconnect(&mut self, opcode: u8) -> Result<(), TunnelError> {
        self.writer.write_u8(opcode);
        let mut reason = self.reader.read_utf16().await?;
        if reason.starts_with(PING_SENTINEL) {
            reason = format!(
                "{PING_SENTINEL}\0{}\0{}\0{}\0{}\0{}",
                protocol::PROTOCOL_VERSION,
                protocol::GAME_VERSION,
                self.server.config.server_description,
                self.server.players.count(),
                self.server.config.max_players,
            );
        }
        self.writer.write_utf16(&reason);
        if reason.starts_with("Took too long") {
            self.session.set_robot(true);
        }
        self.session.close();
        Ok(())
    }
}
