//! JSON session commands, handled between ticks

use tracing::{debug, info, warn};

use super::GameServer;
use crate::game::settings::MinigameKind;
use crate::game::{PlayerProfile, SessionId};
use crate::lobby::LobbyError;
use crate::ws::protocol::{ClientMsg, LobbyKind, ServerMsg, UserCommand, MAX_NICKNAME_LEN};

impl GameServer {
    pub(super) fn handle_client(&mut self, session: SessionId, msg: ClientMsg) {
        if !self.sessions.contains_key(&session) {
            warn!(session_id = %session, "Message from unknown session");
            return;
        }

        if let ClientMsg::ReadyForWorld { invite_id } = &msg {
            self.ready_for_world(session, invite_id.as_deref());
            return;
        }
        if let ClientMsg::Ping { t } = msg {
            self.send(session, &ServerMsg::Pong { t });
            return;
        }
        if self.registry.location(session).is_none() {
            self.send(session, &ServerMsg::error("not_ready", "Send ready_for_world first"));
            return;
        }

        let result = match msg {
            ClientMsg::ChatSend { text } => self.chat(session, &text),
            ClientMsg::UserCommand { command, value } => self.user_command(session, command, value),
            ClientMsg::VehicleInput {
                seq,
                actions,
                cam_rotation,
                cam_position,
            } => {
                if let Some(lobby) = self.registry.lobby_of_mut(session) {
                    lobby
                        .world_mut()
                        .vehicle_input(session, seq, actions, cam_rotation, cam_position);
                }
                Ok(())
            }
            ClientMsg::Respawn => {
                if let Some(lobby) = self.registry.lobby_of_mut(session) {
                    if !lobby.world_mut().respawn(session) {
                        debug!(session_id = %session, "Respawn ignored, player alive");
                    }
                }
                Ok(())
            }
            ClientMsg::MinigameRestart => self.registry.restart_minigame(session).map(|id| {
                info!(session_id = %session, lobby_id = %id, "Minigame restarted");
            }),
            ClientMsg::MinigameExit => self.exit_minigame(session),
            ClientMsg::ReadyForWorld { .. } | ClientMsg::Ping { .. } => Ok(()),
        };

        if let Err(err) = result {
            debug!(session_id = %session, error = %err, "Command rejected");
            self.send(session, &ServerMsg::error(err.code(), err.to_string()));
        }
    }

    fn ready_for_world(&mut self, session: SessionId, invite: Option<&str>) {
        if self.registry.location(session).is_some() {
            debug!(session_id = %session, "Duplicate ready_for_world");
            return;
        }
        let profile = PlayerProfile::new(&mut self.rng);
        let lobby = self.registry.connect(session, profile, invite);
        debug!(session_id = %session, lobby_id = %lobby, "Ready for world");
        self.publish_stats();
    }

    fn chat(&mut self, session: SessionId, text: &str) -> Result<(), LobbyError> {
        let lobby = self
            .registry
            .lobby_of_mut(session)
            .ok_or(LobbyError::UnknownSession(session))?;
        lobby.post_chat(session, text).map(|_| ())
    }

    fn user_command(
        &mut self,
        session: SessionId,
        command: UserCommand,
        value: Option<String>,
    ) -> Result<(), LobbyError> {
        match command {
            UserCommand::ChangeNickname => {
                let nickname = value.as_deref().map(str::trim).unwrap_or_default();
                let len = nickname.chars().count();
                if len == 0 || len > MAX_NICKNAME_LEN {
                    self.send(
                        session,
                        &ServerMsg::error(
                            "invalid_nickname",
                            format!("Nickname must be 1..={MAX_NICKNAME_LEN} characters"),
                        ),
                    );
                    return Ok(());
                }
                if let Some(lobby) = self.registry.lobby_of_mut(session) {
                    lobby.world_mut().set_nickname(session, nickname);
                }
                Ok(())
            }
            UserCommand::Suicide => {
                if let Some(lobby) = self.registry.lobby_of_mut(session) {
                    lobby.world_mut().suicide(session);
                }
                Ok(())
            }
            UserCommand::Race => self.enter(session, MinigameKind::Race),
            UserCommand::Deathmatch => self.enter(session, MinigameKind::Deathmatch),
            UserCommand::Hub => self.exit_minigame(session),
            UserCommand::Server => {
                self.publish_stats();
                let info = self.server_info();
                self.send(session, &ServerMsg::ServerInfo { info });
                Ok(())
            }
            UserCommand::Stats => {
                let (kills, deaths) = self
                    .registry
                    .lobby_of(session)
                    .and_then(|lobby| lobby.world().stats(session))
                    .unwrap_or_default();
                self.send(session, &ServerMsg::PlayerStats { kills, deaths });
                Ok(())
            }
        }
    }

    fn enter(&mut self, session: SessionId, kind: MinigameKind) -> Result<(), LobbyError> {
        let id = self.registry.enter_minigame(session, kind)?;
        debug!(session_id = %session, lobby_id = %id, ?kind, "Entered minigame");
        self.publish_stats();
        Ok(())
    }

    /// Back to the hub. Leaving an unfinished minigame cancels it for this client.
    fn exit_minigame(&mut self, session: SessionId) -> Result<(), LobbyError> {
        let cancelled = self
            .registry
            .lobby_of(session)
            .is_some_and(|lobby| lobby.kind() == LobbyKind::Minigame && !lobby.is_finished());
        self.registry.return_to_hub(session)?;
        if cancelled {
            self.send(session, &ServerMsg::MinigameCancel);
        }
        self.publish_stats();
        Ok(())
    }
}
