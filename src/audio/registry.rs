use dashmap::DashMap;
use futures::future::join_all;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::{
    coordinator::ResolutionCoordinator,
    events::{EventBus, SessionEvent, StopReason},
    queue::Request,
    session::{PlaybackSession, PlayerState, QueueSnapshot, ResumeOutcome, SessionSettings, SkipOutcome},
    transport::Transport,
};
use crate::error::{PlaybackError, PlaybackResult};

/// Una sesión por guild, creada bajo demanda.
///
/// Cada sesión se quita sola al terminar su cierre. La baja compara punteros:
/// una sesión vieja nunca quita a la nueva del mismo guild.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<PlaybackSession>>,
    coordinator: Arc<ResolutionCoordinator>,
    transport: Arc<dyn Transport>,
    events: EventBus,
    settings: SessionSettings,
    self_ref: Weak<SessionRegistry>,
}

impl SessionRegistry {
    pub fn new(
        coordinator: Arc<ResolutionCoordinator>,
        transport: Arc<dyn Transport>,
        events: EventBus,
        settings: SessionSettings,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            sessions: DashMap::new(),
            coordinator,
            transport,
            events,
            settings,
            self_ref: self_ref.clone(),
        })
    }

    pub fn coordinator(&self) -> &Arc<ResolutionCoordinator> {
        &self.coordinator
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn get(&self, guild: GuildId) -> Option<Arc<PlaybackSession>> {
        self.sessions.get(&guild).map(|entry| entry.value().clone())
    }

    pub fn get_or_create(&self, guild: GuildId) -> Arc<PlaybackSession> {
        self.sessions
            .entry(guild)
            .or_insert_with(|| {
                debug!("🆕 Nueva sesión para guild {}", guild);
                PlaybackSession::new(
                    guild,
                    self.coordinator.clone(),
                    self.transport.clone(),
                    self.events.clone(),
                    self.self_ref.clone(),
                    self.settings.clone(),
                )
            })
            .value()
            .clone()
    }

    /// Quita la sesión sólo si sigue siendo la registrada para el guild.
    pub fn remove(&self, guild: GuildId, session: &PlaybackSession) -> bool {
        self.sessions
            .remove_if(&guild, |_, current| std::ptr::eq(Arc::as_ptr(current), session))
            .is_some()
    }

    /// Encola en la sesión del guild; si se está cerrando, espera y crea otra.
    pub async fn enqueue(&self, guild: GuildId, request: Request) -> PlaybackResult<usize> {
        loop {
            let session = self.get_or_create(guild);
            match session.enqueue(request.clone()) {
                Err(PlaybackError::SessionClosed) => {
                    debug!("⏳ Esperando el cierre de la sesión anterior en guild {}", guild);
                    session.closed().await;
                    self.remove(guild, &session);
                }
                other => return other,
            }
        }
    }

    pub async fn stop(&self, guild: GuildId) -> PlaybackResult<()> {
        let session = self.get(guild).ok_or(PlaybackError::NothingPlaying)?;
        session.stop().await;
        Ok(())
    }

    /// El bot salió de `channel` sin pedirlo: detiene la sesión conectada ahí.
    ///
    /// Devuelve `false` si el aviso no corresponde a la sesión actual, por
    /// ejemplo el de una sesión anterior que ya se cerró.
    pub async fn voice_lost(&self, guild: GuildId, channel: ChannelId) -> bool {
        let Some(session) = self.get(guild) else {
            return false;
        };
        if session.connected_channel() != Some(channel) {
            debug!("Aviso de desconexión ajeno a la sesión actual en guild {}", guild);
            return false;
        }
        session.stop().await;
        true
    }

    pub fn pause(&self, guild: GuildId) -> PlaybackResult<()> {
        self.get(guild).ok_or(PlaybackError::NothingPlaying)?.pause()
    }

    pub fn resume(&self, guild: GuildId) -> PlaybackResult<ResumeOutcome> {
        self.get(guild).ok_or(PlaybackError::NothingPlaying)?.resume()
    }

    pub fn skip(&self, guild: GuildId) -> PlaybackResult<SkipOutcome> {
        self.get(guild).ok_or(PlaybackError::NothingPlaying)?.skip()
    }

    pub fn clear(&self, guild: GuildId) -> PlaybackResult<usize> {
        Ok(self.get(guild).ok_or(PlaybackError::NothingPlaying)?.clear())
    }

    pub fn shuffle(&self, guild: GuildId) -> PlaybackResult<usize> {
        Ok(self.get(guild).ok_or(PlaybackError::NothingPlaying)?.shuffle())
    }

    pub fn list_queue(&self, guild: GuildId) -> PlaybackResult<QueueSnapshot> {
        Ok(self.get(guild).ok_or(PlaybackError::NothingPlaying)?.list_queue())
    }

    pub fn state(&self, guild: GuildId) -> Option<PlayerState> {
        self.get(guild).map(|session| session.state())
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Detiene todas las sesiones (apagado del bot)
    pub async fn shutdown(&self) {
        let sessions: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        info!("🛑 Cerrando {} sesiones activas", sessions.len());
        join_all(
            sessions
                .iter()
                .map(|session| session.stop_with(StopReason::Shutdown)),
        )
        .await;
    }
}
