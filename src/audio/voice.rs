use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    events::CoreEvent, input::File, tracks::TrackHandle, Event, EventContext,
    EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{path::Path, sync::Arc};
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use super::transport::{PlaybackEnd, PlaybackHandle, TrackControl, Transport};
use crate::error::{PlaybackError, PlaybackResult};

type EndSignal = Arc<Mutex<Option<oneshot::Sender<PlaybackEnd>>>>;

fn signal(end: &EndSignal, outcome: PlaybackEnd) -> bool {
    match end.lock().take() {
        Some(sender) => {
            let _ = sender.send(outcome);
            true
        }
        None => false,
    }
}

/// [`Transport`] sobre songbird
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    // Aviso de fin del track actual de cada guild
    current: Arc<DashMap<GuildId, EndSignal>>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self {
            manager,
            current: Arc::new(DashMap::new()),
        }
    }
}

#[async_trait]
impl Transport for SongbirdTransport {
    async fn connect(&self, guild: GuildId, channel: ChannelId) -> PlaybackResult<()> {
        let call = self
            .manager
            .join(guild, channel)
            .await
            .map_err(|e| PlaybackError::Transport(format!("no se pudo unir al canal: {}", e)))?;

        let mut handler = call.lock().await;
        handler.remove_all_global_events();
        handler.add_global_event(
            Event::Core(CoreEvent::DriverDisconnect),
            DisconnectHandler {
                guild,
                current: self.current.clone(),
            },
        );

        info!("🔊 Conectado a {} en guild {}", channel, guild);
        Ok(())
    }

    async fn play(&self, guild: GuildId, path: &Path) -> PlaybackResult<PlaybackHandle> {
        let call = self
            .manager
            .get(guild)
            .ok_or_else(|| PlaybackError::Transport("no hay conexión de voz".into()))?;

        let track = {
            let mut handler = call.lock().await;
            handler.play_input(File::new(path.to_path_buf()).into())
        };

        let (tx, rx) = oneshot::channel();
        let end: EndSignal = Arc::new(Mutex::new(Some(tx)));

        for (event, kind) in [(TrackEvent::End, EndKind::Finished), (TrackEvent::Error, EndKind::Errored)] {
            track
                .add_event(
                    Event::Track(event),
                    TrackEndHandler {
                        guild,
                        kind,
                        end: end.clone(),
                    },
                )
                .map_err(|e| {
                    PlaybackError::Transport(format!("Error al agregar event handler: {}", e))
                })?;
        }

        self.current.insert(guild, end);

        Ok(PlaybackHandle {
            control: Arc::new(SongbirdTrack(track)),
            finished: rx,
        })
    }

    async fn disconnect(&self, guild: GuildId) {
        if let Some((_, end)) = self.current.remove(&guild) {
            signal(&end, PlaybackEnd::Disconnected);
        }

        if let Err(e) = self.manager.remove(guild).await {
            warn!("⚠️ Error al salir del canal de voz en guild {}: {}", guild, e);
        } else {
            info!("👋 Desconectado del canal de voz en guild {}", guild);
        }
    }
}

struct SongbirdTrack(TrackHandle);

impl TrackControl for SongbirdTrack {
    fn pause(&self) -> PlaybackResult<()> {
        self.0
            .pause()
            .map_err(|e| PlaybackError::Transport(e.to_string()))
    }

    fn resume(&self) -> PlaybackResult<()> {
        self.0
            .play()
            .map_err(|e| PlaybackError::Transport(e.to_string()))
    }

    fn stop(&self) {
        let _ = self.0.stop();
    }
}

#[derive(Clone, Copy)]
enum EndKind {
    Finished,
    Errored,
}

/// Handler para fin o error de un track
struct TrackEndHandler {
    guild: GuildId,
    kind: EndKind,
    end: EndSignal,
}

#[async_trait]
impl VoiceEventHandler for TrackEndHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let outcome = match self.kind {
            EndKind::Finished => PlaybackEnd::Finished,
            EndKind::Errored => {
                let reason = match ctx {
                    EventContext::Track(tracks) => tracks
                        .first()
                        .map(|(state, _)| format!("{:?}", state.playing))
                        .unwrap_or_default(),
                    _ => String::new(),
                };
                error!("❌ Error en track para guild {}: {}", self.guild, reason);
                PlaybackEnd::Errored(reason)
            }
        };

        signal(&self.end, outcome);
        Some(Event::Cancel)
    }
}

/// Handler para desconexiones del driver de voz
struct DisconnectHandler {
    guild: GuildId,
    current: Arc<DashMap<GuildId, EndSignal>>,
}

#[async_trait]
impl VoiceEventHandler for DisconnectHandler {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        warn!("🔌 Bot desconectado del canal de voz en guild {}", self.guild);

        if let Some((_, end)) = self.current.remove(&self.guild) {
            signal(&end, PlaybackEnd::Disconnected);
        }
        None
    }
}
