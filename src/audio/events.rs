use serenity::model::id::{ChannelId, GuildId};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::trace;

use super::queue::Request;
use crate::error::PlaybackError;

/// Motivo por el que una sesión terminó
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `/stop` o `/leave`
    Command,
    /// Cola vacía durante más que el idle timeout
    IdleTimeout,
    /// Apagado del bot
    Shutdown,
}

#[derive(Debug, Clone)]
pub enum SessionEventKind {
    TrackQueued { request: Request, position: usize },
    /// La petición pasó a `Waiting` (resolución/descarga en curso)
    Resolving { request: Request },
    NowPlaying {
        request: Request,
        title: String,
        duration: Option<Duration>,
    },
    TrackFinished { title: String },
    TrackFailed { request: Request, error: PlaybackError },
    Paused,
    Resumed,
    Idle,
    Stopped { reason: StopReason },
}

/// Evento observable de una sesión
#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub guild: GuildId,
    /// Canal de texto donde se pidió la última canción, si se conoce
    pub text_channel: Option<ChannelId>,
    pub kind: SessionEventKind,
}

/// Bus de eventos compartido por todas las sesiones
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: SessionEvent) {
        // Sin suscriptores no es un error
        if self.sender.send(event).is_err() {
            trace!("Evento de sesión sin suscriptores");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
