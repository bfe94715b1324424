use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::{path::Path, sync::Arc};
use tokio::sync::oneshot;

use crate::error::PlaybackResult;

/// Cómo terminó la reproducción de un track
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEnd {
    Finished,
    Errored(String),
    /// Se perdió la conexión de voz; cuenta como track terminado
    Disconnected,
}

/// Control sobre el track que está sonando
pub trait TrackControl: Send + Sync {
    fn pause(&self) -> PlaybackResult<()>;
    fn resume(&self) -> PlaybackResult<()>;
    fn stop(&self);
}

/// Track en reproducción: control más aviso de fin.
pub struct PlaybackHandle {
    pub control: Arc<dyn TrackControl>,
    pub finished: oneshot::Receiver<PlaybackEnd>,
}

/// Conexión de voz de un guild.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, guild: GuildId, channel: ChannelId) -> PlaybackResult<()>;

    /// Empieza a reproducir un archivo local en el canal conectado.
    async fn play(&self, guild: GuildId, path: &Path) -> PlaybackResult<PlaybackHandle>;

    async fn disconnect(&self, guild: GuildId);
}
