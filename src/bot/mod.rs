//! # Bot Module
//!
//! Discord glue for ShuffleBot: slash command registration, interaction
//! dispatch and voice state tracking.
//!
//! [`ShuffleBot`] implements Serenity's [`EventHandler`]. All playback state
//! lives in the [`SessionRegistry`]; the handler only translates Discord
//! events into registry calls and forwards session events back as embeds
//! (see [`events::forward_session_events`]).

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod events;
pub mod handlers;

use crate::{audio::registry::SessionRegistry, cache::TrackMetadataCache, config::Config};

/// Intervalo de las tareas de mantenimiento
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(3600);

/// Handler principal del bot
pub struct ShuffleBot {
    config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
    metadata: Arc<TrackMetadataCache>,
    shutdown: CancellationToken,
    // `ready` se repite en cada reconexión
    background_started: AtomicBool,
}

impl ShuffleBot {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<SessionRegistry>,
        metadata: Arc<TrackMetadataCache>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            registry,
            metadata,
            shutdown,
            background_started: AtomicBool::new(false),
        }
    }

    /// Registra los comandos slash, por guild si `GUILD_ID` está configurado.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::from(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for ShuffleBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        if self.background_started.swap(true, Ordering::SeqCst) {
            return;
        }

        tokio::spawn(events::forward_session_events(
            ctx.http.clone(),
            self.registry.subscribe(),
        ));

        tokio::spawn(maintenance_tasks(
            self.registry.clone(),
            self.metadata.clone(),
            self.shutdown.clone(),
        ));
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Detiene la sesión si alguien desconecta al bot a mano.
    ///
    /// Sólo cuenta si la sesión actual seguía en el canal que el bot dejó;
    /// el aviso de una sesión anterior ya cerrada se ignora.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || new.channel_id.is_some() {
            return;
        }

        let (Some(guild_id), Some(channel_id)) =
            (new.guild_id, old.and_then(|state| state.channel_id))
        else {
            return;
        };

        if self.registry.voice_lost(guild_id, channel_id).await {
            info!("🔌 Bot desconectado de {} en guild {}", channel_id, guild_id);
        }
    }
}

/// Limpieza periódica: metadata expirada y estado de la caché.
async fn maintenance_tasks(
    registry: Arc<SessionRegistry>,
    metadata: Arc<TrackMetadataCache>,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
    // El primer tick es inmediato
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }

        let expired = metadata.cleanup_expired();
        let stats = registry.coordinator().cache().stats();

        debug!("🗑️ {} entradas de metadata expiradas", expired);
        info!(
            "🧹 Mantenimiento: {} sesiones, {} archivos en caché ({} / {} bytes, {} desalojos)",
            registry.active_sessions(),
            stats.entries,
            stats.used_bytes,
            stats.capacity_bytes,
            stats.evictions
        );
    }

    debug!("Tareas de mantenimiento detenidas");
}
