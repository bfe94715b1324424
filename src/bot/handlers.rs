use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use super::{commands::Command, ShuffleBot};
use crate::{
    audio::{
        queue::Request,
        session::{ResumeOutcome, SkipOutcome},
    },
    error::PlaybackError,
    ui::embeds,
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &ShuffleBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let Some(parsed) = Command::parse(&command.data.name) else {
        return reply(
            ctx,
            &command,
            embeds::create_error_embed("Comando no reconocido", "Usa `/help` para ver los comandos"),
            true,
        )
        .await;
    };

    match parsed {
        Command::Play => handle_play(ctx, &command, bot, guild_id).await,
        Command::Pause => {
            let embed = match bot.registry.pause(guild_id) {
                Ok(()) => embeds::create_success_embed("Pausado", "⏸️ Reproducción pausada"),
                Err(e) => error_embed(&e),
            };
            reply(ctx, &command, embed, false).await
        }
        Command::Resume => {
            let embed = match bot.registry.resume(guild_id) {
                Ok(ResumeOutcome::Resumed) => {
                    embeds::create_success_embed("Reanudado", "▶️ Reproducción reanudada")
                }
                Ok(ResumeOutcome::AlreadyPlaying) => {
                    embeds::create_info_embed("Sin cambios", "La música ya está sonando")
                }
                Ok(ResumeOutcome::NothingToResume) | Err(PlaybackError::NothingPlaying) => {
                    embeds::create_info_embed("Sin cambios", "No hay nada pausado para reanudar")
                }
                Err(e) => error_embed(&e),
            };
            reply(ctx, &command, embed, false).await
        }
        Command::Skip => {
            let embed = match bot.registry.skip(guild_id) {
                Ok(SkipOutcome::Next { remaining }) => embeds::create_success_embed(
                    "Saltado",
                    &format!("⏭️ Siguiente canción ({} más en cola)", remaining),
                ),
                Ok(SkipOutcome::QueueEmpty) => embeds::create_success_embed(
                    "Saltado",
                    "⏭️ No quedan canciones en cola",
                ),
                Err(e) => error_embed(&e),
            };
            reply(ctx, &command, embed, false).await
        }
        Command::Stop | Command::Leave => {
            let embed = match bot.registry.stop(guild_id).await {
                Ok(()) if parsed == Command::Leave => {
                    embeds::create_success_embed("Desconectado", "👋 Desconectado del canal de voz")
                }
                Ok(()) => embeds::create_success_embed(
                    "Detenido",
                    "⏹️ Reproducción detenida y cola limpiada",
                ),
                Err(e) => error_embed(&e),
            };
            reply(ctx, &command, embed, false).await
        }
        Command::Queue => {
            let page = option_i64(&command, "page").unwrap_or(1).max(1) as usize;
            let embed = match bot.registry.list_queue(guild_id) {
                Ok(snapshot) => embeds::create_queue_embed(&snapshot, page),
                Err(PlaybackError::NothingPlaying) => embeds::create_info_embed(
                    "Cola vacía",
                    "💡 Usa `/play <canción>` para agregar música",
                ),
                Err(e) => error_embed(&e),
            };
            reply(ctx, &command, embed, false).await
        }
        Command::NowPlaying => {
            let snapshot = bot.registry.list_queue(guild_id).ok();
            let current = snapshot
                .as_ref()
                .and_then(|s| Some((s.current.as_ref()?, s.now_playing.as_ref()?, s.duration)));
            match current {
                Some((request, title, duration)) => {
                    let embed = embeds::create_now_playing_embed(title, duration, request);
                    reply(ctx, &command, embed, false).await
                }
                None => {
                    let embed = error_embed(&PlaybackError::NothingPlaying);
                    reply(ctx, &command, embed, true).await
                }
            }
        }
        Command::Shuffle => {
            let embed = match bot.registry.shuffle(guild_id) {
                Ok(count) => embeds::create_success_embed(
                    "Cola mezclada",
                    &format!("🔀 {} canciones mezcladas", count),
                ),
                Err(e) => error_embed(&e),
            };
            reply(ctx, &command, embed, false).await
        }
        Command::Clear => {
            let embed = match bot.registry.clear(guild_id) {
                Ok(removed) => embeds::create_success_embed(
                    "Cola limpiada",
                    &format!("🗑️ {} canciones eliminadas de la cola", removed),
                ),
                Err(e) => error_embed(&e),
            };
            reply(ctx, &command, embed, false).await
        }
        Command::Help => {
            let embed = match option_str(&command, "command") {
                Some(name) => embeds::create_command_help_embed(name),
                None => embeds::create_help_embed(),
            };
            reply(ctx, &command, embed, true).await
        }
        Command::Stats => {
            let stats = bot.registry.coordinator().cache().stats();
            let embed = embeds::create_cache_stats_embed(&stats);
            reply(ctx, &command, embed, true).await
        }
    }
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &ShuffleBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = option_str(command, "query")
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?;

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    // Verificar que el usuario esté en un canal de voz
    let voice_channel_id = match get_user_voice_channel(ctx, guild_id, command.user.id) {
        Ok(channel) => channel,
        Err(e) => {
            let embed = embeds::create_error_embed("No estás en un canal de voz", &e.to_string());
            command
                .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
                .await?;
            return Ok(());
        }
    };

    let request =
        Request::new(query, voice_channel_id, command.user.id).with_text_channel(command.channel_id);

    let embed = match bot.registry.enqueue(guild_id, request.clone()).await {
        Ok(position) => embeds::create_track_queued_embed(&request, position),
        Err(e) => {
            warn!("No se pudo encolar '{}': {}", query, e);
            error_embed(&e)
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

// Funciones auxiliares

async fn reply(
    ctx: &Context,
    command: &CommandInteraction,
    embed: CreateEmbed,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;

    Ok(())
}

fn error_embed(error: &PlaybackError) -> CreateEmbed {
    let title = match error {
        PlaybackError::NothingPlaying => "Nada en reproducción",
        PlaybackError::QueueFull { .. } => "Cola llena",
        PlaybackError::SessionClosed => "Sesión cerrada",
        _ => "Error",
    };
    embeds::create_error_embed(title, &error.to_string())
}

fn option_str<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn option_i64(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("Debes estar en un canal de voz"))?;

    Ok(channel_id)
}
