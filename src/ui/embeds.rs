use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::{
        queue::Request,
        session::{PlayerState, QueueSnapshot},
    },
    bot::commands::Command,
    cache::CacheStats,
    error::PlaybackError,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 ShuffleBot";

const ITEMS_PER_PAGE: usize = 10;

/// Crea un embed para una canción agregada a la cola
pub fn create_track_queued_embed(request: &Request, position: usize) -> CreateEmbed {
    let description = if position == 1 {
        format!("**{}**\n\nEs la siguiente en sonar", request.query)
    } else {
        format!("**{}**\n\nPosición en cola: **#{}**", request.query, position)
    };

    CreateEmbed::default()
        .title("✅ Agregado a la Cola")
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .field("👤 Solicitado por", format!("<@{}>", request.requested_by), true)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(
    title: &str,
    duration: Option<Duration>,
    request: &Request,
) -> CreateEmbed {
    let duration = duration
        .map(format_duration)
        .unwrap_or_else(|| "🔴 En vivo".to_string());

    CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", title))
        .color(colors::MUSIC_PURPLE)
        .field("⏱️ Duración", duration, true)
        .field("👤 Solicitado por", format!("<@{}>", request.requested_by), true)
        .field("🔎 Búsqueda", &request.query, true)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Crea un embed para una petición que no se pudo reproducir
pub fn create_track_failed_embed(request: &Request, error: &PlaybackError) -> CreateEmbed {
    create_error_embed(
        "No se pudo reproducir",
        &format!("**{}**\n\n{}", request.query, error),
    )
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(snapshot: &QueueSnapshot, page: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if snapshot.current.is_none() && snapshot.upcoming.is_empty() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    // Canción actual
    if let Some(current) = &snapshot.current {
        let (status, title) = match (snapshot.state, &snapshot.now_playing) {
            (PlayerState::Paused, Some(title)) => ("⏸️ En pausa", title.clone()),
            (_, Some(title)) => ("▶️ Reproduciendo", title.clone()),
            _ => ("⏳ Preparando", current.query.clone()),
        };
        embed = embed.field(status, format!("**{}**", title), false);
    }

    let total_pages = total_pages(snapshot.upcoming.len());
    let page = page.clamp(1, total_pages);

    // Próximas canciones
    let start = (page - 1) * ITEMS_PER_PAGE;
    let description: String = snapshot
        .upcoming
        .iter()
        .enumerate()
        .skip(start)
        .take(ITEMS_PER_PAGE)
        .map(|(i, request)| format!("**{}**. {} • <@{}>\n", i + 1, request.query, request.requested_by))
        .collect();

    if !description.is_empty() {
        embed = embed.field("Próximas canciones", description, false);
    }

    embed = embed.field(
        "Información",
        format!("**Total:** {} canciones en espera", snapshot.upcoming.len()),
        false,
    );

    // Paginación
    if total_pages > 1 {
        embed = embed.footer(CreateEmbedFooter::new(format!(
            "Página {} de {} • ShuffleBot",
            page, total_pages
        )));
    } else {
        embed = embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    embed.timestamp(Timestamp::now())
}

fn total_pages(items: usize) -> usize {
    items.div_ceil(ITEMS_PER_PAGE).max(1)
}

/// Crea un embed de ayuda general
pub fn create_help_embed() -> CreateEmbed {
    let commands: String = Command::all()
        .map(|command| {
            let aliases = if command.aliases().is_empty() {
                String::new()
            } else {
                format!(" (alias: {})", command.aliases().join(", "))
            };
            format!("• `/{}` - {}{}\n", command.name(), command.description(), aliases)
        })
        .collect();

    CreateEmbed::default()
        .title("🎵 ShuffleBot - Guía")
        .color(colors::INFO_BLUE)
        .description("Bot de música: cada servidor tiene su propia cola y reproducción")
        .field("Comandos", commands, false)
        .footer(CreateEmbedFooter::new(
            "Usa /help <comando> para ayuda específica",
        ))
        .timestamp(Timestamp::now())
}

/// Crea un embed de ayuda para un comando específico
pub fn create_command_help_embed(name: &str) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER));

    let Some(command) = Command::parse(name) else {
        return embed
            .title("❓ Comando no encontrado")
            .description("Usa `/help` para ver todos los comandos disponibles");
    };

    let mut embed = embed
        .title(format!("Comando /{}", command.name()))
        .description(command.description());

    if !command.aliases().is_empty() {
        embed = embed.field("Alias", command.aliases().join(", "), false);
    }

    match command {
        Command::Play => embed
            .field("Uso", "`/play <query>`", false)
            .field(
                "Ejemplos",
                "• `/play Bohemian Rhapsody`\n\
                • `/play https://youtube.com/watch?v=...`",
                false,
            ),
        Command::Queue => embed.field("Uso", "`/queue [página]`", false),
        _ => embed,
    }
}

/// Crea un embed con el estado de la caché de audio
pub fn create_cache_stats_embed(stats: &CacheStats) -> CreateEmbed {
    let percent = if stats.capacity_bytes == 0 {
        0.0
    } else {
        stats.used_bytes as f64 * 100.0 / stats.capacity_bytes as f64
    };

    create_info_embed(
        "Caché de audio",
        &format!(
            "**Archivos:** {} ({} en uso)\n**Uso:** {} / {} ({:.1}%)\n**Desalojos:** {}",
            stats.entries,
            stats.pinned,
            format_bytes(stats.used_bytes),
            format_bytes(stats.capacity_bytes),
            percent,
            stats.evictions
        ),
    )
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de advertencia
pub fn create_warning_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("⚠️ {}", title))
        .description(description)
        .color(colors::WARNING_ORANGE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de información
pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

fn format_bytes(bytes: u64) -> String {
    const MB: f64 = 1024.0 * 1024.0;
    format!("{:.1} MB", bytes as f64 / MB)
}
