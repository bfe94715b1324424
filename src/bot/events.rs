use serenity::{builder::CreateMessage, http::Http};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

use crate::{
    audio::events::{SessionEvent, SessionEventKind, StopReason},
    ui::embeds,
};

/// Reenvía los eventos de las sesiones al canal de texto de cada guild, hasta que se cierre el bus.
pub async fn forward_session_events(http: Arc<Http>, mut events: broadcast::Receiver<SessionEvent>) {
    info!("📣 Escuchando eventos de sesión");

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!("⚠️ Se perdieron {} eventos de sesión", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let Some(channel) = event.text_channel else {
            continue;
        };

        let embed = match &event.kind {
            SessionEventKind::NowPlaying {
                request,
                title,
                duration,
            } => embeds::create_now_playing_embed(title, *duration, request),
            SessionEventKind::TrackFailed { request, error } => {
                embeds::create_track_failed_embed(request, error)
            }
            SessionEventKind::Stopped {
                reason: StopReason::IdleTimeout,
            } => embeds::create_warning_embed(
                "Desconectado por inactividad",
                "La cola estuvo vacía demasiado tiempo. Usa `/play` para volver a empezar.",
            ),
            other => {
                debug!("Evento de sesión en guild {}: {:?}", event.guild, other);
                continue;
            }
        };

        if let Err(e) = channel
            .send_message(&http, CreateMessage::new().embed(embed))
            .await
        {
            error!("Error al enviar notificación a {}: {:?}", channel, e);
        }
    }

    info!("📣 Bus de eventos cerrado");
}
