//! Mensajes que el bot muestra en Discord.

pub mod embeds;
