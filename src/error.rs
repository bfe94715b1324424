//! Errores del núcleo de reproducción.
//!
//! Todos los variantes son `Clone`: un mismo resultado de resolución se
//! entrega a cada esperador de un single-flight.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    /// El resolver o el downloader fallaron para una petición concreta.
    #[error("No se pudo resolver '{query}': {reason}")]
    ResolutionFailed { query: String, reason: String },

    /// El artefacto no cabe ni desalojando todo lo que no está en uso.
    #[error("Caché sin espacio para '{key}': se necesitan {needed} bytes, hay {available} libres de {capacity}")]
    InsufficientCapacity {
        key: String,
        needed: u64,
        available: u64,
        capacity: u64,
    },

    /// Falló la conexión de voz o el inicio de la reproducción.
    #[error("Error de transporte de voz: {0}")]
    Transport(String),

    /// Configuración inválida; sólo es fatal al arrancar.
    #[error("Configuración inválida: {0}")]
    Configuration(String),

    #[error("La canción dura {duration_secs}s, el máximo es {max_secs}s")]
    TrackTooLong { duration_secs: u64, max_secs: u64 },

    #[error("La cola está llena (máximo {max} canciones)")]
    QueueFull { max: usize },

    #[error("No hay nada reproduciéndose")]
    NothingPlaying,

    #[error("La sesión ya se cerró")]
    SessionClosed,
}

impl PlaybackError {
    pub fn resolution(query: impl Into<String>, reason: impl ToString) -> Self {
        Self::ResolutionFailed {
            query: query.into(),
            reason: reason.to_string(),
        }
    }
}

pub type PlaybackResult<T> = Result<T, PlaybackError>;
