use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serenity::model::id::{ChannelId, UserId};
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::{
    error::{PlaybackError, PlaybackResult},
    sources::normalize_query,
};

/// Petición de reproducción; inmutable una vez encolada
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Texto o URL tal como lo escribió el usuario
    pub query: String,
    /// Consulta normalizada, clave de deduplicación
    pub key: String,
    pub voice_channel: ChannelId,
    pub text_channel: Option<ChannelId>,
    pub requested_by: UserId,
    pub submitted_at: DateTime<Utc>,
}

impl Request {
    pub fn new(query: impl Into<String>, voice_channel: ChannelId, requested_by: UserId) -> Self {
        let query = query.into();
        Self {
            key: normalize_query(&query),
            query,
            voice_channel,
            text_channel: None,
            requested_by,
            submitted_at: Utc::now(),
        }
    }

    pub fn with_text_channel(mut self, channel: ChannelId) -> Self {
        self.text_channel = Some(channel);
        self
    }
}

/// Cola FIFO de peticiones de una sesión
#[derive(Debug)]
pub struct TrackQueue {
    items: VecDeque<Request>,
    max_size: usize,
}

impl TrackQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Agrega una petición y devuelve su posición (1 = la siguiente)
    pub fn push(&mut self, request: Request) -> PlaybackResult<usize> {
        if self.items.len() >= self.max_size {
            return Err(PlaybackError::QueueFull { max: self.max_size });
        }

        info!("➕ Agregado a la cola: {}", request.query);
        self.items.push_back(request);
        Ok(self.items.len())
    }

    /// Obtiene la siguiente petición (FIFO)
    pub fn pop_front(&mut self) -> Option<Request> {
        let next = self.items.pop_front();
        if let Some(ref request) = next {
            debug!("➡️ Siguiente en cola (FIFO): {}", request.query);
        }
        next
    }

    /// Limpia la cola y devuelve cuántas peticiones se descartaron
    pub fn clear(&mut self) -> usize {
        let removed = self.items.len();
        self.items.clear();
        if removed > 0 {
            info!("🗑️ Cola limpiada ({} canciones)", removed);
        }
        removed
    }

    /// Mezcla la cola
    pub fn shuffle(&mut self) {
        let mut items: Vec<_> = self.items.drain(..).collect();
        items.shuffle(&mut rand::thread_rng());
        self.items.extend(items);
        info!("🔀 Cola mezclada");
    }

    pub fn snapshot(&self) -> Vec<Request> {
        self.items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request(query: &str) -> Request {
        Request::new(query, ChannelId::new(10), UserId::new(20))
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = TrackQueue::new(10);
        assert_eq!(queue.push(request("a")).unwrap(), 1);
        assert_eq!(queue.push(request("b")).unwrap(), 2);
        assert_eq!(queue.push(request("c")).unwrap(), 3);

        let order: Vec<_> = std::iter::from_fn(|| queue.pop_front())
            .map(|r| r.query)
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_queue_full() {
        let mut queue = TrackQueue::new(1);
        queue.push(request("a")).unwrap();
        assert_eq!(
            queue.push(request("b")),
            Err(PlaybackError::QueueFull { max: 1 })
        );
    }

    #[test]
    fn test_shuffle_keeps_items() {
        let mut queue = TrackQueue::new(50);
        for i in 0..20 {
            queue.push(request(&format!("track {}", i))).unwrap();
        }
        queue.shuffle();

        let mut queries: Vec<_> = queue.snapshot().into_iter().map(|r| r.query).collect();
        queries.sort();
        let mut expected: Vec<_> = (0..20).map(|i| format!("track {}", i)).collect();
        expected.sort();
        assert_eq!(queries, expected);
        assert_eq!(queue.clear(), 20);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_request_normalizes_key() {
        let r = request("  Daft   PUNK ").with_text_channel(ChannelId::new(30));
        assert_eq!(r.key, "daft punk");
        assert_eq!(r.query, "  Daft   PUNK ");
        assert_eq!(r.text_channel, Some(ChannelId::new(30)));
    }
}
