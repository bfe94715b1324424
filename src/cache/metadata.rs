use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::sources::TrackInfo;

/// Entrada de metadata con TTL
#[derive(Debug, Clone)]
struct MemoEntry {
    info: TrackInfo,
    created_at: Instant,
}

impl MemoEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

/// Memo consulta normalizada → metadata del resolver; las entradas expiran tras `ttl`.
#[derive(Debug)]
pub struct TrackMetadataCache {
    data: DashMap<String, MemoEntry>,
    ttl: Duration,
}

impl TrackMetadataCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            data: DashMap::new(),
            ttl,
        }
    }

    pub fn insert(&self, query_key: String, info: TrackInfo) {
        self.data.insert(
            query_key,
            MemoEntry {
                info,
                created_at: Instant::now(),
            },
        );
    }

    pub fn get(&self, query_key: &str) -> Option<TrackInfo> {
        let entry = self.data.get(query_key)?;
        if entry.is_expired(self.ttl) {
            drop(entry);
            self.data.remove(query_key);
            None
        } else {
            Some(entry.info.clone())
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Limpia entradas expiradas y retorna el número de elementos removidos
    pub fn cleanup_expired(&self) -> usize {
        let before = self.data.len();
        self.data.retain(|_, entry| !entry.is_expired(self.ttl));
        let removed = before.saturating_sub(self.data.len());

        if removed > 0 {
            debug!("Limpiadas {} entradas expiradas del memo de metadata", removed);
        }

        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: &str) -> TrackInfo {
        TrackInfo {
            id: id.to_string(),
            title: format!("Título {}", id),
            locator: format!("https://www.youtube.com/watch?v={}", id),
            estimated_size_bytes: 1024,
            duration: Some(Duration::from_secs(180)),
        }
    }

    #[test]
    fn test_get_returns_inserted_info() {
        let memo = TrackMetadataCache::new(Duration::from_secs(60));
        memo.insert("never gonna".into(), info("abc"));

        assert_eq!(memo.get("never gonna").map(|i| i.id), Some("abc".to_string()));
        assert!(memo.get("otra cosa").is_none());
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let memo = TrackMetadataCache::new(Duration::ZERO);
        memo.insert("q".into(), info("abc"));
        std::thread::sleep(Duration::from_millis(2));

        assert_eq!(memo.cleanup_expired(), 1);
        assert!(memo.is_empty());

        memo.insert("q".into(), info("abc"));
        std::thread::sleep(Duration::from_millis(2));
        assert!(memo.get("q").is_none());
        assert_eq!(memo.len(), 0);
    }
}
