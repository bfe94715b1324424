//! # Cache Module
//!
//! Bounded on-disk cache of downloaded audio files.
//!
//! Every artifact the bot plays lives in a single directory owned by
//! [`AudioCache`]. The cache keeps byte accounting for that directory and
//! evicts old files to make room for new downloads.
//!
//! ## Pins
//!
//! An entry that is being played is *pinned*. Pins are individual tokens
//! ([`PinId`]) so that two guilds playing the same file each hold their own;
//! the entry stays pinned until every token has been released. A pinned entry
//! is never evicted, regardless of its age.
//!
//! ## Eviction order
//!
//! Each insert or re-pin stamps the entry with a fresh, strictly increasing
//! `sequence`. Eviction removes the unpinned entry with the lowest sequence
//! first. This is insertion/re-use order, not a true access-time LRU.
//!
//! ## Accounting
//!
//! ```text
//! used_bytes     == Σ entry.size_bytes   (recorded at commit time)
//! used_bytes + reserved_bytes <= capacity_bytes
//! ```
//!
//! Download flow:
//!
//! ```text
//! reserve(key, estimate) ──► download to path_for(key) ──► commit(key, size)
//!          │                          │
//!          └──── cancel_reservation ◄─┘ (on failure)
//! ```

pub mod lease;
pub mod metadata;

use parking_lot::Mutex;
use regex::Regex;
use std::{
    collections::{HashMap, HashSet},
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, LazyLock},
    time::SystemTime,
};
use tracing::{debug, info, warn};

use crate::error::{PlaybackError, PlaybackResult};

pub use lease::CacheLease;
pub use metadata::TrackMetadataCache;

static PLAIN_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-]+$").expect("regex válida"));

/// Prefijo de los nombres codificados en hexadecimal; nunca aparece en una clave simple
const ENCODED_PREFIX: char = '=';

/// Nombre de archivo (sin extensión) para una clave.
///
/// Las claves simples se usan tal cual; el resto se codifica en hexadecimal
/// detrás de `=`, así dos claves distintas nunca comparten archivo.
fn file_stem_for(key: &str) -> String {
    if PLAIN_KEY.is_match(key) {
        return key.to_string();
    }
    key.bytes()
        .fold(String::from(ENCODED_PREFIX), |mut stem, byte| {
            stem.push_str(&format!("{:02x}", byte));
            stem
        })
}

/// Inversa de [`file_stem_for`]; `None` para archivos que la caché no escribió.
fn key_from_stem(stem: &str) -> Option<String> {
    let Some(hex) = stem.strip_prefix(ENCODED_PREFIX) else {
        return PLAIN_KEY.is_match(stem).then(|| stem.to_string());
    };
    if hex.len() % 2 != 0 {
        return None;
    }

    let bytes = (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect::<Option<Vec<u8>>>()?;

    String::from_utf8(bytes)
        .ok()
        .filter(|key| !PLAIN_KEY.is_match(key))
}

/// Token de uso de una entrada de la caché.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PinId(u64);

#[derive(Debug, Clone)]
struct CacheEntry {
    size_bytes: u64,
    sequence: u64,
    pins: HashSet<PinId>,
}

impl CacheEntry {
    fn is_pinned(&self) -> bool {
        !self.pins.is_empty()
    }
}

#[derive(Debug)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    reservations: HashMap<String, u64>,
    used_bytes: u64,
    reserved_bytes: u64,
    capacity_bytes: u64,
    next_sequence: u64,
    next_pin: u64,
    evictions: u64,
}

impl CacheState {
    fn bump_sequence(&mut self) -> u64 {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        seq
    }

    fn new_pin(&mut self) -> PinId {
        let pin = PinId(self.next_pin);
        self.next_pin += 1;
        pin
    }

    fn free_bytes(&self) -> u64 {
        self.capacity_bytes
            .saturating_sub(self.used_bytes + self.reserved_bytes)
    }

    fn evictable_bytes(&self) -> u64 {
        self.entries
            .values()
            .filter(|e| !e.is_pinned())
            .map(|e| e.size_bytes)
            .sum()
    }

    /// Entrada sin pin con la secuencia más baja.
    fn oldest_unpinned(&self) -> Option<String> {
        self.entries
            .iter()
            .filter(|(_, e)| !e.is_pinned())
            .min_by_key(|(_, e)| e.sequence)
            .map(|(key, _)| key.clone())
    }
}

/// Estadísticas de la caché de audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub pinned: usize,
    pub used_bytes: u64,
    pub reserved_bytes: u64,
    pub capacity_bytes: u64,
    pub evictions: u64,
}

/// Caché acotada de artefactos de audio en disco.
#[derive(Debug)]
pub struct AudioCache {
    dir: PathBuf,
    extension: String,
    state: Mutex<CacheState>,
}

impl AudioCache {
    /// Abre (o crea) el directorio de la caché e indexa los archivos existentes.
    ///
    /// Los archivos de una ejecución anterior se registran sin pin, del más
    /// viejo al más nuevo, y se desalojan hasta caber en `capacity_bytes`.
    /// Las descargas parciales (`*.part`) se borran.
    pub fn open(
        dir: impl Into<PathBuf>,
        capacity_bytes: u64,
        extension: &str,
    ) -> PlaybackResult<Self> {
        let dir = dir.into();

        if capacity_bytes == 0 {
            return Err(PlaybackError::Configuration(
                "la capacidad de la caché debe ser mayor que 0".into(),
            ));
        }

        std::fs::create_dir_all(&dir).map_err(|e| {
            PlaybackError::Configuration(format!(
                "no se pudo crear el directorio de caché {}: {}",
                dir.display(),
                e
            ))
        })?;

        let cache = Self {
            dir,
            extension: extension.trim_start_matches('.').to_string(),
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                reservations: HashMap::new(),
                used_bytes: 0,
                reserved_bytes: 0,
                capacity_bytes,
                next_sequence: 0,
                next_pin: 0,
                evictions: 0,
            }),
        };

        cache.index_existing()?;
        Ok(cache)
    }

    fn index_existing(&self) -> PlaybackResult<()> {
        let read_dir = std::fs::read_dir(&self.dir).map_err(|e| {
            PlaybackError::Configuration(format!(
                "no se pudo leer el directorio de caché {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let mut found: Vec<(String, u64, SystemTime)> = Vec::new();

        for entry in read_dir.flatten() {
            let path = entry.path();
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }

            match path.extension().and_then(|e| e.to_str()) {
                Some("part") => {
                    debug!("🧹 Eliminando descarga parcial: {}", path.display());
                    remove_artifact(&path);
                }
                Some(ext) if ext == self.extension => {
                    let key = path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .and_then(key_from_stem);
                    match key {
                        Some(key) => {
                            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                            found.push((key, metadata.len(), modified));
                        }
                        None => debug!("Ignorando archivo ajeno a la caché: {}", path.display()),
                    }
                }
                _ => {}
            }
        }

        found.sort_by_key(|(_, _, modified)| *modified);

        let mut state = self.state.lock();
        for (key, size_bytes, _) in found {
            let sequence = state.bump_sequence();
            state.used_bytes += size_bytes;
            state.entries.insert(
                key,
                CacheEntry {
                    size_bytes,
                    sequence,
                    pins: HashSet::new(),
                },
            );
        }

        while state.used_bytes > state.capacity_bytes {
            let Some(victim) = state.oldest_unpinned() else {
                break;
            };
            self.evict_locked(&mut state, &victim);
        }

        if !state.entries.is_empty() {
            info!(
                "🗄️ Caché de audio: {} archivos existentes indexados ({} bytes de {})",
                state.entries.len(),
                state.used_bytes,
                state.capacity_bytes
            );
        }

        Ok(())
    }

    /// Ruta del artefacto para una clave.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", file_stem_for(key), self.extension))
    }

    /// Verifica si existe una entrada para la clave (con o sin pin)
    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    pub fn is_pinned(&self, key: &str) -> bool {
        self.state
            .lock()
            .entries
            .get(key)
            .is_some_and(CacheEntry::is_pinned)
    }

    /// Reserva espacio para una descarga, desalojando entradas viejas sin pin.
    ///
    /// Si ni desalojando todo lo que no tiene pin alcanzaría, falla con
    /// [`PlaybackError::InsufficientCapacity`] sin desalojar nada.
    pub fn reserve(&self, key: &str, estimated_bytes: u64) -> PlaybackResult<()> {
        let mut state = self.state.lock();

        // Una reserva previa para la misma clave se reemplaza
        if let Some(previous) = state.reservations.remove(key) {
            state.reserved_bytes -= previous;
        }

        self.make_room_locked(&mut state, key, estimated_bytes)?;

        state.reservations.insert(key.to_string(), estimated_bytes);
        state.reserved_bytes += estimated_bytes;

        debug!(
            "📦 Reservados {} bytes para {} (libres: {})",
            estimated_bytes,
            key,
            state.free_bytes()
        );
        Ok(())
    }

    /// Devuelve el espacio de una reserva que no llegó a `commit`.
    pub fn cancel_reservation(&self, key: &str) {
        let mut state = self.state.lock();
        if let Some(reserved) = state.reservations.remove(key) {
            state.reserved_bytes -= reserved;
            debug!("↩️ Reserva cancelada para {} ({} bytes)", key, reserved);
        }
    }

    /// Registra un artefacto ya escrito como entrada con pin.
    ///
    /// Repetir el commit de una clave existente agrega un pin y renueva su
    /// secuencia; el tamaño registrado no cambia.
    pub fn commit(&self, key: &str, size_bytes: u64) -> PlaybackResult<PinId> {
        let mut state = self.state.lock();

        if let Some(reserved) = state.reservations.remove(key) {
            state.reserved_bytes -= reserved;
        }

        if state.entries.contains_key(key) {
            let sequence = state.bump_sequence();
            let pin = state.new_pin();
            if let Some(entry) = state.entries.get_mut(key) {
                entry.sequence = sequence;
                entry.pins.insert(pin);
            }
            debug!("📌 Commit repetido para {}, re-pin", key);
            return Ok(pin);
        }

        if let Err(e) = self.make_room_locked(&mut state, key, size_bytes) {
            drop(state);
            remove_artifact(&self.path_for(key));
            return Err(e);
        }

        let sequence = state.bump_sequence();
        let pin = state.new_pin();
        state.used_bytes += size_bytes;
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                size_bytes,
                sequence,
                pins: HashSet::from([pin]),
            },
        );

        info!(
            "💾 Añadido a la caché: {} ({} bytes, uso {}/{})",
            key, size_bytes, state.used_bytes, state.capacity_bytes
        );
        Ok(pin)
    }

    /// Pin ligero sobre una entrada existente.
    pub fn pin(&self, key: &str) -> Option<PinId> {
        let mut state = self.state.lock();
        if !state.entries.contains_key(key) {
            return None;
        }

        let sequence = state.bump_sequence();
        let pin = state.new_pin();
        let entry = state.entries.get_mut(key)?;
        entry.sequence = sequence;
        entry.pins.insert(pin);
        Some(pin)
    }

    /// Quita un pin. Repetir la llamada no tiene efecto.
    pub fn release(&self, key: &str, pin: PinId) {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.get_mut(key) {
            if entry.pins.remove(&pin) && !entry.is_pinned() {
                debug!("🔓 {} ya no está en uso", key);
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            entries: state.entries.len(),
            pinned: state.entries.values().filter(|e| e.is_pinned()).count(),
            used_bytes: state.used_bytes,
            reserved_bytes: state.reserved_bytes,
            capacity_bytes: state.capacity_bytes,
            evictions: state.evictions,
        }
    }

    /// Pin existente envuelto en un [`CacheLease`].
    pub fn lease(self: &Arc<Self>, key: &str) -> Option<CacheLease> {
        let pin = self.pin(key)?;
        Some(CacheLease::new(self.clone(), key, pin))
    }

    /// `commit` que devuelve el pin como [`CacheLease`].
    pub fn commit_lease(self: &Arc<Self>, key: &str, size_bytes: u64) -> PlaybackResult<CacheLease> {
        let pin = self.commit(key, size_bytes)?;
        Ok(CacheLease::new(self.clone(), key, pin))
    }

    fn make_room_locked(
        &self,
        state: &mut CacheState,
        key: &str,
        needed: u64,
    ) -> PlaybackResult<()> {
        let insufficient = |state: &CacheState| PlaybackError::InsufficientCapacity {
            key: key.to_string(),
            needed,
            available: state.free_bytes(),
            capacity: state.capacity_bytes,
        };

        if needed > state.capacity_bytes
            || needed > state.free_bytes() + state.evictable_bytes()
        {
            warn!(
                "🚫 No hay espacio para {} ({} bytes), las entradas restantes están en uso",
                key, needed
            );
            return Err(insufficient(state));
        }

        while state.free_bytes() < needed {
            let Some(victim) = state.oldest_unpinned() else {
                return Err(insufficient(state));
            };
            self.evict_locked(state, &victim);
        }

        Ok(())
    }

    /// Borra el archivo y la entrada; descuenta el tamaño registrado.
    fn evict_locked(&self, state: &mut CacheState, key: &str) {
        let Some(entry) = state.entries.get(key) else {
            return;
        };
        if entry.is_pinned() {
            return;
        }

        if let Some(entry) = state.entries.remove(key) {
            state.used_bytes -= entry.size_bytes;
            state.evictions += 1;
            info!(
                "🧹 Desalojado de la caché: {} ({} bytes, secuencia {})",
                key, entry.size_bytes, entry.sequence
            );
        }

        remove_artifact(&self.path_for(key));
    }

    #[cfg(test)]
    pub(crate) fn recorded_bytes(&self) -> u64 {
        self.state.lock().entries.values().map(|e| e.size_bytes).sum()
    }
}

fn remove_artifact(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            warn!("⚠️ No se pudo borrar {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const MB: u64 = 1024 * 1024;

    fn cache_with_capacity(capacity: u64) -> (tempfile::TempDir, AudioCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = AudioCache::open(dir.path(), capacity, "mp3").unwrap();
        (dir, cache)
    }

    fn insert(cache: &AudioCache, key: &str, size: u64) -> PinId {
        cache.reserve(key, size).unwrap();
        std::fs::write(cache.path_for(key), b"audio").unwrap();
        cache.commit(key, size).unwrap()
    }

    #[test]
    fn test_evicts_oldest_unpinned_to_fit() {
        let (_dir, cache) = cache_with_capacity(10 * MB);

        let a = insert(&cache, "A", 4 * MB);
        let _b = insert(&cache, "B", 4 * MB);
        cache.release("A", a);

        cache.reserve("C", 5 * MB).unwrap();
        cache.commit("C", 5 * MB).unwrap();

        assert!(!cache.contains("A"));
        assert!(!cache.path_for("A").exists());
        assert!(cache.contains("B"));
        assert!(cache.contains("C"));
        assert_eq!(cache.stats().used_bytes, 9 * MB);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_pinned_entry_is_never_evicted() {
        let (_dir, cache) = cache_with_capacity(10 * MB);

        // A es la más vieja pero sigue en uso
        let _a = insert(&cache, "A", 4 * MB);
        let b = insert(&cache, "B", 4 * MB);
        cache.release("B", b);

        cache.reserve("C", 5 * MB).unwrap();
        assert!(cache.contains("A"));
        assert!(!cache.contains("B"));

        let err = cache.reserve("D", 4 * MB).unwrap_err();
        assert!(matches!(err, PlaybackError::InsufficientCapacity { .. }));
        assert!(cache.contains("A"));
    }

    #[test]
    fn test_insufficient_capacity_does_not_evict() {
        let (_dir, cache) = cache_with_capacity(10 * MB);

        let a = insert(&cache, "A", 3 * MB);
        cache.release("A", a);
        let _b = insert(&cache, "B", 6 * MB);

        // Ni desalojando A (3 MB) caben 8 MB
        assert!(cache.reserve("C", 8 * MB).is_err());
        assert!(cache.contains("A"));
        assert_eq!(cache.stats().evictions, 0);

        // Más grande que toda la caché: fallo directo
        let err = cache.reserve("huge", 11 * MB).unwrap_err();
        assert_eq!(
            err,
            PlaybackError::InsufficientCapacity {
                key: "huge".into(),
                needed: 11 * MB,
                available: MB,
                capacity: 10 * MB,
            }
        );
    }

    #[test]
    fn test_release_is_idempotent() {
        let (_dir, cache) = cache_with_capacity(10 * MB);

        let a = insert(&cache, "A", 2 * MB);
        assert!(cache.is_pinned("A"));

        cache.release("A", a);
        let after_first = cache.stats();
        cache.release("A", a);

        assert_eq!(cache.stats(), after_first);
        assert!(!cache.is_pinned("A"));
        assert_eq!(cache.stats().used_bytes, 2 * MB);

        // Clave inexistente: no-op
        cache.release("missing", a);
    }

    #[test]
    fn test_entry_stays_pinned_until_every_pin_is_released() {
        let (_dir, cache) = cache_with_capacity(10 * MB);

        let first = insert(&cache, "A", 2 * MB);
        let second = cache.pin("A").unwrap();

        cache.release("A", first);
        assert!(cache.is_pinned("A"));

        cache.release("A", second);
        assert!(!cache.is_pinned("A"));
    }

    #[test]
    fn test_double_commit_does_not_double_count() {
        let (_dir, cache) = cache_with_capacity(10 * MB);

        cache.reserve("A", 3 * MB).unwrap();
        cache.reserve("A", 3 * MB).unwrap();
        assert_eq!(cache.stats().reserved_bytes, 3 * MB);

        let first = cache.commit("A", 3 * MB).unwrap();
        let second = cache.commit("A", 3 * MB).unwrap();

        assert_ne!(first, second);
        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.used_bytes, 3 * MB);
        assert_eq!(stats.reserved_bytes, 0);
    }

    #[test]
    fn test_repin_refreshes_age() {
        let (_dir, cache) = cache_with_capacity(10 * MB);

        let a = insert(&cache, "A", 4 * MB);
        let b = insert(&cache, "B", 4 * MB);
        cache.release("A", a);
        cache.release("B", b);

        // A se vuelve a usar: ahora B es la más vieja
        let again = cache.pin("A").unwrap();
        cache.release("A", again);

        cache.reserve("C", 4 * MB).unwrap();
        assert!(cache.contains("A"));
        assert!(!cache.contains("B"));
    }

    #[test]
    fn test_commit_larger_than_reservation_evicts_or_fails() {
        let (_dir, cache) = cache_with_capacity(10 * MB);

        let a = insert(&cache, "A", 5 * MB);
        cache.release("A", a);

        cache.reserve("B", 4 * MB).unwrap();
        std::fs::write(cache.path_for("B"), b"audio").unwrap();
        cache.commit("B", 6 * MB).unwrap();
        assert!(!cache.contains("A"));
        assert_eq!(cache.stats().used_bytes, 6 * MB);

        cache.reserve("C", 3 * MB).unwrap();
        std::fs::write(cache.path_for("C"), b"audio").unwrap();
        let err = cache.commit("C", 5 * MB).unwrap_err();
        assert!(matches!(err, PlaybackError::InsufficientCapacity { .. }));
        assert!(!cache.path_for("C").exists());
        assert_eq!(cache.stats().reserved_bytes, 0);
    }

    #[test]
    fn test_cancel_reservation_frees_space() {
        let (_dir, cache) = cache_with_capacity(10 * MB);

        cache.reserve("A", 8 * MB).unwrap();
        assert!(cache.reserve("B", 4 * MB).is_err());

        cache.cancel_reservation("A");
        cache.cancel_reservation("A");
        assert!(cache.reserve("B", 4 * MB).is_ok());
        assert_eq!(cache.stats().reserved_bytes, 4 * MB);
    }

    #[test]
    fn test_accounting_invariant_under_random_operations() {
        let (_dir, cache) = cache_with_capacity(32 * MB);
        let mut rng = StdRng::seed_from_u64(7);
        let mut pins: Vec<(String, PinId)> = Vec::new();

        for step in 0..500 {
            let key = format!("track{}", rng.gen_range(0..24));
            match rng.gen_range(0..4) {
                0 | 1 => {
                    let size = rng.gen_range(1..=6) * MB;
                    if cache.reserve(&key, size).is_ok() {
                        if let Ok(pin) = cache.commit(&key, size) {
                            pins.push((key, pin));
                        }
                    }
                }
                2 if !pins.is_empty() => {
                    let (key, pin) = pins.swap_remove(rng.gen_range(0..pins.len()));
                    cache.release(&key, pin);
                }
                _ => {
                    if let Some(pin) = cache.pin(&key) {
                        pins.push((key, pin));
                    }
                }
            }

            let stats = cache.stats();
            assert_eq!(stats.used_bytes, cache.recorded_bytes(), "paso {}", step);
            assert!(stats.used_bytes <= stats.capacity_bytes, "paso {}", step);
            for (key, _) in &pins {
                assert!(cache.contains(key), "{} con pin fue desalojada", key);
            }
        }
    }

    #[test]
    fn test_open_indexes_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.mp3"), vec![0u8; 600]).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
        std::fs::write(dir.path().join("half.mp3.part"), b"partial").unwrap();

        let cache = AudioCache::open(dir.path(), 1000, "mp3").unwrap();
        assert!(cache.contains("old"));
        assert!(!cache.is_pinned("old"));
        assert_eq!(cache.stats().used_bytes, 600);
        assert!(!dir.path().join("half.mp3.part").exists());

        // Las entradas indexadas se pueden desalojar
        cache.reserve("new", 700).unwrap();
        assert!(!cache.contains("old"));
        assert!(!dir.path().join("old.mp3").exists());
    }

    #[test]
    fn test_open_trims_to_capacity() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mp3"), vec![0u8; 400]).unwrap();
        std::fs::write(dir.path().join("b.mp3"), vec![0u8; 400]).unwrap();

        let cache = AudioCache::open(dir.path(), 500, "mp3").unwrap();
        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.used_bytes, 400);
    }

    #[test]
    fn test_zero_capacity_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AudioCache::open(dir.path(), 0, "mp3").unwrap_err();
        assert!(matches!(err, PlaybackError::Configuration(_)));
    }

    #[test]
    fn test_path_for_keeps_keys_apart() {
        let (dir, cache) = cache_with_capacity(MB);
        assert_eq!(cache.path_for("dQw4w9WgXcQ"), dir.path().join("dQw4w9WgXcQ.mp3"));
        assert_eq!(cache.path_for("../x"), dir.path().join("=2e2e2f78.mp3"));
        assert_ne!(cache.path_for("my.song"), cache.path_for("my_song"));

        for key in ["dQw4w9WgXcQ", "my.song", "my_song", "título/ñ", ""] {
            assert_eq!(key_from_stem(&file_stem_for(key)).as_deref(), Some(key));
        }
        // Una clave simple disfrazada de codificada no se acepta
        assert_eq!(key_from_stem("=61"), None);
        assert_eq!(key_from_stem("con espacio"), None);
    }

    #[test]
    fn test_warm_start_keeps_encoded_keys() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = AudioCache::open(dir.path(), 1000, "mp3").unwrap();
            for key in ["my.song", "my_song"] {
                cache.reserve(key, 100).unwrap();
                std::fs::write(cache.path_for(key), vec![0u8; 100]).unwrap();
                cache.commit(key, 100).unwrap();
            }
        }

        let cache = AudioCache::open(dir.path(), 1000, "mp3").unwrap();
        assert!(cache.contains("my.song"));
        assert!(cache.contains("my_song"));
        assert_eq!(cache.stats().used_bytes, 200);

        // Volver a pedir la clave reutiliza la entrada indexada
        let pin = cache.pin("my.song").unwrap();
        assert_eq!(cache.stats().entries, 2);
        assert_eq!(cache.recorded_bytes(), 200);

        // Desalojar la otra no toca el archivo en uso
        cache.reserve("otra", 950).unwrap_err();
        assert!(cache.contains("my_song"));
        cache.reserve("otra", 900).unwrap();
        assert!(!cache.contains("my_song"));
        assert!(cache.path_for("my.song").exists());
        cache.release("my.song", pin);
    }
}
