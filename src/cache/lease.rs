use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use super::{AudioCache, PinId};

/// Pin sobre una entrada de la caché; se libera una sola vez, al soltarse o con [`CacheLease::release`].
#[derive(Debug)]
pub struct CacheLease {
    cache: Arc<AudioCache>,
    key: String,
    pin: PinId,
    path: PathBuf,
    released: AtomicBool,
}

impl CacheLease {
    pub(crate) fn new(cache: Arc<AudioCache>, key: &str, pin: PinId) -> Self {
        let path = cache.path_for(key);
        Self {
            cache,
            key: key.to_string(),
            pin,
            path,
            released: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.cache.release(&self.key, self.pin);
        }
    }
}

impl Drop for CacheLease {
    fn drop(&mut self) {
        self.release();
    }
}
