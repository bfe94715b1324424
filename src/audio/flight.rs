use parking_lot::Mutex;
use std::{collections::HashMap, future::Future, sync::Arc};
use tokio::sync::watch;
use tracing::debug;

use crate::error::{PlaybackError, PlaybackResult};

type Outcome<T> = Option<PlaybackResult<T>>;

/// Una sola ejecución concurrente por clave; el resto espera su resultado.
///
/// El trabajo corre en su propia tarea: soltar a cualquier llamador, incluido
/// el primero, no lo cancela.
pub struct SingleFlight<T> {
    pending: Arc<Mutex<HashMap<String, watch::Receiver<Outcome<T>>>>>,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn run<F, Fut>(&self, key: &str, work: F) -> PlaybackResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PlaybackResult<T>> + Send + 'static,
    {
        let mut rx = {
            let mut pending = self.pending.lock();
            match pending.get(key) {
                Some(rx) => {
                    debug!("⏳ Esperando resolución en curso: {}", key);
                    rx.clone()
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    pending.insert(key.to_string(), rx.clone());

                    let guard = PendingGuard {
                        pending: self.pending.clone(),
                        key: key.to_string(),
                    };
                    let fut = work();
                    tokio::spawn(async move {
                        let outcome = fut.await;
                        // Quitar la entrada antes de publicar: quien despierte ya no la ve
                        drop(guard);
                        let _ = tx.send(Some(outcome));
                    });
                    rx
                }
            }
        };

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };

        outcome.unwrap_or_else(|| Err(PlaybackError::resolution(key, "resolución abortada")))
    }

    /// Claves con trabajo en curso
    pub fn in_flight(&self) -> usize {
        self.pending.lock().len()
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Quita la clave del mapa al terminar (o al entrar en pánico) el trabajo.
struct PendingGuard<T> {
    pending: Arc<Mutex<HashMap<String, watch::Receiver<Outcome<T>>>>>,
    key: String,
}

impl<T> Drop for PendingGuard<T> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.key);
    }
}
