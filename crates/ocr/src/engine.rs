use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("No OCR engine became available within {0:?}")]
    Busy(Duration),
    #[error("OCR engine pool is closed")]
    Closed,
}

/// A fixed set of OCR engine instances, each lent to one caller at a time.
///
/// Waiting for an instance is bounded by the acquire timeout; a pool of one
/// is a plain mutex around a single engine.
pub struct EnginePool<R> {
    idle: Arc<Mutex<Vec<R>>>,
    permits: Arc<Semaphore>,
    capacity: usize,
    acquire_timeout: Duration,
}

impl<R: Send + 'static> EnginePool<R> {
    pub fn new(engines: Vec<R>, acquire_timeout: Duration) -> Self {
        let capacity = engines.len();
        Self {
            idle: Arc::new(Mutex::new(engines)),
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            acquire_timeout,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Engines not currently checked out.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait up to the acquire timeout for exclusive use of one engine.
    pub async fn checkout(&self) -> Result<PooledEngine<R>, PoolError> {
        let permit = tokio::time::timeout(self.acquire_timeout, self.permits.clone().acquire_owned())
            .await
            .map_err(|_| PoolError::Busy(self.acquire_timeout))?
            .map_err(|_| PoolError::Closed)?;

        let engine = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .ok_or(PoolError::Closed)?;

        Ok(PooledEngine {
            engine: Some(engine),
            idle: Arc::clone(&self.idle),
            _permit: permit,
        })
    }
}

/// An engine on loan from an [`EnginePool`]. Goes back to the pool on drop,
/// even if the request that borrowed it has already been abandoned.
pub struct PooledEngine<R> {
    engine: Option<R>,
    idle: Arc<Mutex<Vec<R>>>,
    // Released after `drop` has put the engine back.
    _permit: OwnedSemaphorePermit,
}

impl<R> Deref for PooledEngine<R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.engine.as_ref().expect("engine present until drop")
    }
}

impl<R> DerefMut for PooledEngine<R> {
    fn deref_mut(&mut self) -> &mut R {
        self.engine.as_mut().expect("engine present until drop")
    }
}

impl<R> Drop for PooledEngine<R> {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            self.idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(engine);
        }
    }
}
