//! Load-once slot for a single model.
//!
//! The load runs in its own task, so a caller that gives up while waiting
//! does not abandon it: the session still lands in the slot and the next
//! caller picks it up instead of starting a second load.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::OnceCell;

use crate::error::PipelineError;

use super::ModelKind;

/// A lazily loaded, shared model handle.
pub struct LazyModel<T> {
    model: ModelKind,
    cell: Arc<OnceCell<Arc<T>>>,
}

impl<T> LazyModel<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(model: ModelKind) -> Self {
        Self {
            model,
            cell: Arc::new(OnceCell::new()),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    /// Return the loaded handle, running `load` first if nothing is loaded.
    ///
    /// Concurrent first callers wait on one load and share its handle. An
    /// error is handed to the callers of that attempt and leaves the slot
    /// empty for the next one.
    pub async fn get_or_load<F, Fut>(&self, load: F) -> Result<Arc<T>, PipelineError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, PipelineError>> + Send + 'static,
    {
        if let Some(loaded) = self.cell.get() {
            return Ok(Arc::clone(loaded));
        }

        let cell = Arc::clone(&self.cell);
        let model = self.model;
        tokio::spawn(async move {
            cell.get_or_try_init(|| async move {
                tracing::info!("Loading {} model...", model);
                let start = Instant::now();
                match load().await {
                    Ok(value) => {
                        tracing::info!("Loaded {} model in {:?}", model, start.elapsed());
                        Ok(Arc::new(value))
                    }
                    Err(e) => {
                        tracing::error!("Failed to load {} model: {}", model, e);
                        Err(e)
                    }
                }
            })
            .await
            .map(Arc::clone)
        })
        .await
        .map_err(|e| PipelineError::model_load(model, format!("Load task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    type BoxedLoad = Pin<Box<dyn Future<Output = Result<String, PipelineError>> + Send>>;

    fn counting_load(
        loads: &Arc<AtomicUsize>,
        delay: Duration,
    ) -> impl FnOnce() -> BoxedLoad + Send + 'static {
        let loads = Arc::clone(loads);
        move || {
            Box::pin(async move {
                loads.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                Ok("session".to_string())
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_access_loads_once() {
        let slot = Arc::new(LazyModel::<String>::new(ModelKind::TextEmbedder));
        let loads = Arc::new(AtomicUsize::new(0));

        let callers: Vec<_> = (0..8)
            .map(|_| {
                let slot = Arc::clone(&slot);
                let load = counting_load(&loads, Duration::from_millis(50));
                tokio::spawn(async move { slot.get_or_load(load).await })
            })
            .collect();

        let mut handles = Vec::new();
        for caller in callers {
            handles.push(caller.await.unwrap().unwrap());
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
        assert!(slot.is_loaded());
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let slot = LazyModel::<String>::new(ModelKind::ImageTagger);

        let err = slot
            .get_or_load(|| async {
                Err(PipelineError::model_load(
                    ModelKind::ImageTagger,
                    "artifact missing",
                ))
            })
            .await
            .unwrap_err();
        assert!(err.is_retryable_load());
        assert!(!slot.is_loaded());

        let loaded = slot
            .get_or_load(|| async { Ok("session".to_string()) })
            .await
            .unwrap();
        assert_eq!(loaded.as_str(), "session");

        // Once loaded, later loaders never run
        let again = slot
            .get_or_load(|| async {
                Err(PipelineError::model_load(ModelKind::ImageTagger, "unused"))
            })
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&loaded, &again));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropped_caller_does_not_abandon_load() {
        let slot = Arc::new(LazyModel::<String>::new(ModelKind::DualEncoder));
        let loads = Arc::new(AtomicUsize::new(0));

        let first = {
            let slot = Arc::clone(&slot);
            let load = counting_load(&loads, Duration::from_millis(200));
            tokio::spawn(async move { slot.get_or_load(load).await })
        };
        while loads.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        first.abort();

        let loaded = slot
            .get_or_load(counting_load(&loads, Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(loaded.as_str(), "session");
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }
}
