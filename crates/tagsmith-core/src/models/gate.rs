//! Serialized access to the shared accelerator.
//!
//! Every device-bound inference call goes through one [`DeviceGate`], so at
//! most one such call is in flight at a time. The permit travels into the
//! blocking task and is released only when the task finishes, even if the
//! awaiting caller was dropped.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::PipelineError;

use super::ModelKind;

/// Single-permit gate around blocking inference.
#[derive(Debug, Clone)]
pub struct DeviceGate {
    permits: Arc<Semaphore>,
}

impl Default for DeviceGate {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceGate {
    pub fn new() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(1)),
        }
    }

    /// Whether the gate is free right now.
    pub fn is_idle(&self) -> bool {
        self.permits.available_permits() > 0
    }

    /// Wait for the gate, then run `f` on the blocking pool.
    pub async fn run<T, F>(&self, model: ModelKind, f: F) -> Result<T, PipelineError>
    where
        F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| PipelineError::inference(model, format!("Device gate closed: {e}")))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f()
        })
        .await
        .map_err(|e| PipelineError::inference(model, format!("Inference task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_returns_closure_result() {
        let gate = DeviceGate::new();
        let value = gate.run(ModelKind::ImageTagger, || Ok(41 + 1)).await.unwrap();
        assert_eq!(value, 42);
        assert!(gate.is_idle());
    }

    #[tokio::test]
    async fn test_closure_error_propagates() {
        let gate = DeviceGate::new();
        let err = gate
            .run::<(), _>(ModelKind::DualEncoder, || {
                Err(PipelineError::inference(ModelKind::DualEncoder, "boom"))
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert!(gate.is_idle());
    }

    #[tokio::test]
    async fn test_panicking_task_releases_gate() {
        let gate = DeviceGate::new();
        let err = gate
            .run::<(), _>(ModelKind::ImageTagger, || panic!("device fault"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Inference { .. }));
        assert!(gate.is_idle());
    }
}
