//! Execution backend selection for ONNX Runtime sessions.
//!
//! Picks the CUDA execution provider when it is requested and present on this
//! machine, otherwise the CPU provider. Selection never fails.

use std::fmt;
use std::path::Path;

use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::models::ModelKind;

/// Backend requested by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// Use CUDA when available, silently fall back to CPU
    #[default]
    Auto,
    /// Use CUDA; warn when falling back to CPU
    Cuda,
    /// Always run on the CPU
    Cpu,
}

/// Backend a session actually runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Cuda,
    Cpu,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Cuda => f.write_str("cuda"),
            DeviceKind::Cpu => f.write_str("cpu"),
        }
    }
}

/// Resolve a preference to a concrete backend by probing ONNX Runtime.
pub fn select_device(preference: DevicePreference) -> DeviceKind {
    if preference == DevicePreference::Cpu {
        return DeviceKind::Cpu;
    }
    resolve(preference, cuda_available())
}

/// Pure selection rule, separated from the runtime probe.
fn resolve(preference: DevicePreference, cuda_available: bool) -> DeviceKind {
    match preference {
        DevicePreference::Cpu => DeviceKind::Cpu,
        DevicePreference::Auto if cuda_available => DeviceKind::Cuda,
        DevicePreference::Auto => {
            tracing::debug!("CUDA execution provider not available, using CPU");
            DeviceKind::Cpu
        }
        DevicePreference::Cuda if cuda_available => DeviceKind::Cuda,
        DevicePreference::Cuda => {
            tracing::warn!("CUDA requested but not available, falling back to CPU");
            DeviceKind::Cpu
        }
    }
}

fn cuda_available() -> bool {
    let ep = CUDAExecutionProvider::default();
    ep.supported_by_platform() && ep.is_available().unwrap_or(false)
}

/// Build an ONNX Runtime session for `model_path` on the given device.
///
/// The CPU provider is always the implicit fallback, so a CUDA session still
/// runs nodes the CUDA provider cannot handle.
pub(crate) fn build_session(
    model: ModelKind,
    model_path: &Path,
    device: DeviceKind,
) -> Result<Session, PipelineError> {
    let committed = match device {
        DeviceKind::Cuda => Session::builder()
            .map_err(|e| builder_error(model, e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| builder_error(model, e))?
            .with_execution_providers([CUDAExecutionProvider::default().build()])
            .map_err(|e| {
                PipelineError::model_load(model, format!("Failed to register CUDA provider: {e}"))
            })?
            .commit_from_file(model_path),
        DeviceKind::Cpu => Session::builder()
            .map_err(|e| builder_error(model, e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| builder_error(model, e))?
            .commit_from_file(model_path),
    };

    let session = committed.map_err(|e| {
        PipelineError::model_load(
            model,
            format!("Failed to load ONNX model {:?}: {e}", model_path),
        )
    })?;

    tracing::debug!(
        "Built {} session on {} (inputs: {:?}, outputs: {:?})",
        model,
        device,
        session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
        session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>()
    );

    Ok(session)
}

fn builder_error(model: ModelKind, e: impl fmt::Display) -> PipelineError {
    PipelineError::model_load(model, format!("Failed to configure ONNX session: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_preference_ignores_cuda() {
        assert_eq!(resolve(DevicePreference::Cpu, true), DeviceKind::Cpu);
        assert_eq!(resolve(DevicePreference::Cpu, false), DeviceKind::Cpu);
    }

    #[test]
    fn test_auto_prefers_cuda_when_present() {
        assert_eq!(resolve(DevicePreference::Auto, true), DeviceKind::Cuda);
        assert_eq!(resolve(DevicePreference::Auto, false), DeviceKind::Cpu);
    }

    #[test]
    fn test_cuda_request_degrades_to_cpu() {
        assert_eq!(resolve(DevicePreference::Cuda, true), DeviceKind::Cuda);
        assert_eq!(resolve(DevicePreference::Cuda, false), DeviceKind::Cpu);
    }

    #[test]
    fn test_preference_parses_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            device: DevicePreference,
        }
        let w: Wrapper = toml::from_str("device = \"cuda\"").unwrap();
        assert_eq!(w.device, DevicePreference::Cuda);
    }

    #[test]
    fn test_device_kind_display() {
        assert_eq!(DeviceKind::Cuda.to_string(), "cuda");
        assert_eq!(DeviceKind::Cpu.to_string(), "cpu");
    }
}
