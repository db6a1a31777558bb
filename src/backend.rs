//! Backend abstraction - Multi-backend support
//!
//! NdArray (CPU) is always compiled in. CUDA is available with the `cuda`
//! feature. Entry points take an explicit [`ComputeBackend`] and resolve it
//! once with [`resolve`].

use burn::backend::Autodiff;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// CPU backend
pub type CpuBackend = burn_ndarray::NdArray;

/// Autodiff CPU backend for training
pub type TrainingBackend = Autodiff<CpuBackend>;

#[cfg(feature = "cuda")]
pub type GpuBackend = burn_cuda::Cuda;

#[cfg(feature = "cuda")]
pub type GpuTrainingBackend = Autodiff<GpuBackend>;

/// Backend requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ComputeBackend {
    /// GPU when compiled in and detected, CPU otherwise
    #[default]
    Auto,
    Cpu,
    Gpu,
}

/// Backend actually used after resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBackend {
    Cpu,
    #[cfg(feature = "cuda")]
    Gpu,
}

impl ResolvedBackend {
    pub fn name(&self) -> &'static str {
        match self {
            ResolvedBackend::Cpu => "NdArray (CPU)",
            #[cfg(feature = "cuda")]
            ResolvedBackend::Gpu => "CUDA (GPU)",
        }
    }
}

/// Whether this build carries an accelerator backend
pub fn gpu_compiled() -> bool {
    cfg!(feature = "cuda")
}

/// Name of the first NVIDIA GPU reported by `nvidia-smi`, if any
pub fn detect_gpu() -> Option<String> {
    let output = std::process::Command::new("nvidia-smi")
        .args(["--query-gpu=name", "--format=csv,noheader"])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let name = stdout.lines().next()?.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Pick the backend for `requested`. Never fails: a missing GPU falls back to CPU.
pub fn resolve(requested: ComputeBackend) -> ResolvedBackend {
    let resolved = match requested {
        ComputeBackend::Cpu => ResolvedBackend::Cpu,
        ComputeBackend::Auto => gpu_if_available().unwrap_or(ResolvedBackend::Cpu),
        ComputeBackend::Gpu => gpu_if_available().unwrap_or_else(|| {
            warn!("GPU backend requested but unavailable, falling back to CPU");
            ResolvedBackend::Cpu
        }),
    };
    info!("Using backend: {}", resolved.name());
    resolved
}

#[cfg(feature = "cuda")]
fn gpu_if_available() -> Option<ResolvedBackend> {
    detect_gpu().map(|_| ResolvedBackend::Gpu)
}

#[cfg(not(feature = "cuda"))]
fn gpu_if_available() -> Option<ResolvedBackend> {
    None
}
