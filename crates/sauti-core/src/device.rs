//! Compute device reporting for the wrapped toolkit.
//!
//! The toolkit runs in a worker process, so device detection happens by
//! probing the worker at startup rather than by inspecting local hardware.
//! A `SAUTI_DEVICE` preference can pin the choice; an unreachable worker
//! degrades to the CPU profile.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::inference::WorkerStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Cuda,
    Cpu,
}

impl DeviceKind {
    pub fn is_cuda(&self) -> bool {
        matches!(self, DeviceKind::Cuda)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Cuda => "cuda",
            DeviceKind::Cpu => "cpu",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Numeric precision the toolkit runs inference with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeType {
    Float16,
    Int8,
}

impl ComputeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComputeType::Float16 => "float16",
            ComputeType::Int8 => "int8",
        }
    }
}

impl fmt::Display for ComputeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolved compute profile for the process lifetime.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceProfile {
    pub kind: DeviceKind,
    pub compute_type: ComputeType,
    pub cuda_available: bool,
    pub gpu_count: u32,
}

impl DeviceProfile {
    pub fn cpu() -> Self {
        Self {
            kind: DeviceKind::Cpu,
            compute_type: ComputeType::Int8,
            cuda_available: false,
            gpu_count: 0,
        }
    }

    pub fn cuda(gpu_count: u32) -> Self {
        Self {
            kind: DeviceKind::Cuda,
            compute_type: ComputeType::Float16,
            cuda_available: true,
            gpu_count,
        }
    }

    /// Resolve the profile from a worker probe, honoring an explicit
    /// device preference when it is satisfiable.
    pub fn from_status(status: &WorkerStatus, preference: Option<&str>) -> Self {
        match preference.unwrap_or("") {
            "cpu" => Self::cpu(),
            "cuda" => {
                if status.cuda_available {
                    Self::cuda(status.gpu_count)
                } else {
                    warn!("Device preference 'cuda' requested but worker reports no CUDA, using CPU");
                    Self::cpu()
                }
            }
            _ => {
                if status.cuda_available {
                    Self::cuda(status.gpu_count)
                } else {
                    Self::cpu()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(cuda_available: bool, gpu_count: u32) -> WorkerStatus {
        WorkerStatus {
            device: if cuda_available { "cuda".into() } else { "cpu".into() },
            cuda_available,
            gpu_count,
        }
    }

    #[test]
    fn cpu_profile_reports_no_gpus() {
        let profile = DeviceProfile::cpu();
        assert_eq!(profile.kind, DeviceKind::Cpu);
        assert_eq!(profile.compute_type, ComputeType::Int8);
        assert!(!profile.cuda_available);
        assert_eq!(profile.gpu_count, 0);
    }

    #[test]
    fn cuda_pairs_with_float16() {
        let profile = DeviceProfile::from_status(&status(true, 2), None);
        assert_eq!(profile.kind, DeviceKind::Cuda);
        assert_eq!(profile.compute_type, ComputeType::Float16);
        assert!(profile.cuda_available);
        assert_eq!(profile.gpu_count, 2);
    }

    #[test]
    fn cpu_preference_overrides_available_cuda() {
        let profile = DeviceProfile::from_status(&status(true, 1), Some("cpu"));
        assert_eq!(profile.kind, DeviceKind::Cpu);
        assert_eq!(profile.gpu_count, 0);
    }

    #[test]
    fn cuda_preference_degrades_without_hardware() {
        let profile = DeviceProfile::from_status(&status(false, 0), Some("cuda"));
        assert_eq!(profile.kind, DeviceKind::Cpu);
        assert!(!profile.cuda_available);
        assert_eq!(profile.gpu_count, 0);
    }
}
