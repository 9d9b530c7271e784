//! Backend selection
//!
//! NdArray (CPU) is the default so the crate builds and tests anywhere;
//! enabling the `cuda` feature switches every alias to the CUDA backend.
//! TF32 tensor-core matmul is the CUDA backend's own default, so there is
//! nothing to toggle here.

use burn::backend::Autodiff;

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda;

#[cfg(not(feature = "cuda"))]
pub type DefaultBackend = burn::backend::NdArray<f32>;

/// The default autodiff backend for training
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Get the default device for the compiled backend
pub fn default_device() -> <DefaultBackend as burn::tensor::backend::Backend>::Device {
    #[cfg(feature = "cuda")]
    {
        // First GPU
        burn_cuda::CudaDevice::default()
    }

    #[cfg(not(feature = "cuda"))]
    {
        burn::backend::ndarray::NdArrayDevice::default()
    }
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }

    #[cfg(not(feature = "cuda"))]
    {
        "NdArray (CPU)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_name_nonempty() {
        assert!(!backend_name().is_empty());
    }

    #[test]
    fn test_default_device() {
        // Must not panic on any compiled backend
        let _device = default_device();
    }
}
