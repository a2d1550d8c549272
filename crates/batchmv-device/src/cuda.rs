//! CUDA device using the driver API and cuBLAS.

use crate::device::{BackendType, Copy2d, Device, PitchedAllocation};
use crate::error::{BlasStatus, DeviceError, Result};
use batchmv_core::{BatchedGemm, DeviceAddress, Precision, Transpose};
use cudarc::cublas::{CudaBlas, sys as cublas_sys};
use cudarc::driver::{CudaContext, CudaStream, sys};
use std::ffi::{c_int, c_void};
use std::sync::Arc;

/// NVIDIA GPU driven through cudarc.
pub struct CudaDevice {
    ctx: Arc<CudaContext>,
    stream: Arc<CudaStream>,
    blas: CudaBlas,
    name: String,
}

impl CudaDevice {
    /// Open device `ordinal`.
    ///
    /// # Errors
    /// Returns [`DeviceError::Unavailable`] if the CUDA library or device
    /// cannot be opened.
    pub fn new(ordinal: usize) -> Result<Self> {
        // cudarc panics if CUDA is not installed, so we need to catch that
        let ctx = match std::panic::catch_unwind(|| CudaContext::new(ordinal)) {
            Ok(Ok(ctx)) => ctx,
            Ok(Err(e)) => {
                return Err(DeviceError::Unavailable(format!(
                    "CUDA context creation failed: {}",
                    e
                )));
            }
            Err(_) => {
                return Err(DeviceError::Unavailable(
                    "CUDA not available (library not found)".to_string(),
                ));
            }
        };
        let stream = ctx.default_stream();
        let blas = CudaBlas::new(stream.clone())
            .map_err(|e| DeviceError::Unavailable(format!("cuBLAS init failed: {:?}", e)))?;

        let name = format!("CUDA device {}", ordinal);
        log::info!("Created {}", name);
        Ok(Self {
            ctx,
            stream,
            blas,
            name,
        })
    }

    /// Check whether a CUDA device can be opened.
    pub fn is_available() -> bool {
        Self::new(0).is_ok()
    }

    fn bind(&self) -> Result<()> {
        self.ctx
            .bind_to_thread()
            .map_err(|e| DeviceError::Driver(format!("bind context: {}", e)))
    }
}

fn check(result: sys::CUresult, what: &str) -> std::result::Result<(), String> {
    if result == sys::CUresult::CUDA_SUCCESS {
        Ok(())
    } else {
        Err(format!("{} failed: {:?}", what, result))
    }
}

fn blas_status(status: cublas_sys::cublasStatus_t) -> std::result::Result<(), BlasStatus> {
    use cublas_sys::cublasStatus_t as S;
    match status {
        S::CUBLAS_STATUS_SUCCESS => Ok(()),
        S::CUBLAS_STATUS_NOT_INITIALIZED => Err(BlasStatus::NotInitialized),
        S::CUBLAS_STATUS_ALLOC_FAILED => Err(BlasStatus::AllocFailed),
        S::CUBLAS_STATUS_INVALID_VALUE => Err(BlasStatus::InvalidValue),
        S::CUBLAS_STATUS_ARCH_MISMATCH => Err(BlasStatus::ArchMismatch),
        S::CUBLAS_STATUS_MAPPING_ERROR => Err(BlasStatus::MappingError),
        S::CUBLAS_STATUS_EXECUTION_FAILED => Err(BlasStatus::ExecutionFailed),
        S::CUBLAS_STATUS_NOT_SUPPORTED => Err(BlasStatus::NotSupported),
        S::CUBLAS_STATUS_LICENSE_ERROR => Err(BlasStatus::LicenseError),
        _ => Err(BlasStatus::InternalError),
    }
}

fn operation(t: Transpose) -> cublas_sys::cublasOperation_t {
    match t {
        Transpose::No => cublas_sys::cublasOperation_t::CUBLAS_OP_N,
        Transpose::Yes => cublas_sys::cublasOperation_t::CUBLAS_OP_T,
    }
}

fn dim(value: usize) -> Result<c_int> {
    c_int::try_from(value).map_err(|_| DeviceError::Blas(BlasStatus::InvalidValue))
}

impl Device for CudaDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Cuda
    }

    fn alloc_pitched(
        &self,
        width_bytes: usize,
        height: usize,
        element_size: usize,
    ) -> Result<PitchedAllocation> {
        self.bind()?;
        let elem = u32::try_from(element_size).map_err(|_| DeviceError::Alloc {
            bytes: width_bytes,
            reason: format!("unsupported element size {}", element_size),
        })?;
        let mut ptr: sys::CUdeviceptr = 0;
        let mut pitch_bytes: usize = 0;
        let result = unsafe {
            sys::cuMemAllocPitch_v2(&mut ptr, &mut pitch_bytes, width_bytes, height, elem)
        };
        check(result, "cuMemAllocPitch").map_err(|reason| DeviceError::Alloc {
            bytes: width_bytes.saturating_mul(height),
            reason,
        })?;
        Ok(PitchedAllocation { ptr, pitch_bytes })
    }

    fn alloc_linear(&self, bytes: usize) -> Result<DeviceAddress> {
        self.bind()?;
        let mut ptr: sys::CUdeviceptr = 0;
        let result = unsafe { sys::cuMemAlloc_v2(&mut ptr, bytes) };
        check(result, "cuMemAlloc").map_err(|reason| DeviceError::Alloc { bytes, reason })?;
        Ok(ptr)
    }

    fn copy_htod_2d(&self, dst: DeviceAddress, src: &[u8], copy: &Copy2d) -> Result<()> {
        copy.check(src.len(), copy.src_pitch)?;
        self.bind()?;
        let params = sys::CUDA_MEMCPY2D {
            srcXInBytes: 0,
            srcY: 0,
            srcMemoryType: sys::CUmemorytype::CU_MEMORYTYPE_HOST,
            srcHost: src.as_ptr().cast::<c_void>(),
            srcDevice: 0,
            srcArray: std::ptr::null_mut(),
            srcPitch: copy.src_pitch,
            dstXInBytes: 0,
            dstY: 0,
            dstMemoryType: sys::CUmemorytype::CU_MEMORYTYPE_DEVICE,
            dstHost: std::ptr::null_mut(),
            dstDevice: dst,
            dstArray: std::ptr::null_mut(),
            dstPitch: copy.dst_pitch,
            WidthInBytes: copy.width_bytes,
            Height: copy.height,
        };
        let result = unsafe { sys::cuMemcpy2D_v2(&params) };
        check(result, "cuMemcpy2D (host to device)").map_err(DeviceError::Transfer)
    }

    fn copy_dtoh_2d(&self, dst: &mut [u8], src: DeviceAddress, copy: &Copy2d) -> Result<()> {
        copy.check(dst.len(), copy.dst_pitch)?;
        self.bind()?;
        let params = sys::CUDA_MEMCPY2D {
            srcXInBytes: 0,
            srcY: 0,
            srcMemoryType: sys::CUmemorytype::CU_MEMORYTYPE_DEVICE,
            srcHost: std::ptr::null(),
            srcDevice: src,
            srcArray: std::ptr::null_mut(),
            srcPitch: copy.src_pitch,
            dstXInBytes: 0,
            dstY: 0,
            dstMemoryType: sys::CUmemorytype::CU_MEMORYTYPE_HOST,
            dstHost: dst.as_mut_ptr().cast::<c_void>(),
            dstDevice: 0,
            dstArray: std::ptr::null_mut(),
            dstPitch: copy.dst_pitch,
            WidthInBytes: copy.width_bytes,
            Height: copy.height,
        };
        let result = unsafe { sys::cuMemcpy2D_v2(&params) };
        check(result, "cuMemcpy2D (device to host)").map_err(DeviceError::Transfer)
    }

    fn copy_htod(&self, dst: DeviceAddress, src: &[u8]) -> Result<()> {
        self.bind()?;
        let result =
            unsafe { sys::cuMemcpyHtoD_v2(dst, src.as_ptr().cast::<c_void>(), src.len()) };
        check(result, "cuMemcpyHtoD").map_err(DeviceError::Transfer)
    }

    fn free(&self, ptr: DeviceAddress) -> Result<()> {
        self.bind()?;
        let result = unsafe { sys::cuMemFree_v2(ptr) };
        check(result, "cuMemFree").map_err(DeviceError::Driver)
    }

    fn gemm_batched(&self, gemm: &BatchedGemm) -> Result<()> {
        gemm.validate()
            .map_err(|_| DeviceError::Blas(BlasStatus::InvalidValue))?;
        self.bind()?;

        let handle = *self.blas.handle();
        let (m, n, k) = (dim(gemm.m)?, dim(gemm.n)?, dim(gemm.k)?);
        let (lda, ldb, ldc) = (dim(gemm.lda)?, dim(gemm.ldb)?, dim(gemm.ldc)?);
        let count = dim(gemm.batch_count)?;
        let (transa, transb) = (operation(gemm.transa), operation(gemm.transb));

        // The pointer arrays live in device memory; cuBLAS dereferences them.
        let status = match gemm.precision {
            Precision::Single => {
                let (alpha, beta) = (gemm.alpha as f32, gemm.beta as f32);
                unsafe {
                    cublas_sys::cublasSgemmBatched(
                        handle,
                        transa,
                        transb,
                        m,
                        n,
                        k,
                        &alpha,
                        gemm.a_array as *const *const f32,
                        lda,
                        gemm.b_array as *const *const f32,
                        ldb,
                        &beta,
                        gemm.c_array as *const *mut f32,
                        ldc,
                        count,
                    )
                }
            }
            Precision::Double => {
                let (alpha, beta) = (gemm.alpha, gemm.beta);
                unsafe {
                    cublas_sys::cublasDgemmBatched(
                        handle,
                        transa,
                        transb,
                        m,
                        n,
                        k,
                        &alpha,
                        gemm.a_array as *const *const f64,
                        lda,
                        gemm.b_array as *const *const f64,
                        ldb,
                        &beta,
                        gemm.c_array as *const *mut f64,
                        ldc,
                        count,
                    )
                }
            }
        };
        blas_status(status).map_err(DeviceError::Blas)
    }

    fn synchronize(&self) -> Result<()> {
        self.stream
            .synchronize()
            .map_err(|e| DeviceError::Driver(format!("stream synchronize: {}", e)))
    }
}
