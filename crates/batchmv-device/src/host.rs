//! Host-emulated device.
//!
//! Emulates an accelerator in host memory: allocations live at aligned
//! addresses in a private address space, pitched allocations get padded rows,
//! and fresh memory is filled with a NaN bit pattern so reads of
//! uninitialized data are visible. The batched GEMM dereferences pointer
//! tables stored in device memory, exactly like a BLAS library would.

use crate::device::{BackendType, Copy2d, Device, PitchedAllocation};
use crate::error::{BlasStatus, DeviceError, Result};
use batchmv_core::{BatchedGemm, DeviceAddress, Precision, Scalar, Transpose, operand_extent};
use bytemuck::Pod;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default row pitch alignment in bytes.
pub const DEFAULT_PITCH_ALIGNMENT: usize = 512;

/// Alignment of allocation base addresses.
const BASE_ALIGNMENT: u64 = 256;

/// First address handed out.
const ADDRESS_SPACE_START: DeviceAddress = 0x7000_0000_0000;

/// Fill byte for fresh allocations; all-ones is NaN for f32 and f64.
const UNINITIALIZED: u8 = 0xFF;

/// Configuration for the host device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostDeviceConfig {
    /// Row pitch alignment for pitched allocations, in bytes.
    pub pitch_alignment: usize,
    /// Total bytes the device may hold at once.
    pub memory_limit: Option<usize>,
}

impl Default for HostDeviceConfig {
    fn default() -> Self {
        Self {
            pitch_alignment: DEFAULT_PITCH_ALIGNMENT,
            memory_limit: None,
        }
    }
}

#[derive(Debug)]
struct Arena {
    allocations: BTreeMap<DeviceAddress, Vec<u8>>,
    next_base: DeviceAddress,
    bytes_in_use: usize,
    pending_failure: Option<BlasStatus>,
}

/// One GEMM instance gathered from device memory.
struct Instance<T> {
    a: Vec<T>,
    b: Vec<T>,
    c: Vec<T>,
}

impl Arena {
    fn new() -> Self {
        Self {
            allocations: BTreeMap::new(),
            next_base: ADDRESS_SPACE_START,
            bytes_in_use: 0,
            pending_failure: None,
        }
    }

    fn allocate(&mut self, bytes: usize, limit: Option<usize>) -> Result<DeviceAddress> {
        if bytes == 0 {
            return Err(DeviceError::Alloc {
                bytes,
                reason: "zero-sized allocation".to_string(),
            });
        }
        if let Some(limit) = limit {
            if self.bytes_in_use.saturating_add(bytes) > limit {
                return Err(DeviceError::Alloc {
                    bytes,
                    reason: format!(
                        "out of memory ({} of {} bytes in use)",
                        self.bytes_in_use, limit
                    ),
                });
            }
        }

        let mut mem = Vec::new();
        mem.try_reserve_exact(bytes)
            .map_err(|_| DeviceError::Alloc {
                bytes,
                reason: "host reservation failed".to_string(),
            })?;
        mem.resize(bytes, UNINITIALIZED);

        let base = self.next_base;
        let span = (bytes as u64).div_ceil(BASE_ALIGNMENT) * BASE_ALIGNMENT;
        self.next_base = base.checked_add(span).ok_or_else(|| DeviceError::Alloc {
            bytes,
            reason: "address space exhausted".to_string(),
        })?;

        self.allocations.insert(base, mem);
        self.bytes_in_use += bytes;
        Ok(base)
    }

    fn release(&mut self, addr: DeviceAddress) -> Result<()> {
        let mem = self
            .allocations
            .remove(&addr)
            .ok_or(DeviceError::InvalidAddress { addr })?;
        self.bytes_in_use -= mem.len();
        Ok(())
    }

    /// Find the allocation holding `addr..addr + len`.
    fn locate(&self, addr: DeviceAddress, len: usize) -> Result<(DeviceAddress, usize)> {
        let (&base, mem) = self
            .allocations
            .range(..=addr)
            .next_back()
            .ok_or(DeviceError::InvalidAddress { addr })?;
        let offset =
            usize::try_from(addr - base).map_err(|_| DeviceError::InvalidAddress { addr })?;
        match offset.checked_add(len) {
            Some(end) if end <= mem.len() => Ok((base, offset)),
            _ => Err(DeviceError::InvalidAddress { addr }),
        }
    }

    fn bytes(&self, addr: DeviceAddress, len: usize) -> Result<&[u8]> {
        let (base, offset) = self.locate(addr, len)?;
        let mem = self
            .allocations
            .get(&base)
            .ok_or(DeviceError::InvalidAddress { addr })?;
        Ok(&mem[offset..offset + len])
    }

    fn bytes_mut(&mut self, addr: DeviceAddress, len: usize) -> Result<&mut [u8]> {
        let (base, offset) = self.locate(addr, len)?;
        let mem = self
            .allocations
            .get_mut(&base)
            .ok_or(DeviceError::InvalidAddress { addr })?;
        Ok(&mut mem[offset..offset + len])
    }

    fn read<T: Pod>(&self, addr: DeviceAddress, count: usize) -> Result<Vec<T>> {
        let len = count
            .checked_mul(std::mem::size_of::<T>())
            .ok_or(DeviceError::InvalidAddress { addr })?;
        Ok(bytemuck::pod_collect_to_vec(self.bytes(addr, len)?))
    }

    fn write<T: Pod>(&mut self, addr: DeviceAddress, values: &[T]) -> Result<()> {
        let src: &[u8] = bytemuck::cast_slice(values);
        self.bytes_mut(addr, src.len())?.copy_from_slice(src);
        Ok(())
    }

    fn gemm<T: Scalar>(&mut self, gemm: &BatchedGemm) -> Result<()> {
        let elem = std::mem::size_of::<T>();
        let count = gemm.batch_count;
        let a_ptrs: Vec<DeviceAddress> = self.read(gemm.a_array, count).map_err(execution_failed)?;
        let b_ptrs: Vec<DeviceAddress> = self.read(gemm.b_array, count).map_err(execution_failed)?;
        let c_ptrs: Vec<DeviceAddress> = self.read(gemm.c_array, count).map_err(execution_failed)?;

        let (a_rows, a_cols) = gemm.a_shape();
        let (b_rows, b_cols) = gemm.b_shape();
        let invalid = || DeviceError::Blas(BlasStatus::InvalidValue);
        let a_len = operand_extent(a_rows, a_cols, gemm.lda).ok_or_else(invalid)?;
        let b_len = operand_extent(b_rows, b_cols, gemm.ldb).ok_or_else(invalid)?;
        let c_len = operand_extent(gemm.m, gemm.n, gemm.ldc).ok_or_else(invalid)?;

        let alpha = T::of(gemm.alpha);
        let beta = T::of(gemm.beta);
        let accumulate = beta != T::zero();

        let mut instances = Vec::with_capacity(count);
        for i in 0..count {
            let a = self.read::<T>(a_ptrs[i], a_len).map_err(execution_failed)?;
            let b = self.read::<T>(b_ptrs[i], b_len).map_err(execution_failed)?;
            // With beta == 0 the old contents of C are never read.
            let c = if accumulate {
                self.read::<T>(c_ptrs[i], c_len).map_err(execution_failed)?
            } else {
                self.locate(c_ptrs[i], c_len * elem)
                    .map_err(execution_failed)?;
                vec![T::zero(); c_len]
            };
            instances.push(Instance { a, b, c });
        }

        compute_instances(gemm, alpha, beta, &mut instances);

        // Only the m x n block is written; padding between columns stays put.
        for (inst, &c_ptr) in instances.iter().zip(&c_ptrs) {
            for j in 0..gemm.n {
                let col = &inst.c[j * gemm.ldc..j * gemm.ldc + gemm.m];
                let addr = c_ptr + (j * gemm.ldc * elem) as u64;
                self.write(addr, col).map_err(execution_failed)?;
            }
        }
        Ok(())
    }
}

#[cfg(feature = "parallel")]
fn compute_instances<T: Scalar>(
    gemm: &BatchedGemm,
    alpha: T,
    beta: T,
    instances: &mut [Instance<T>],
) {
    use rayon::prelude::*;
    instances
        .par_iter_mut()
        .for_each(|inst| gemm_instance(gemm, alpha, beta, &inst.a, &inst.b, &mut inst.c));
}

#[cfg(not(feature = "parallel"))]
fn compute_instances<T: Scalar>(
    gemm: &BatchedGemm,
    alpha: T,
    beta: T,
    instances: &mut [Instance<T>],
) {
    for inst in instances {
        gemm_instance(gemm, alpha, beta, &inst.a, &inst.b, &mut inst.c);
    }
}

fn execution_failed(e: DeviceError) -> DeviceError {
    log::debug!("host gemm: {}", e);
    DeviceError::Blas(BlasStatus::ExecutionFailed)
}

/// `C = alpha * op(A) * op(B) + beta * C` for one column-major instance.
fn gemm_instance<T: Scalar>(gemm: &BatchedGemm, alpha: T, beta: T, a: &[T], b: &[T], c: &mut [T]) {
    let op_a = |i: usize, p: usize| match gemm.transa {
        Transpose::No => a[i + p * gemm.lda],
        Transpose::Yes => a[p + i * gemm.lda],
    };
    let op_b = |p: usize, j: usize| match gemm.transb {
        Transpose::No => b[p + j * gemm.ldb],
        Transpose::Yes => b[j + p * gemm.ldb],
    };

    for j in 0..gemm.n {
        for i in 0..gemm.m {
            let mut acc = T::zero();
            for p in 0..gemm.k {
                acc += op_a(i, p) * op_b(p, j);
            }
            let idx = i + j * gemm.ldc;
            c[idx] = if beta == T::zero() {
                alpha * acc
            } else {
                alpha * acc + beta * c[idx]
            };
        }
    }
}

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 { a } else { gcd(b, a % b) }
}

/// Accelerator emulated in host memory.
#[derive(Debug)]
pub struct HostDevice {
    name: String,
    config: HostDeviceConfig,
    arena: Mutex<Arena>,
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HostDevice {
    /// Create a host device with the default configuration.
    pub fn new() -> Self {
        Self::with_config(HostDeviceConfig::default())
    }

    /// Create with custom configuration.
    pub fn with_config(config: HostDeviceConfig) -> Self {
        let config = HostDeviceConfig {
            pitch_alignment: config.pitch_alignment.max(1),
            ..config
        };
        log::info!(
            "Created host device (pitch alignment {} bytes)",
            config.pitch_alignment
        );
        Self {
            name: format!("host (pitch {})", config.pitch_alignment),
            config,
            arena: Mutex::new(Arena::new()),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &HostDeviceConfig {
        &self.config
    }

    /// Number of allocations not yet freed.
    pub fn live_allocations(&self) -> usize {
        self.arena().allocations.len()
    }

    /// Bytes currently allocated.
    pub fn bytes_in_use(&self) -> usize {
        self.arena().bytes_in_use
    }

    /// Make the next `gemm_batched` call fail with `status`.
    pub fn fail_next_gemm(&self, status: BlasStatus) {
        self.arena().pending_failure = Some(status);
    }

    /// Pitch the device picks for rows of `width_bytes`.
    pub fn pitch_for(&self, width_bytes: usize, element_size: usize) -> Option<usize> {
        let align = self.config.pitch_alignment;
        let align = (align / gcd(align, element_size)).checked_mul(element_size)?;
        width_bytes.checked_next_multiple_of(align)
    }

    fn arena(&self) -> MutexGuard<'_, Arena> {
        self.arena.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Device for HostDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Host
    }

    fn alloc_pitched(
        &self,
        width_bytes: usize,
        height: usize,
        element_size: usize,
    ) -> Result<PitchedAllocation> {
        if !matches!(element_size, 4 | 8 | 16) {
            return Err(DeviceError::Alloc {
                bytes: width_bytes,
                reason: format!("unsupported element size {}", element_size),
            });
        }
        let overflow = || DeviceError::Alloc {
            bytes: width_bytes,
            reason: "pitched size overflows".to_string(),
        };
        let pitch_bytes = self
            .pitch_for(width_bytes, element_size)
            .ok_or_else(overflow)?;
        let bytes = pitch_bytes.checked_mul(height).ok_or_else(overflow)?;

        let ptr = self.arena().allocate(bytes, self.config.memory_limit)?;
        Ok(PitchedAllocation { ptr, pitch_bytes })
    }

    fn alloc_linear(&self, bytes: usize) -> Result<DeviceAddress> {
        self.arena().allocate(bytes, self.config.memory_limit)
    }

    fn copy_htod_2d(&self, dst: DeviceAddress, src: &[u8], copy: &Copy2d) -> Result<()> {
        copy.check(src.len(), copy.src_pitch)?;
        let mut arena = self.arena();
        let dst_span = copy
            .span(copy.dst_pitch)
            .ok_or_else(|| DeviceError::Transfer("copy extent overflows".to_string()))?;
        arena.locate(dst, dst_span)?;

        for row in 0..copy.height {
            let start = row * copy.src_pitch;
            let addr = dst + (row * copy.dst_pitch) as u64;
            arena
                .bytes_mut(addr, copy.width_bytes)?
                .copy_from_slice(&src[start..start + copy.width_bytes]);
        }
        Ok(())
    }

    fn copy_dtoh_2d(&self, dst: &mut [u8], src: DeviceAddress, copy: &Copy2d) -> Result<()> {
        copy.check(dst.len(), copy.dst_pitch)?;
        let arena = self.arena();
        let src_span = copy
            .span(copy.src_pitch)
            .ok_or_else(|| DeviceError::Transfer("copy extent overflows".to_string()))?;
        arena.locate(src, src_span)?;

        for row in 0..copy.height {
            let start = row * copy.dst_pitch;
            let addr = src + (row * copy.src_pitch) as u64;
            dst[start..start + copy.width_bytes]
                .copy_from_slice(arena.bytes(addr, copy.width_bytes)?);
        }
        Ok(())
    }

    fn copy_htod(&self, dst: DeviceAddress, src: &[u8]) -> Result<()> {
        self.arena().write(dst, src)
    }

    fn free(&self, ptr: DeviceAddress) -> Result<()> {
        self.arena().release(ptr)
    }

    fn gemm_batched(&self, gemm: &BatchedGemm) -> Result<()> {
        let mut arena = self.arena();
        if let Some(status) = arena.pending_failure.take() {
            return Err(DeviceError::Blas(status));
        }
        if let Err(e) = gemm.validate() {
            log::debug!("host gemm rejected arguments: {}", e);
            return Err(DeviceError::Blas(BlasStatus::InvalidValue));
        }
        if gemm.is_empty() {
            return Ok(());
        }

        match gemm.precision {
            Precision::Single => arena.gemm::<f32>(gemm),
            Precision::Double => arena.gemm::<f64>(gemm),
        }
    }
}
