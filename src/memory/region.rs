//! Backing regions for the memory pools.
//!
//! A [`Region`] is one large contiguous reservation, owned for the lifetime
//! of its pool and returned to the backing allocator on drop. On the device
//! regions come from PSRAM via `heap_caps_malloc`; the host simulation uses
//! the global allocator with cache-line alignment.

use core::ptr::NonNull;

/// Returns a region's memory to whoever reserved it.
pub type FreeFn = unsafe fn(NonNull<u8>, usize);

pub struct Region {
    ptr: NonNull<u8>,
    len: usize,
    free: FreeFn,
}

// SAFETY: a Region is a uniquely owned allocation; access to the bytes it
// covers is coordinated by the pool occupancy bitmaps.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// # Safety
    ///
    /// `ptr` must point to `len` bytes valid for reads and writes, owned
    /// exclusively by the new region, and `free(ptr, len)` must release them.
    pub unsafe fn from_raw(ptr: NonNull<u8>, len: usize, free: FreeFn) -> Self {
        Self { ptr, len, free }
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn base_addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.base_addr() && addr - self.base_addr() < self.len
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        // SAFETY: guaranteed by the `from_raw` contract.
        unsafe { (self.free)(self.ptr, self.len) }
    }
}

/// Source of large contiguous reservations.
pub trait RegionAllocator {
    fn reserve(&self, bytes: usize) -> Option<Region>;
}

/// PSRAM-backed allocator (global allocator in simulation).
pub struct PsramAllocator;

#[cfg(target_os = "espidf")]
impl RegionAllocator for PsramAllocator {
    fn reserve(&self, bytes: usize) -> Option<Region> {
        use esp_idf_svc::sys::{MALLOC_CAP_8BIT, MALLOC_CAP_SPIRAM, heap_caps_free, heap_caps_malloc};

        unsafe fn release(ptr: NonNull<u8>, _len: usize) {
            unsafe { heap_caps_free(ptr.as_ptr().cast()) }
        }

        if bytes == 0 {
            return None;
        }
        let raw = unsafe { heap_caps_malloc(bytes, MALLOC_CAP_SPIRAM | MALLOC_CAP_8BIT) };
        let ptr = NonNull::new(raw.cast::<u8>())?;
        // SAFETY: fresh heap_caps allocation of `bytes`, released by heap_caps_free.
        Some(unsafe { Region::from_raw(ptr, bytes, release) })
    }
}

#[cfg(not(target_os = "espidf"))]
const SIM_ALIGN: usize = 64;

#[cfg(not(target_os = "espidf"))]
impl RegionAllocator for PsramAllocator {
    fn reserve(&self, bytes: usize) -> Option<Region> {
        use std::alloc::{Layout, alloc_zeroed, dealloc};

        unsafe fn release(ptr: NonNull<u8>, len: usize) {
            // Layout was valid when the region was reserved.
            if let Ok(layout) = Layout::from_size_align(len, SIM_ALIGN) {
                unsafe { dealloc(ptr.as_ptr(), layout) }
            }
        }

        if bytes == 0 {
            return None;
        }
        let layout = Layout::from_size_align(bytes, SIM_ALIGN).ok()?;
        // SAFETY: layout has non-zero size.
        let ptr = NonNull::new(unsafe { alloc_zeroed(layout) })?;
        // SAFETY: fresh global allocation of `bytes`, released with the same layout.
        Some(unsafe { Region::from_raw(ptr, bytes, release) })
    }
}
