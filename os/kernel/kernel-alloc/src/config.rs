use crate::buddy::{BuddyAccessor, MAX_TABLE_ORDER};
use crate::error::KernelVmConfigError;
use kernel_info::memory::{KERNEL_VM_BASE, KERNEL_VM_SIZE};
use kernel_memory_addresses::{PAGE_SHIFT, PAGE_SIZE, VirtualAddress, page_align_len};

/// Where the kernel virtual memory arena lives and how it is carved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelVmConfig {
    /// First byte of the window.
    pub base: VirtualAddress,
    /// Window size in bytes, including the buddy metadata at its tail.
    pub size: usize,
    /// Order of the root blocks; `None` picks
    /// [`BuddyAccessor::suitable_order`] for the window.
    pub table_order: Option<u32>,
}

impl Default for KernelVmConfig {
    fn default() -> Self {
        #[allow(clippy::cast_possible_truncation)]
        Self {
            base: VirtualAddress::new(KERNEL_VM_BASE),
            size: KERNEL_VM_SIZE as usize,
            table_order: None,
        }
    }
}

/// How a validated window is split between callers and buddy metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaLayout {
    pub table_order: u32,
    /// Root blocks available to callers.
    pub num_roots: usize,
    /// Bytes at the start of the window that callers can receive.
    pub available: usize,
    /// Page-rounded metadata bytes at the tail of the window.
    pub overhead: usize,
}

impl KernelVmConfig {
    /// Checks the window without touching memory.
    ///
    /// # Errors
    /// See [`KernelVmConfigError`].
    pub fn validate(&self) -> Result<(), KernelVmConfigError> {
        self.layout().map(|_| ())
    }

    /// Computes the root count and metadata size for this window.
    ///
    /// The metadata is sized for the roots that would fit the whole window,
    /// then the roots are recounted over what remains after it.
    ///
    /// # Errors
    /// See [`KernelVmConfigError`].
    pub fn layout(&self) -> Result<ArenaLayout, KernelVmConfigError> {
        let table_order = self
            .table_order
            .unwrap_or_else(|| BuddyAccessor::suitable_order(self.size >> PAGE_SHIFT));
        if table_order > MAX_TABLE_ORDER {
            return Err(KernelVmConfigError::TableOrderTooLarge);
        }
        if !self.size.is_multiple_of(PAGE_SIZE) {
            return Err(KernelVmConfigError::SizeNotPageMultiple);
        }
        if !self.base.is_aligned(PAGE_SIZE << table_order) {
            return Err(KernelVmConfigError::UnalignedBase);
        }

        let shift = PAGE_SHIFT + table_order;
        let guessed_roots = self.size >> shift;
        let overhead = page_align_len(BuddyAccessor::determine_size(guessed_roots, table_order));
        let available = self
            .size
            .checked_sub(overhead)
            .ok_or(KernelVmConfigError::WindowTooSmall)?;
        let num_roots = available >> shift;
        if num_roots == 0 {
            return Err(KernelVmConfigError::WindowTooSmall);
        }

        Ok(ArenaLayout {
            table_order,
            num_roots,
            available,
            overhead,
        })
    }
}
