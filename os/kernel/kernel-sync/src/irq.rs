use crate::spin::{SpinGuard, SpinMutex};
use core::ops::{Deref, DerefMut};

/// A mutex guard that also keeps local interrupts disabled while held.
///
/// Created via [`SpinMutex::lock_irq`], which
///
/// 1. saves the current interrupt state and disables interrupts, and
/// 2. acquires the underlying mutex.
///
/// Dropping releases the mutex first and then restores the interrupt state,
/// so an interrupt can never observe the lock held by its own CPU.
///
/// ```no_run
/// use kernel_sync::SpinMutex;
///
/// static M: SpinMutex<u64> = SpinMutex::new(0);
///
/// {
///     let mut g = M.lock_irq();
///     *g += 1; // guarded from other CPUs and from local interrupt handlers
/// }
/// ```
pub struct IrqSpinGuard<'a, T> {
    // Field order is drop order: unlock before interrupts come back.
    guard: SpinGuard<'a, T>,
    _irq: IrqGuard,
}

impl<T> SpinMutex<T> {
    /// Acquires the mutex with interrupts disabled for the guard's lifetime.
    #[inline]
    pub fn lock_irq(&self) -> IrqSpinGuard<'_, T> {
        let irq = IrqGuard::new();
        let guard = self.lock();
        IrqSpinGuard { guard, _irq: irq }
    }

    /// Closure convenience over [`lock_irq`](Self::lock_irq).
    #[inline]
    pub fn with_lock_irq<U>(&self, f: impl FnOnce(&mut T) -> U) -> U {
        let mut g = self.lock_irq();
        f(&mut g)
    }
}

impl<T> Deref for IrqSpinGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for IrqSpinGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

/// Raw interrupt flag access for bare-metal x86-64.
///
/// Uses `cli`/`sti` and `pushfq; pop`, which are only legal at CPL0.
#[cfg(all(target_arch = "x86_64", target_os = "none"))]
mod arch {
    /// Bit 9 of `RFLAGS`.
    const RFLAGS_IF: u64 = 1 << 9;

    #[inline]
    pub fn interrupts_enabled() -> bool {
        let r: u64;
        unsafe { core::arch::asm!("pushfq; pop {}", out(reg) r, options(nostack, preserves_flags)) }
        r & RFLAGS_IF != 0
    }

    #[inline]
    pub fn disable() {
        unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
    }

    #[inline]
    pub fn enable() {
        unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
    }
}

/// Hosted targets (unit tests, tooling) cannot mask interrupts; the guard
/// degrades to a no-op and reports interrupts as already disabled.
#[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
mod arch {
    #[inline]
    pub const fn interrupts_enabled() -> bool {
        false
    }

    #[inline]
    pub const fn disable() {}

    #[inline]
    pub const fn enable() {}
}

/// Whether local interrupts are currently enabled.
#[inline]
#[must_use]
pub fn interrupts_enabled() -> bool {
    arch::interrupts_enabled()
}

/// RAII guard that disables interrupts on creation and restores them on drop.
///
/// `IrqGuard::new()` snapshots the interrupt flag. If interrupts were enabled
/// it disables them; on drop it re-enables them **only** if they were enabled
/// before, so guards nest.
pub struct IrqGuard {
    /// Whether interrupts were enabled when the guard was created.
    were_enabled: bool,
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqGuard {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let enabled = arch::interrupts_enabled();
        if enabled {
            arch::disable();
        }
        Self {
            were_enabled: enabled,
        }
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        if self.were_enabled {
            arch::enable();
        }
    }
}

/// Runs `f` with local interrupts disabled.
#[inline]
pub fn without_interrupts<R>(f: impl FnOnce() -> R) -> R {
    let _irq = IrqGuard::new();
    f()
}
