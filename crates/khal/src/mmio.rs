//! Memory-mapped I/O primitives.
//!
//! Provides volatile 32-bit register accessors and the address windows the
//! firmware places the BCM2711 peripherals at when `arm_peri_high=1` is set
//! in `config.txt` ("high peripheral" mode).

use core::fmt;
use core::ptr;

use spin::Once;

/// Main peripheral block (UART, GPIO, mailbox, ...) in high peripheral mode.
pub const PERIPHERAL_BASE: u64 = 0x4_7C00_0000;

/// ARM-local block (GIC-400, local timers) in high peripheral mode.
pub const ARM_LOCAL_BASE: u64 = 0x4_C000_0000;

/// Read a 32-bit device register.
///
/// # Safety
///
/// `addr` must be a mapped device register. Reads can have side effects
/// (e.g. popping a FIFO).
#[inline]
pub unsafe fn read32(addr: u64) -> u32 {
    ptr::read_volatile(addr as usize as *const u32)
}

/// Write a 32-bit device register.
///
/// # Safety
///
/// `addr` must be a mapped device register and `value` must be valid for it.
#[inline]
pub unsafe fn write32(addr: u64, value: u32) {
    ptr::write_volatile(addr as usize as *mut u32, value);
}

/// A physical address range handed to a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub base: u64,
    pub size: u64,
}

impl Window {
    pub const fn new(base: u64, size: u64) -> Self {
        Self { base, size }
    }

    /// One past the last byte, or `None` if the range wraps the address space.
    pub fn end(&self) -> Option<u64> {
        self.base.checked_add(self.size)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#011x}+{:#x}", self.base, self.size)
    }
}

/// Why a window could not be attached to a [`WindowSlot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachError {
    /// The window has zero size.
    EmptyWindow,
    /// A different window was attached earlier.
    AlreadyAttached(Window),
}

impl fmt::Display for AttachError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachError::EmptyWindow => f.write_str("empty MMIO window"),
            AttachError::AlreadyAttached(w) => write!(f, "already attached to {}", w),
        }
    }
}

/// Write-once record of the window a device block was brought up with.
///
/// Attaching the same window twice is accepted; attaching a different one
/// is refused.
pub struct WindowSlot(Once<Window>);

impl WindowSlot {
    pub const fn new() -> Self {
        Self(Once::new())
    }

    pub fn attach(&self, window: Window) -> Result<(), AttachError> {
        if window.size == 0 {
            return Err(AttachError::EmptyWindow);
        }
        let attached = *self.0.call_once(|| window);
        if attached != window {
            return Err(AttachError::AlreadyAttached(attached));
        }
        Ok(())
    }

    pub fn get(&self) -> Option<Window> {
        self.0.get().copied()
    }
}

impl Default for WindowSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_accepts_first_window_and_repeats() {
        let slot = WindowSlot::new();
        let window = Window::new(0x4_C004_1000, 0x1000);
        assert_eq!(slot.attach(window), Ok(()));
        assert_eq!(slot.attach(window), Ok(()));
        assert_eq!(slot.get(), Some(window));
    }

    #[test]
    fn slot_refuses_a_different_window() {
        let slot = WindowSlot::new();
        let first = Window::new(0x1000, 0x1000);
        slot.attach(first).unwrap();
        assert_eq!(
            slot.attach(Window::new(0x2000, 0x1000)),
            Err(AttachError::AlreadyAttached(first))
        );
    }

    #[test]
    fn slot_refuses_empty_window() {
        let slot = WindowSlot::new();
        assert_eq!(slot.attach(Window::new(0x1000, 0)), Err(AttachError::EmptyWindow));
        assert_eq!(slot.get(), None);
    }

    #[test]
    fn window_end_detects_wrap() {
        assert_eq!(Window::new(0x1000, 0x1000).end(), Some(0x2000));
        assert_eq!(Window::new(u64::MAX, 2).end(), None);
    }
}
