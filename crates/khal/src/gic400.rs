//! GIC-400 interrupt controller entrypoints.
//!
//! The GIC-400 on the BCM2711 sits in the ARM-local block. Register
//! programming belongs to the interrupt subsystem; at bring-up each block
//! is only handed the MMIO window it will be driven through, and that
//! window is recorded here once.

use crate::mmio::{AttachError, Window, WindowSlot, ARM_LOCAL_BASE};

/// Whole GIC-400 register block (distributor, CPU interface, virtual CPU
/// interfaces).
pub const GIC_BLOCK_BASE: u64 = ARM_LOCAL_BASE + 0x4_0000;
pub const GIC_BLOCK_SIZE: u64 = 32 * 1024;

/// Distributor register window.
pub const DISTRIBUTOR_BASE: u64 = GIC_BLOCK_BASE + 0x1000;

/// CPU interface register window.
pub const CPU_INTERFACE_BASE: u64 = GIC_BLOCK_BASE + 0x2000;

/// Size of each register window.
pub const WINDOW_SIZE: u64 = 4 * 1024;

static DISTRIBUTOR: WindowSlot = WindowSlot::new();
static CPU_INTERFACE: WindowSlot = WindowSlot::new();

/// Bring-up entrypoint for the distributor.
pub fn distributor_init(window: Window) -> Result<(), AttachError> {
    DISTRIBUTOR.attach(window)?;
    log::debug!("gic400: distributor at {}", window);
    Ok(())
}

/// Bring-up entrypoint for the CPU interface.
pub fn cpu_init(window: Window) -> Result<(), AttachError> {
    CPU_INTERFACE.attach(window)?;
    log::debug!("gic400: cpu interface at {}", window);
    Ok(())
}

/// Window the distributor was brought up with.
pub fn distributor() -> Option<Window> {
    DISTRIBUTOR.get()
}

/// Window the CPU interface was brought up with.
pub fn cpu_interface() -> Option<Window> {
    CPU_INTERFACE.get()
}
