//! Compiled-in peripherals.
//!
//! Each entry pairs a driver entrypoint with the MMIO window it drives the
//! device through and, for devices that own RAM, a dedicated memory window.
//! Which entries exist is fixed by Cargo features at build time.
//!
//! ```text
//! Device                 Feature       MMIO                    Memory
//! ─────────────────────────────────────────────────────────────────────────
//! GIC-400 distributor    gic400        0x4_C004_1000 +4 KiB    -
//! GIC-400 CPU interface  gic400        0x4_C004_2000 +4 KiB    -
//! VideoCore framebuffer  framebuffer   -                       video memory
//! ```

use arrayvec::ArrayVec;
use core::fmt;

use khal::mmio::{AttachError, Window};

use crate::memory::{MemoryDescriptor, MemoryType, TableError};

/// Maximum number of devices a table holds.
pub const MAX_DEVICES: usize = 8;

// =============================================================================
// Driver entrypoints
// =============================================================================

/// Bring-up entrypoint of a device's driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverInit {
    Gic400Distributor,
    Gic400Cpu,
    FrameBuffer,
}

/// Why a driver refused its device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// The window the driver needs is empty.
    NoWindow { device: &'static str },
    /// The driver is already bound to a different window.
    Attach(AttachError),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::NoWindow { device } => write!(f, "{}: no window to attach", device),
            DeviceError::Attach(err) => write!(f, "attach failed: {}", err),
        }
    }
}

impl From<AttachError> for DeviceError {
    fn from(err: AttachError) -> Self {
        DeviceError::Attach(err)
    }
}

impl DriverInit {
    /// Hand `device`'s windows to its driver.
    pub fn run(self, device: &DeviceDescriptor) -> Result<(), DeviceError> {
        match self {
            DriverInit::Gic400Distributor => khal::gic400::distributor_init(device.mmio_window()?)?,
            DriverInit::Gic400Cpu => khal::gic400::cpu_init(device.mmio_window()?)?,
            DriverInit::FrameBuffer => khal::framebuffer::init(device.memory_window()?)?,
        }
        Ok(())
    }
}

// =============================================================================
// Descriptors
// =============================================================================

/// One peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub name: &'static str,
    /// `None` only on the sentinel.
    pub init: Option<DriverInit>,
    pub mmio: MemoryDescriptor,
    pub mem: MemoryDescriptor,
}

impl DeviceDescriptor {
    /// Terminates the table in its terminated form.
    pub const SENTINEL: DeviceDescriptor = DeviceDescriptor {
        name: "",
        init: None,
        mmio: MemoryDescriptor::SENTINEL,
        mem: MemoryDescriptor::SENTINEL,
    };

    #[inline]
    pub fn is_sentinel(&self) -> bool {
        self.init.is_none() && self.mmio.is_sentinel() && self.mem.is_sentinel()
    }

    fn mmio_window(&self) -> Result<Window, DeviceError> {
        window(self.name, &self.mmio)
    }

    fn memory_window(&self) -> Result<Window, DeviceError> {
        window(self.name, &self.mem)
    }
}

fn window(device: &'static str, region: &MemoryDescriptor) -> Result<Window, DeviceError> {
    if region.is_empty() || region.is_sentinel() {
        return Err(DeviceError::NoWindow { device });
    }
    Ok(Window::new(region.base, region.size))
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_sentinel() {
            return f.write_str("<end of table>");
        }
        write!(f, "{:<22}", self.name)?;
        if !self.mmio.is_empty() {
            write!(f, " mmio {:#012x}+{:#x}", self.mmio.base, self.mmio.size)?;
        }
        if self.mem.kind != MemoryType::None {
            write!(f, " mem {:#012x}+{:#x} ({})", self.mem.base, self.mem.size, self.mem.kind.name())?;
        }
        Ok(())
    }
}

/// GIC-400 register window size.
const GIC_WINDOW: u64 = khal::gic400::WINDOW_SIZE;

/// The devices this build carries.
const DECLARED: &[DeviceDescriptor] = &[
    #[cfg(feature = "gic400")]
    DeviceDescriptor {
        name: "gic400-distributor",
        init: Some(DriverInit::Gic400Distributor),
        mmio: MemoryDescriptor::new(khal::gic400::DISTRIBUTOR_BASE, GIC_WINDOW, MemoryType::Device),
        mem: MemoryDescriptor::NONE,
    },
    #[cfg(feature = "gic400")]
    DeviceDescriptor {
        name: "gic400-cpu",
        init: Some(DriverInit::Gic400Cpu),
        mmio: MemoryDescriptor::new(khal::gic400::CPU_INTERFACE_BASE, GIC_WINDOW, MemoryType::Device),
        mem: MemoryDescriptor::NONE,
    },
    // Memory window is filled in once the firmware reports it.
    #[cfg(feature = "framebuffer")]
    DeviceDescriptor {
        name: "framebuffer",
        init: Some(DriverInit::FrameBuffer),
        mmio: MemoryDescriptor::NONE,
        mem: MemoryDescriptor::new(0, 0, MemoryType::Video),
    },
];

const _: () = assert!(DECLARED.len() <= MAX_DEVICES);

// =============================================================================
// Device table
// =============================================================================

/// The peripherals known at bring-up, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTable {
    devices: ArrayVec<DeviceDescriptor, MAX_DEVICES>,
}

impl DeviceTable {
    /// Every device compiled into this build.
    pub fn declared() -> Self {
        Self {
            devices: DECLARED.iter().copied().collect(),
        }
    }

    pub const fn empty() -> Self {
        Self {
            devices: ArrayVec::new_const(),
        }
    }

    /// Table from an explicit device list (board variants, tests).
    pub fn from_slice(devices: &[DeviceDescriptor]) -> Result<Self, TableError> {
        let mut table = Self::empty();
        for device in devices {
            table.devices.try_push(*device).map_err(|_| TableError::Full)?;
        }
        Ok(table)
    }

    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// The devices followed by [`DeviceDescriptor::SENTINEL`].
    pub fn terminated(&self) -> impl Iterator<Item = DeviceDescriptor> + '_ {
        self.devices
            .iter()
            .copied()
            .chain(core::iter::once(DeviceDescriptor::SENTINEL))
    }

    /// Point the device owning video memory at the discovered window.
    /// Returns its name, or `None` when no such device is compiled in.
    pub fn patch_video_memory(&mut self, base: u64, size: u64) -> Option<&'static str> {
        let device = self
            .devices
            .iter_mut()
            .find(|d| d.mem.kind == MemoryType::Video)?;
        device.mem.base = base;
        device.mem.size = size;
        Some(device.name)
    }

    /// Run every device's entrypoint and log it. A failing driver is
    /// logged and skipped. Returns the number of devices visited.
    pub fn enumerate(&self) -> usize {
        let visited = scan_terminated(self.terminated(), |device| {
            let Some(init) = device.init else {
                return;
            };
            match init.run(device) {
                Ok(()) => klog::info!("  [ok] {}", device),
                Err(err) => klog::error!("  [failed] {}: {}", device.name, err),
            }
        });
        klog::info!("Devices: {} enumerated", visited);
        visited
    }
}

impl Default for DeviceTable {
    fn default() -> Self {
        Self::declared()
    }
}

/// Walk a device list up to its sentinel, calling `visit` on every entry
/// before it. Returns the number of entries visited.
///
/// A list without a sentinel is walked to its end.
pub fn scan_terminated<I, F>(entries: I, mut visit: F) -> usize
where
    I: IntoIterator<Item = DeviceDescriptor>,
    F: FnMut(&DeviceDescriptor),
{
    let mut visited = 0;
    for entry in entries {
        if entry.is_sentinel() {
            break;
        }
        visit(&entry);
        visited += 1;
    }
    visited
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_device() -> DeviceDescriptor {
        DeviceDescriptor {
            name: "video",
            init: Some(DriverInit::FrameBuffer),
            mmio: MemoryDescriptor::NONE,
            mem: MemoryDescriptor::new(0, 0, MemoryType::Video),
        }
    }

    fn mmio_device(name: &'static str, base: u64) -> DeviceDescriptor {
        DeviceDescriptor {
            name,
            init: Some(DriverInit::Gic400Distributor),
            mmio: MemoryDescriptor::new(base, 0x1000, MemoryType::Device),
            mem: MemoryDescriptor::NONE,
        }
    }

    #[test]
    fn declared_table_follows_features() {
        let table = DeviceTable::declared();
        let gic = if cfg!(feature = "gic400") { 2 } else { 0 };
        let fb = if cfg!(feature = "framebuffer") { 1 } else { 0 };
        assert_eq!(table.len(), gic + fb);
        assert!(table.devices().iter().all(|d| d.init.is_some()));
    }

    #[cfg(feature = "gic400")]
    #[test]
    fn gic_entries_sit_at_their_mmio_windows() {
        let table = DeviceTable::declared();
        let mmio: ArrayVec<u64, MAX_DEVICES> = table
            .devices()
            .iter()
            .filter(|d| d.mmio.kind == MemoryType::Device)
            .map(|d| d.mmio.base)
            .collect();
        assert_eq!(&mmio[..], &[0x4_C004_1000, 0x4_C004_2000]);
    }

    #[test]
    fn scan_visits_entries_before_sentinel() {
        let table = DeviceTable::from_slice(&[mmio_device("a", 0x1000), mmio_device("b", 0x2000)]).unwrap();
        let mut names: ArrayVec<&str, MAX_DEVICES> = ArrayVec::new();
        let visited = scan_terminated(table.terminated(), |d| names.push(d.name));
        assert_eq!(visited, 2);
        assert_eq!(&names[..], &["a", "b"]);
    }

    #[test]
    fn scan_of_empty_table_terminates() {
        let table = DeviceTable::empty();
        assert_eq!(scan_terminated(table.terminated(), |_| panic!("visited")), 0);
        assert_eq!(table.enumerate(), 0);
    }

    #[test]
    fn scan_stops_at_the_first_sentinel() {
        let entries = [mmio_device("a", 0x1000), DeviceDescriptor::SENTINEL, mmio_device("b", 0x2000)];
        assert_eq!(scan_terminated(entries, |_| {}), 1);
    }

    #[test]
    fn sentinel_marks_every_geometry_field() {
        let s = DeviceDescriptor::SENTINEL;
        assert!(s.is_sentinel());
        assert_eq!(s.mmio.base, u64::MAX);
        assert_eq!(s.mem.size, u64::MAX);
        assert_eq!(s.mem.kind, MemoryType::Invalid);
        assert!(!mmio_device("a", 0).is_sentinel());
    }

    #[test]
    fn video_patch_targets_the_video_device() {
        let mut table = DeviceTable::from_slice(&[mmio_device("gic", 0x1000), video_device()]).unwrap();
        assert_eq!(table.patch_video_memory(0x3C00_0000, 0x0400_0000), Some("video"));
        assert_eq!(table.devices()[1].mem, MemoryDescriptor::new(0x3C00_0000, 0x0400_0000, MemoryType::Video));
        assert_eq!(table.devices()[0].mem, MemoryDescriptor::NONE);
    }

    #[test]
    fn video_patch_without_a_video_device_is_a_no_op() {
        let mut table = DeviceTable::from_slice(&[mmio_device("gic", 0x1000)]).unwrap();
        let before = table.clone();
        assert_eq!(table.patch_video_memory(0x3C00_0000, 0x0400_0000), None);
        assert_eq!(table, before);
    }

    #[test]
    fn empty_window_is_refused_before_the_driver() {
        assert_eq!(
            DriverInit::FrameBuffer.run(&video_device()),
            Err(DeviceError::NoWindow { device: "video" })
        );
    }

    #[test]
    fn oversized_list_is_refused() {
        let many = [mmio_device("x", 0x1000); MAX_DEVICES + 1];
        assert_eq!(DeviceTable::from_slice(&many), Err(TableError::Full));
    }
}
