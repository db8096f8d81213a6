//! Memory table construction.
//!
//! The address space below [`HIGH_MEMORY_BASE`] is shared with the
//! VideoCore, so the firmware only reports the ARM part of it. RAM above
//! the boundary is never reported; its extent comes from the board
//! revision.

use super::{MemoryDescriptor, MemoryTable, MemoryType, GIB};
use crate::devices::DeviceTable;
use crate::platform::firmware::MemoryGeometry;

/// Start of the RAM the firmware does not report.
pub const HIGH_MEMORY_BASE: u64 = GIB;

/// RAM below the boundary, as the firmware reported it.
pub fn low_region(geometry: &MemoryGeometry) -> MemoryDescriptor {
	MemoryDescriptor::new(geometry.low_memory_base, geometry.low_memory_size, MemoryType::Normal)
}

/// RAM from the boundary up to the top of memory.
///
/// The size is computed with wrapping arithmetic. An unknown top of memory
/// (0) therefore yields a huge, meaningless range rather than an empty one.
pub fn high_region(geometry: &MemoryGeometry) -> MemoryDescriptor {
	let size = geometry
		.top_of_memory
		.wrapping_add(1)
		.wrapping_sub(HIGH_MEMORY_BASE);
	MemoryDescriptor::new(HIGH_MEMORY_BASE, size, MemoryType::Normal)
}

/// Build the memory table from `geometry` and hand the VideoCore window to
/// the device that owns it.
pub fn build(geometry: &MemoryGeometry, devices: &mut DeviceTable) -> MemoryTable {
	let mut table = MemoryTable::from_regions([low_region(geometry), high_region(geometry)]);

	if geometry.top_of_memory.wrapping_add(1) < HIGH_MEMORY_BASE {
		klog::warn!(
			"Top of memory {:#x} is below {:#x}; high RAM range is meaningless",
			geometry.top_of_memory,
			HIGH_MEMORY_BASE,
		);
		table.mark_degraded();
	}
	if geometry.low_memory_size == 0 {
		klog::warn!("Firmware reported no ARM memory below {:#x}", HIGH_MEMORY_BASE);
		table.mark_degraded();
	}

	match devices.patch_video_memory(geometry.video_memory_base, geometry.video_memory_size) {
		Some(name) => klog::debug!(
			"{}: video memory {:#x}+{:#x}",
			name,
			geometry.video_memory_base,
			geometry.video_memory_size,
		),
		None => klog::debug!("No video-memory device compiled in"),
	}

	table
}

#[cfg(test)]
mod tests {
	use super::*;

	fn geometry(top_of_memory: u64) -> MemoryGeometry {
		MemoryGeometry {
			low_memory_base: 0,
			low_memory_size: 0x3C00_0000,
			video_memory_base: 0x3C00_0000,
			video_memory_size: 0x0400_0000,
			top_of_memory,
		}
	}

	#[test]
	fn one_gib_board_has_empty_high_range() {
		let table = build(&geometry(0x3FFF_FFFF), &mut DeviceTable::empty());
		assert_eq!(table.regions()[0], MemoryDescriptor::new(0, 0x3C00_0000, MemoryType::Normal));
		assert_eq!(table.regions()[1], MemoryDescriptor::new(0x4000_0000, 0, MemoryType::Normal));
		assert!(!table.is_degraded());
	}

	#[test]
	fn two_gib_board_has_one_gib_high_range() {
		let table = build(&geometry(0x7FFF_FFFF), &mut DeviceTable::empty());
		assert_eq!(table.regions()[1], MemoryDescriptor::new(0x4000_0000, 0x4000_0000, MemoryType::Normal));
	}

	#[test]
	fn four_gib_board_reaches_the_4gib_line() {
		let region = high_region(&geometry(0xFFFF_FFFF));
		assert_eq!(region.end(), Some(4 * GIB));
	}

	#[test]
	fn terminated_table_ends_with_sentinel() {
		for top in [0, 0x3FFF_FFFF, 0x7FFF_FFFF, 0xFFFF_FFFF] {
			let table = build(&geometry(top), &mut DeviceTable::empty());
			let last = table.terminated().last();
			assert_eq!(last, Some(MemoryDescriptor::SENTINEL));
			assert_eq!(table.terminated().count(), 3);
		}
	}

	#[test]
	fn unknown_ram_wraps_and_is_flagged() {
		let table = build(&geometry(0), &mut DeviceTable::empty());
		assert_eq!(table.regions()[1].size, 1u64.wrapping_sub(GIB));
		assert!(table.is_degraded());
	}

	#[test]
	fn missing_firmware_data_is_flagged() {
		let table = build(&MemoryGeometry::default(), &mut DeviceTable::empty());
		assert_eq!(table.regions()[0], MemoryDescriptor::new(0, 0, MemoryType::Normal));
		assert!(table.is_degraded());
	}
}
