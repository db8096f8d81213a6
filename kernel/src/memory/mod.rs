//! Physical memory topology.
//!
//! The memory table lists the RAM ranges the firmware and the board
//! revision say are installed. It is built once during bring-up
//! ([`layout::build`]) and handed read-only to memory management.

pub mod layout;
pub mod plan;

use arrayvec::ArrayVec;
use core::fmt;

/// Binary size units.
pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;

/// Maximum number of regions a memory table holds.
pub const MEMORY_TABLE_CAPACITY: usize = 4;

/// What a physical range is used for.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
	/// No range (unused window).
	None = 0,
	/// Cacheable RAM.
	Normal = 1,
	/// Device registers.
	Device = 2,
	/// VideoCore-owned RAM.
	Video = 3,
	/// Terminator marker; only ever found in [`MemoryDescriptor::SENTINEL`].
	Invalid = u32::MAX,
}

impl MemoryType {
	/// Human-readable name for a memory type.
	pub fn name(self) -> &'static str {
		match self {
			MemoryType::None => "None",
			MemoryType::Normal => "Normal",
			MemoryType::Device => "Device",
			MemoryType::Video => "Video",
			MemoryType::Invalid => "Invalid",
		}
	}
}

/// One physical range.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryDescriptor {
	pub base: u64,
	pub size: u64,
	pub kind: MemoryType,
}

impl MemoryDescriptor {
	/// Terminates a table handed over in terminated form.
	pub const SENTINEL: MemoryDescriptor = MemoryDescriptor {
		base: u64::MAX,
		size: u64::MAX,
		kind: MemoryType::Invalid,
	};

	/// An unused window.
	pub const NONE: MemoryDescriptor = MemoryDescriptor::new(0, 0, MemoryType::None);

	pub const fn new(base: u64, size: u64, kind: MemoryType) -> Self {
		Self { base, size, kind }
	}

	#[inline]
	pub fn is_sentinel(&self) -> bool {
		*self == Self::SENTINEL
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.size == 0
	}

	/// One past the last byte, or `None` if the range wraps.
	pub fn end(&self) -> Option<u64> {
		self.base.checked_add(self.size)
	}
}

impl fmt::Display for MemoryDescriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.is_sentinel() {
			return f.write_str("<end of table>");
		}
		write!(f, "{:<8} {:#012x} +{:#012x}", self.kind.name(), self.base, self.size)
	}
}

/// Errors from filling or exporting a fixed-capacity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
	/// The table is at capacity.
	Full,
	/// The export buffer cannot hold the entries plus the sentinel.
	TooSmall { needed: usize },
}

impl fmt::Display for TableError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TableError::Full => f.write_str("table full"),
			TableError::TooSmall { needed } => write!(f, "export buffer needs {} entries", needed),
		}
	}
}

/// The RAM ranges discovered at bring-up, in ascending base order.
///
/// Overlap checking is left to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryTable {
	regions: ArrayVec<MemoryDescriptor, MEMORY_TABLE_CAPACITY>,
	/// Built from unknown firmware or RAM size; ranges may be nonsense.
	degraded: bool,
}

impl MemoryTable {
	pub const fn new() -> Self {
		Self {
			regions: ArrayVec::new_const(),
			degraded: false,
		}
	}

	/// A table holding exactly `regions`, in the order given.
	pub fn from_regions<const N: usize>(regions: [MemoryDescriptor; N]) -> Self {
		const { assert!(N <= MEMORY_TABLE_CAPACITY) };
		Self {
			regions: regions.into_iter().collect(),
			degraded: false,
		}
	}

	pub fn push(&mut self, region: MemoryDescriptor) -> Result<(), TableError> {
		self.regions.try_push(region).map_err(|_| TableError::Full)
	}

	pub(crate) fn mark_degraded(&mut self) {
		self.degraded = true;
	}

	/// Whether the table was derived from unknown identity or geometry.
	pub fn is_degraded(&self) -> bool {
		self.degraded
	}

	pub fn regions(&self) -> &[MemoryDescriptor] {
		&self.regions
	}

	pub fn len(&self) -> usize {
		self.regions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.regions.is_empty()
	}

	/// The regions followed by [`MemoryDescriptor::SENTINEL`].
	pub fn terminated(&self) -> impl Iterator<Item = MemoryDescriptor> + '_ {
		self.regions
			.iter()
			.copied()
			.chain(core::iter::once(MemoryDescriptor::SENTINEL))
	}

	/// Copy the sentinel-terminated form into `out` for consumers that scan
	/// for the terminator. Returns the number of entries written.
	pub fn write_terminated(&self, out: &mut [MemoryDescriptor]) -> Result<usize, TableError> {
		let needed = self.regions.len() + 1;
		if out.len() < needed {
			return Err(TableError::TooSmall { needed });
		}
		for (slot, region) in out.iter_mut().zip(self.terminated()) {
			*slot = region;
		}
		Ok(needed)
	}

	/// Sum of the Normal regions' sizes.
	pub fn normal_bytes(&self) -> u64 {
		self.regions
			.iter()
			.filter(|r| r.kind == MemoryType::Normal)
			.fold(0u64, |total, r| total.saturating_add(r.size))
	}

	/// Log each region and the totals.
	pub fn census(&self) {
		klog::info!("Memory table ({} regions):", self.regions.len());
		klog::info!("  {:<8} {:>16}  {:>12}  {}", "Type", "Base", "Length", "End");
		klog::info!("  {:-<8} {:-<16}  {:-<12}  {:-<16}", "", "", "", "");

		for region in self.regions.iter() {
			match region.end() {
				Some(end) => klog::info!(
					"  {:<8} {:#016x}  {:>8} MiB  {:#016x}",
					region.kind.name(),
					region.base,
					region.size / MIB,
					end,
				),
				None => klog::warn!(
					"  {:<8} {:#016x}  {:#x} bytes  (wraps the address space)",
					region.kind.name(),
					region.base,
					region.size,
				),
			}
		}

		klog::info!("  {:-<8} {:-<16}  {:-<12}  {:-<16}", "", "", "", "");
		klog::info!("  Normal RAM: {} MiB", self.normal_bytes() / MIB);
		if self.degraded {
			klog::warn!("  Table built from unknown firmware data; do not trust the high range");
		}
	}
}

impl Default for MemoryTable {
	fn default() -> Self {
		Self::new()
	}
}
