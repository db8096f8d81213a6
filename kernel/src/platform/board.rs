//! Board revision → installed RAM.
//!
//! The firmware does not report total RAM; the ARM memory tag only covers
//! the range below 1 GiB. Total RAM is read off the board revision code
//! instead (new-style revision codes, memory size in bits 20..23).

use core::fmt;

use crate::memory::GIB;

/// One known board revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardInfo {
	pub revision: u32,
	pub name: &'static str,
	/// Installed RAM in bytes.
	pub ram_bytes: u64,
}

impl BoardInfo {
	/// Highest valid physical RAM address.
	pub const fn top_of_memory(&self) -> u64 {
		self.ram_bytes - 1
	}
}

/// Pi 4 Model B, 1 GiB.
pub const RAM_1GIB: u64 = GIB;
/// Pi 4 Model B, 2 GiB.
pub const RAM_2GIB: u64 = 2 * GIB;
/// Pi 4 Model B, 4 GiB.
pub const RAM_4GIB: u64 = 4 * GIB;

/// Every revision this kernel knows the RAM size of.
pub const BOARD_TABLE: [BoardInfo; 5] = [
	BoardInfo { revision: 0x00A0_3111, name: "Raspberry Pi 4B rev 1.1 (1 GiB)", ram_bytes: RAM_1GIB },
	BoardInfo { revision: 0x00B0_3111, name: "Raspberry Pi 4B rev 1.1 (2 GiB)", ram_bytes: RAM_2GIB },
	BoardInfo { revision: 0x00B0_3112, name: "Raspberry Pi 4B rev 1.2 (2 GiB)", ram_bytes: RAM_2GIB },
	BoardInfo { revision: 0x00C0_3111, name: "Raspberry Pi 4B rev 1.1 (4 GiB)", ram_bytes: RAM_4GIB },
	BoardInfo { revision: 0x00C0_3112, name: "Raspberry Pi 4B rev 1.2 (4 GiB)", ram_bytes: RAM_4GIB },
];

/// Find a revision code in [`BOARD_TABLE`].
pub fn lookup(revision: u32) -> Option<&'static BoardInfo> {
	BOARD_TABLE.iter().find(|board| board.revision == revision)
}

/// Highest valid RAM address for `revision`, or 0 when the revision is
/// unknown. 0 means "unknown", never "no memory installed".
pub fn top_of_memory(revision: u32) -> u64 {
	lookup(revision).map_or(0, BoardInfo::top_of_memory)
}

/// Outcome of classifying the board's RAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RamStatus {
	Classified(&'static BoardInfo),
	/// Revision code not in [`BOARD_TABLE`]; total RAM unknown.
	Unrecognized(u32),
}

impl RamStatus {
	/// Highest valid RAM address, 0 when unknown.
	pub fn top_of_memory(&self) -> u64 {
		match self {
			RamStatus::Classified(board) => board.top_of_memory(),
			RamStatus::Unrecognized(_) => 0,
		}
	}

	pub fn is_known(&self) -> bool {
		matches!(self, RamStatus::Classified(_))
	}
}

impl fmt::Display for RamStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RamStatus::Classified(board) => write!(f, "{} MiB ({})", board.ram_bytes >> 20, board.name),
			RamStatus::Unrecognized(revision) => write!(f, "unknown (revision {:#08x})", revision),
		}
	}
}

/// Classify the RAM fitted to the board with `revision`.
pub fn classify(revision: u32) -> RamStatus {
	match lookup(revision) {
		Some(board) => {
			klog::info!("Board {:#08x}: {}", revision, board.name);
			RamStatus::Classified(board)
		}
		None => {
			klog::warn!("Unrecognized board revision {:#08x}; total RAM unknown", revision);
			RamStatus::Unrecognized(revision)
		}
	}
}
