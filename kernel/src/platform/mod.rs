//! Platform bring-up.
//!
//! Runs once on the boot core, before anything else needs memory or device
//! information:
//!
//! 1. query the firmware for identity and memory geometry;
//! 2. classify installed RAM from the board revision;
//! 3. build the memory table and patch the device table.
//!
//! A firmware or board the kernel does not understand degrades the result
//! (see [`firmware::FirmwareStatus`], [`board::RamStatus`]) but never stops
//! boot.

pub mod board;
pub mod firmware;

use khal::mailbox::MailboxChannel;

use crate::devices::DeviceTable;
use crate::memory::{layout, MemoryTable, MIB};
use board::RamStatus;
use firmware::{FirmwareIdentity, FirmwareStatus, MemoryGeometry};

/// Everything bring-up discovered. Read-only once built.
#[derive(Debug, Clone)]
pub struct PlatformContext {
	identity: FirmwareIdentity,
	geometry: MemoryGeometry,
	memory: MemoryTable,
	devices: DeviceTable,
	firmware: FirmwareStatus,
	ram: RamStatus,
}

impl PlatformContext {
	pub fn identity(&self) -> &FirmwareIdentity {
		&self.identity
	}

	pub fn geometry(&self) -> &MemoryGeometry {
		&self.geometry
	}

	pub fn memory(&self) -> &MemoryTable {
		&self.memory
	}

	pub fn devices(&self) -> &DeviceTable {
		&self.devices
	}

	pub fn firmware(&self) -> FirmwareStatus {
		self.firmware
	}

	pub fn ram(&self) -> RamStatus {
		self.ram
	}

	/// Whether any part of the result rests on unknown data.
	pub fn is_degraded(&self) -> bool {
		!self.firmware.is_answered() || !self.ram.is_known() || self.memory.is_degraded()
	}

	/// Print identity, geometry and both tables.
	pub fn log_summary(&self) {
		let id = &self.identity;
		let geo = &self.geometry;

		klog::info!("Platform:");
		match self.firmware {
			FirmwareStatus::Answered => {
				klog::info!("  Firmware revision: {:#010x}", id.firmware_version);
				klog::info!("  Board model:       {:#010x}", id.hardware_model);
				klog::info!("  Board revision:    {:#08x}", id.board_revision);
				klog::info!("  Board serial:      {:#018x}", id.board_serial);
				klog::info!("  MAC address:       {}", id.mac_address);
			}
			FirmwareStatus::Unavailable(err) => {
				klog::warn!("  Firmware identity unknown ({})", err);
			}
		}
		klog::info!("  RAM:               {}", self.ram);
		klog::info!(
			"  ARM memory:        {:#x}+{:#x} ({} MiB)",
			geo.low_memory_base,
			geo.low_memory_size,
			geo.low_memory_size / MIB,
		);
		klog::info!(
			"  VideoCore memory:  {:#x}+{:#x} ({} MiB)",
			geo.video_memory_base,
			geo.video_memory_size,
			geo.video_memory_size / MIB,
		);
		klog::info!("  Top of memory:     {:#x}", geo.top_of_memory);

		self.memory.census();

		klog::info!("Device table ({} devices):", self.devices.len());
		for device in self.devices.devices() {
			klog::info!("  {}", device);
		}
	}
}

/// Bring the platform up with the devices compiled into this build.
pub fn init<C>(channel: &mut C) -> PlatformContext
where
	C: MailboxChannel + ?Sized,
{
	init_with_devices(channel, DeviceTable::declared())
}

/// Bring the platform up with an explicit device table.
pub fn init_with_devices<C>(channel: &mut C, mut devices: DeviceTable) -> PlatformContext
where
	C: MailboxChannel + ?Sized,
{
	let mut identity = FirmwareIdentity::default();
	let mut geometry = MemoryGeometry::default();

	let firmware = firmware::query(channel, &mut identity, &mut geometry);

	let ram = board::classify(identity.board_revision);
	geometry.top_of_memory = ram.top_of_memory();

	let memory = layout::build(&geometry, &mut devices);

	PlatformContext {
		identity,
		geometry,
		memory,
		devices,
		firmware,
		ram,
	}
}
