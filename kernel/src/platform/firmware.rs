//! Firmware identity and memory geometry, queried over the mailbox.
//!
//! All seven property tags travel in one message and one round trip. The
//! responses are unpacked positionally, in exactly the order
//! [`QUERY_TAGS`] appends them; each position is checked against the tag
//! appended there.

use core::fmt;

use khal::mailbox::{MailboxChannel, MailboxError, PropertyMessage, PropertyTag, TagResponse};

/// The bring-up request, in append (and unpack) order.
pub const QUERY_TAGS: [PropertyTag; 7] = [
	PropertyTag::GetFirmwareRevision,
	PropertyTag::GetBoardModel,
	PropertyTag::GetBoardRevision,
	PropertyTag::GetBoardMac,
	PropertyTag::GetBoardSerial,
	PropertyTag::GetArmMemory,
	PropertyTag::GetVcMemory,
];

/// Ethernet MAC address as reported by the firmware (network byte order).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MacAddress(pub [u8; 6]);

impl fmt::Display for MacAddress {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let b = &self.0;
		write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", b[0], b[1], b[2], b[3], b[4], b[5])
	}
}

/// Who the board and its firmware are.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FirmwareIdentity {
	pub firmware_version: u32,
	pub hardware_model: u32,
	pub board_revision: u32,
	pub mac_address: MacAddress,
	pub board_serial: u64,
}

/// Where RAM and VideoCore memory live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryGeometry {
	/// ARM-visible RAM below the 1 GiB boundary (firmware).
	pub low_memory_base: u64,
	pub low_memory_size: u64,
	/// VideoCore carve-out (firmware).
	pub video_memory_base: u64,
	pub video_memory_size: u64,
	/// Highest valid RAM address, from the board revision. 0 = unknown.
	pub top_of_memory: u64,
}

/// Outcome of the firmware query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareStatus {
	Answered,
	/// Identity and geometry unknown; fields kept their prior values.
	Unavailable(MailboxError),
}

impl FirmwareStatus {
	pub fn is_answered(&self) -> bool {
		matches!(self, FirmwareStatus::Answered)
	}
}

/// Everything one successful round trip yields.
struct Report {
	identity: FirmwareIdentity,
	low_memory: (u64, u64),
	video_memory: (u64, u64),
}

/// Frame the bring-up request.
pub fn build_request() -> Result<PropertyMessage, MailboxError> {
	let mut message = PropertyMessage::new();
	for tag in QUERY_TAGS {
		message.add_tag(tag, &[])?;
	}
	message.seal()?;
	Ok(message)
}

/// Query the firmware and fill `identity` and the firmware-sourced fields
/// of `geometry`.
///
/// Blocks for as long as `channel` does; the hardware channel has no
/// timeout. On any failure nothing is written, the caller keeps its prior
/// (zero) values and boot carries on.
pub fn query<C>(
	channel: &mut C,
	identity: &mut FirmwareIdentity,
	geometry: &mut MemoryGeometry,
) -> FirmwareStatus
where
	C: MailboxChannel + ?Sized,
{
	let report = match exchange(channel) {
		Ok(report) => report,
		Err(err) => {
			klog::warn!("Firmware query failed: {}; identity and geometry unknown", err);
			return FirmwareStatus::Unavailable(err);
		}
	};

	*identity = report.identity;
	(geometry.low_memory_base, geometry.low_memory_size) = report.low_memory;
	(geometry.video_memory_base, geometry.video_memory_size) = report.video_memory;

	klog::debug!(
		"Firmware answered {} tags: revision {:#x}, ARM memory {:#x}+{:#x}",
		QUERY_TAGS.len(),
		identity.board_revision,
		geometry.low_memory_base,
		geometry.low_memory_size,
	);
	FirmwareStatus::Answered
}

/// One round trip; unpacks into a local report.
fn exchange<C>(channel: &mut C) -> Result<Report, MailboxError>
where
	C: MailboxChannel + ?Sized,
{
	let mut message = build_request()?;
	channel.call(&mut message)?;

	let firmware_version = expect(&mut message, PropertyTag::GetFirmwareRevision)?.word(0);
	let hardware_model = expect(&mut message, PropertyTag::GetBoardModel)?.word(0);
	let board_revision = expect(&mut message, PropertyTag::GetBoardRevision)?.word(0);

	let mut mac = [0u8; 6];
	expect(&mut message, PropertyTag::GetBoardMac)?.copy_bytes(&mut mac);

	let board_serial = expect(&mut message, PropertyTag::GetBoardSerial)?.dword(0);

	let arm = expect(&mut message, PropertyTag::GetArmMemory)?;
	let low_memory = (arm.word(0) as u64, arm.word(1) as u64);

	let vc = expect(&mut message, PropertyTag::GetVcMemory)?;
	let video_memory = (vc.word(0) as u64, vc.word(1) as u64);

	Ok(Report {
		identity: FirmwareIdentity {
			firmware_version,
			hardware_model,
			board_revision,
			mac_address: MacAddress(mac),
			board_serial,
		},
		low_memory,
		video_memory,
	})
}

/// Unpack the next response and check it belongs to `tag`.
fn expect(message: &mut PropertyMessage, tag: PropertyTag) -> Result<TagResponse<'_>, MailboxError> {
	let response = message.next_response()?;
	if response.tag != tag.id() {
		return Err(MailboxError::UnexpectedTag {
			expected: tag.id(),
			found: response.tag,
		});
	}
	if response.length < tag.response_size() {
		return Err(MailboxError::ShortResponse(tag.id()));
	}
	Ok(response)
}

#[cfg(test)]
mod tests {
	use super::*;

	/// Answers the bring-up tags like a 2 GiB Pi 4 would.
	struct Firmware;

	impl MailboxChannel for Firmware {
		fn call(&mut self, message: &mut PropertyMessage) -> Result<(), MailboxError> {
			message.respond(|id, value| {
				let tag = PropertyTag::from_id(id)?;
				match tag {
					PropertyTag::GetFirmwareRevision => value[0] = 0x5F6A_1C2B,
					PropertyTag::GetBoardModel => value[0] = 0,
					PropertyTag::GetBoardRevision => value[0] = 0xB0_3112,
					PropertyTag::GetBoardMac => {
						value[0] = 0x3AA6_27DC;
						value[1] = 0x0000_9B4C;
					}
					PropertyTag::GetBoardSerial => {
						value[0] = 0x1234_5678;
						value[1] = 0x1000_0000;
					}
					PropertyTag::GetArmMemory => {
						value[0] = 0;
						value[1] = 0x3B40_0000;
					}
					PropertyTag::GetVcMemory => {
						value[0] = 0x3B40_0000;
						value[1] = 0x04C0_0000;
					}
					PropertyTag::End => return None,
				}
				Some(tag.response_size())
			})
		}
	}

	/// Answers nothing.
	struct Silent;

	impl MailboxChannel for Silent {
		fn call(&mut self, _: &mut PropertyMessage) -> Result<(), MailboxError> {
			Err(MailboxError::ResponseError)
		}
	}

	#[test]
	fn request_lists_tags_in_fixed_order() {
		let message = build_request().unwrap();
		assert!(message.is_sealed());
		assert_eq!(message.tag_count(), 7);

		let words = message.words();
		let mut pos = 2;
		for tag in QUERY_TAGS {
			assert_eq!(words[pos], tag.id());
			pos += 3 + tag.value_words();
		}
		assert_eq!(words[pos], PropertyTag::End.id());
		assert_eq!(pos + 1, words.len());
	}

	#[test]
	fn answered_query_fills_identity_and_geometry() {
		let mut identity = FirmwareIdentity::default();
		let mut geometry = MemoryGeometry::default();
		let status = query(&mut Firmware, &mut identity, &mut geometry);

		assert_eq!(status, FirmwareStatus::Answered);
		assert_eq!(identity.firmware_version, 0x5F6A_1C2B);
		assert_eq!(identity.board_revision, 0xB0_3112);
		assert_eq!(identity.mac_address, MacAddress([0xDC, 0x27, 0xA6, 0x3A, 0x4C, 0x9B]));
		assert_eq!(identity.board_serial, 0x1000_0000_1234_5678);
		assert_eq!(geometry.low_memory_size, 0x3B40_0000);
		assert_eq!(geometry.video_memory_base, 0x3B40_0000);
		assert_eq!(geometry.video_memory_size, 0x04C0_0000);
		assert_eq!(geometry.top_of_memory, 0);
	}

	#[test]
	fn failed_send_leaves_fields_untouched() {
		let mut identity = FirmwareIdentity::default();
		let mut geometry = MemoryGeometry::default();
		let status = query(&mut Silent, &mut identity, &mut geometry);

		assert_eq!(status, FirmwareStatus::Unavailable(MailboxError::ResponseError));
		assert_eq!(identity, FirmwareIdentity::default());
		assert_eq!(geometry, MemoryGeometry::default());
	}

	#[test]
	fn mac_address_formats_as_colon_hex() {
		let mac = MacAddress([0xDC, 0xA6, 0x32, 0x01, 0x02, 0xFF]);
		let mut buf = arrayvec::ArrayString::<32>::new();
		fmt::write(&mut buf, format_args!("{}", mac)).unwrap();
		assert_eq!(buf.as_str(), "dc:a6:32:01:02:ff");
	}
}
