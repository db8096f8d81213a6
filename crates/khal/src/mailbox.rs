//! VideoCore mailbox property interface.
//!
//! The mailbox is the channel between the ARM cores and the VideoCore
//! firmware. A request is a 16-byte aligned buffer of 32-bit words:
//!
//! ```text
//! Word    Description
//! ──────────────────────────────────────────────
//! 0       Buffer size in bytes
//! 1       Request code (0) / response code
//! 2..     Tags:  id, value buffer size, req/resp code, value words
//! last    End tag (0)
//! ```
//!
//! The firmware overwrites each tag's value words with its response and
//! sets bit 31 of the tag's req/resp code, the low bits giving the response
//! length in bytes. Responses are read back in the order the tags were
//! appended ([`PropertyMessage::next_response`]) or looked up by tag id
//! ([`PropertyMessage::response`]).

use core::fmt;
use core::sync::atomic::{fence, Ordering};

use crate::mmio::{read32, write32, PERIPHERAL_BASE};

// ============================================================================
// Mailbox Registers
// ============================================================================

/// Mailbox block base address (BCM2711, high peripheral mode)
pub const MAILBOX_BASE: u64 = PERIPHERAL_BASE + 0x0200_B880;

/// Mailbox 0 read register (VC → ARM)
const MBOX0_READ: u64 = 0x00;
/// Mailbox 0 status register
const MBOX0_STATUS: u64 = 0x18;
/// Mailbox 1 write register (ARM → VC)
const MBOX1_WRITE: u64 = 0x20;
/// Mailbox 1 status register
const MBOX1_STATUS: u64 = 0x38;

/// Status register bits
mod status {
    /// Mailbox is full (cannot write)
    pub const FULL: u32 = 0x8000_0000;
    /// Mailbox is empty (cannot read)
    pub const EMPTY: u32 = 0x4000_0000;
}

/// Mailbox channels
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Power management
    Power = 0,
    /// Framebuffer
    Framebuffer = 1,
    /// Property tags (ARM → VC)
    PropertyArmToVc = 8,
    /// Property tags (VC → ARM)
    PropertyVcToArm = 9,
}

// ============================================================================
// Request/Response Codes
// ============================================================================

/// Request code (in buffer header)
const REQUEST_CODE: u32 = 0x0000_0000;

/// Response success
const RESPONSE_SUCCESS: u32 = 0x8000_0000;

/// Response error (parsing error)
const RESPONSE_ERROR: u32 = 0x8000_0001;

/// Set in a tag's req/resp code once the firmware has answered it
const TAG_RESPONSE: u32 = 0x8000_0000;

// ============================================================================
// Property Tags
// ============================================================================

/// Property tags used during bring-up.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyTag {
    /// End tag (terminates tag list)
    End = 0x0000_0000,
    GetFirmwareRevision = 0x0000_0001,
    GetBoardModel = 0x0001_0001,
    GetBoardRevision = 0x0001_0002,
    GetBoardMac = 0x0001_0003,
    GetBoardSerial = 0x0001_0004,
    GetArmMemory = 0x0001_0005,
    GetVcMemory = 0x0001_0006,
}

impl PropertyTag {
    #[inline]
    pub const fn id(self) -> u32 {
        self as u32
    }

    pub fn from_id(id: u32) -> Option<Self> {
        let tag = match id {
            0x0000_0000 => PropertyTag::End,
            0x0000_0001 => PropertyTag::GetFirmwareRevision,
            0x0001_0001 => PropertyTag::GetBoardModel,
            0x0001_0002 => PropertyTag::GetBoardRevision,
            0x0001_0003 => PropertyTag::GetBoardMac,
            0x0001_0004 => PropertyTag::GetBoardSerial,
            0x0001_0005 => PropertyTag::GetArmMemory,
            0x0001_0006 => PropertyTag::GetVcMemory,
            _ => return None,
        };
        Some(tag)
    }

    /// Response length in bytes fixed by the firmware for this tag.
    pub const fn response_size(self) -> usize {
        match self {
            PropertyTag::End => 0,
            PropertyTag::GetFirmwareRevision
            | PropertyTag::GetBoardModel
            | PropertyTag::GetBoardRevision => 4,
            PropertyTag::GetBoardMac => 6,
            PropertyTag::GetBoardSerial
            | PropertyTag::GetArmMemory
            | PropertyTag::GetVcMemory => 8,
        }
    }

    /// Number of value words reserved for this tag (response rounded up).
    pub const fn value_words(self) -> usize {
        (self.response_size() + 3) / 4
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while framing, sending or unpacking a property message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxError {
    /// The tag does not fit in the message buffer.
    BufferFull,
    /// A tag was appended after the end tag.
    Sealed,
    /// The message was sent or unpacked before the end tag was appended.
    NotSealed,
    /// More request words than the tag's value buffer holds.
    RequestTooLarge,
    /// The buffer is not 16-byte aligned.
    NotAligned,
    /// The buffer lies above 4 GiB and cannot be handed to the VideoCore.
    NotAddressable,
    /// The firmware reported a parse error (0x8000_0001).
    ResponseError,
    /// The firmware returned an unknown response code.
    InvalidResponse(u32),
    /// A bounded wait ran out of spins.
    Timeout,
    /// Every tag has already been unpacked.
    NoMoreTags,
    /// A tag header points past the end of the message.
    Malformed,
    /// The firmware left this tag unanswered.
    NotAnswered(u32),
    /// Positional unpack found a different tag than the one appended there.
    UnexpectedTag { expected: u32, found: u32 },
    /// The firmware answered with fewer bytes than the tag defines.
    ShortResponse(u32),
}

impl fmt::Display for MailboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailboxError::BufferFull => f.write_str("property buffer full"),
            MailboxError::Sealed => f.write_str("message already sealed"),
            MailboxError::NotSealed => f.write_str("message not sealed"),
            MailboxError::RequestTooLarge => f.write_str("request larger than value buffer"),
            MailboxError::NotAligned => f.write_str("buffer not 16-byte aligned"),
            MailboxError::NotAddressable => f.write_str("buffer above 4 GiB"),
            MailboxError::ResponseError => f.write_str("firmware reported a parse error"),
            MailboxError::InvalidResponse(code) => {
                write!(f, "invalid firmware response code {:#010x}", code)
            }
            MailboxError::Timeout => f.write_str("timed out waiting for the mailbox"),
            MailboxError::NoMoreTags => f.write_str("no more tags to unpack"),
            MailboxError::Malformed => f.write_str("malformed tag header"),
            MailboxError::NotAnswered(tag) => write!(f, "tag {:#010x} not answered", tag),
            MailboxError::UnexpectedTag { expected, found } => write!(
                f,
                "expected tag {:#010x}, found {:#010x}",
                expected, found
            ),
            MailboxError::ShortResponse(tag) => write!(f, "short response for tag {:#010x}", tag),
        }
    }
}

// ============================================================================
// Property Message
// ============================================================================

/// Buffer size in words (256 bytes)
pub const BUFFER_WORDS: usize = 64;

/// Header: size word + request/response code word
const HEADER_WORDS: usize = 2;

/// Tag header: id, value buffer size, req/resp code
const TAG_HEADER_WORDS: usize = 3;

/// Property buffer (16-byte aligned for the VideoCore)
#[repr(C, align(16))]
struct PropertyBuffer {
    words: [u32; BUFFER_WORDS],
}

/// One tag's answer, borrowed from the message buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagResponse<'a> {
    /// Tag id found at this position.
    pub tag: u32,
    /// Response length in bytes reported by the firmware.
    pub length: usize,
    /// The tag's value words.
    pub value: &'a [u32],
}

impl<'a> TagResponse<'a> {
    /// Value word `index`, or 0 if the buffer is shorter.
    pub fn word(&self, index: usize) -> u32 {
        self.value.get(index).copied().unwrap_or(0)
    }

    /// Two consecutive words starting at `index`, low word first.
    pub fn dword(&self, index: usize) -> u64 {
        (self.word(index + 1) as u64) << 32 | self.word(index) as u64
    }

    /// Copy the value bytes (little-endian word order) into `out`.
    pub fn copy_bytes(&self, out: &mut [u8]) {
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = (self.word(i / 4) >> ((i % 4) * 8)) as u8;
        }
    }
}

/// A property-interface request and, after a call, its response.
pub struct PropertyMessage {
    buffer: PropertyBuffer,
    /// Words framed so far.
    len: usize,
    /// Number of (non-end) tags appended.
    tags: usize,
    /// Set once the end tag is appended.
    sealed: bool,
    /// Read position for sequential unpacking.
    cursor: usize,
}

impl PropertyMessage {
    /// Create an empty request.
    pub const fn new() -> Self {
        // Word 1 starts out as REQUEST_CODE (0).
        Self {
            buffer: PropertyBuffer {
                words: [0; BUFFER_WORDS],
            },
            len: HEADER_WORDS,
            tags: 0,
            sealed: false,
            cursor: HEADER_WORDS,
        }
    }

    /// Append a tag with its request words.
    ///
    /// The value buffer is sized from the firmware contract for `tag`.
    /// Appending [`PropertyTag::End`] terminates the list and writes the
    /// total size into the header.
    pub fn add_tag(&mut self, tag: PropertyTag, request: &[u32]) -> Result<(), MailboxError> {
        if self.sealed {
            return Err(MailboxError::Sealed);
        }

        if tag == PropertyTag::End {
            // Room for the end tag is reserved by every other append.
            self.buffer.words[self.len] = PropertyTag::End.id();
            self.len += 1;
            self.buffer.words[0] = (self.len * 4) as u32;
            self.sealed = true;
            return Ok(());
        }

        let value_words = tag.value_words();
        if request.len() > value_words {
            return Err(MailboxError::RequestTooLarge);
        }
        if self.len + TAG_HEADER_WORDS + value_words + 1 > BUFFER_WORDS {
            return Err(MailboxError::BufferFull);
        }

        let words = &mut self.buffer.words;
        words[self.len] = tag.id();
        words[self.len + 1] = (value_words * 4) as u32;
        words[self.len + 2] = REQUEST_CODE;

        let value = &mut words[self.len + TAG_HEADER_WORDS..self.len + TAG_HEADER_WORDS + value_words];
        value.fill(0);
        value[..request.len()].copy_from_slice(request);

        self.len += TAG_HEADER_WORDS + value_words;
        self.tags += 1;
        Ok(())
    }

    /// Append the end tag.
    pub fn seal(&mut self) -> Result<(), MailboxError> {
        self.add_tag(PropertyTag::End, &[])
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Number of tags appended, excluding the end tag.
    pub fn tag_count(&self) -> usize {
        self.tags
    }

    /// Total framed size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.len * 4
    }

    /// The framed words (header, tags, end tag).
    pub fn words(&self) -> &[u32] {
        &self.buffer.words[..self.len]
    }

    /// Physical address of the buffer.
    pub fn as_ptr(&self) -> *const u32 {
        self.buffer.words.as_ptr()
    }

    /// Response code written by the firmware into the header.
    pub fn response_code(&self) -> u32 {
        self.buffer.words[1]
    }

    /// Translate the header response code into a result.
    pub fn check_response(&self) -> Result<(), MailboxError> {
        match self.response_code() {
            RESPONSE_SUCCESS => Ok(()),
            RESPONSE_ERROR => Err(MailboxError::ResponseError),
            code => Err(MailboxError::InvalidResponse(code)),
        }
    }

    /// Unpack the next tag's response, in append order.
    pub fn next_response(&mut self) -> Result<TagResponse<'_>, MailboxError> {
        if !self.sealed {
            return Err(MailboxError::NotSealed);
        }
        let slot = self.locate(self.cursor)?;
        self.cursor = slot.end;
        self.response_in(slot)
    }

    /// Restart sequential unpacking from the first tag.
    pub fn rewind(&mut self) {
        self.cursor = HEADER_WORDS;
    }

    /// Look a response up by tag id, independent of append order.
    pub fn response(&self, tag: PropertyTag) -> Option<TagResponse<'_>> {
        if !self.sealed {
            return None;
        }
        let mut pos = HEADER_WORDS;
        loop {
            let slot = self.locate(pos).ok()?;
            if slot.id == tag.id() {
                return self.response_in(slot).ok();
            }
            pos = slot.end;
        }
    }

    /// Firmware side of the exchange: hand every tag's id and value words to
    /// `answer`; a returned length marks the tag answered. The header is set
    /// to success afterwards.
    ///
    /// Used by firmware emulators on the host.
    pub fn respond<F>(&mut self, mut answer: F) -> Result<(), MailboxError>
    where
        F: FnMut(u32, &mut [u32]) -> Option<usize>,
    {
        if !self.sealed {
            return Err(MailboxError::NotSealed);
        }
        let mut pos = HEADER_WORDS;
        while pos < self.len && self.buffer.words[pos] != PropertyTag::End.id() {
            if pos + TAG_HEADER_WORDS > self.len {
                return Err(MailboxError::Malformed);
            }
            let id = self.buffer.words[pos];
            let value_words = (self.buffer.words[pos + 1] as usize + 3) / 4;
            let start = pos + TAG_HEADER_WORDS;
            if start + value_words > self.len {
                return Err(MailboxError::Malformed);
            }
            if let Some(length) = answer(id, &mut self.buffer.words[start..start + value_words]) {
                self.buffer.words[pos + 2] = TAG_RESPONSE | length as u32;
            }
            pos = start + value_words;
        }
        self.buffer.words[1] = RESPONSE_SUCCESS;
        Ok(())
    }

    /// Decode the tag header at word `pos`.
    fn locate(&self, pos: usize) -> Result<TagSlot, MailboxError> {
        let words = &self.buffer.words[..self.len];
        let id = *words.get(pos).ok_or(MailboxError::NoMoreTags)?;
        if id == PropertyTag::End.id() {
            return Err(MailboxError::NoMoreTags);
        }
        if pos + TAG_HEADER_WORDS > words.len() {
            return Err(MailboxError::Malformed);
        }

        let size = words[pos + 1] as usize;
        let code = words[pos + 2];
        let start = pos + TAG_HEADER_WORDS;
        let end = start + (size + 3) / 4;
        if end > words.len() {
            return Err(MailboxError::Malformed);
        }

        Ok(TagSlot {
            id,
            start,
            end,
            answered: code & TAG_RESPONSE != 0,
            length: ((code & !TAG_RESPONSE) as usize).min(size),
        })
    }

    fn response_in(&self, slot: TagSlot) -> Result<TagResponse<'_>, MailboxError> {
        if !slot.answered {
            return Err(MailboxError::NotAnswered(slot.id));
        }
        Ok(TagResponse {
            tag: slot.id,
            length: slot.length,
            value: &self.buffer.words[slot.start..slot.end],
        })
    }
}

/// Position of one tag inside the buffer.
#[derive(Clone, Copy)]
struct TagSlot {
    id: u32,
    /// First value word.
    start: usize,
    /// One past the last value word; the next tag starts here.
    end: usize,
    answered: bool,
    length: usize,
}

impl Default for PropertyMessage {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Channel
// ============================================================================

/// A synchronous request/response channel to the firmware.
pub trait MailboxChannel {
    /// Submit a sealed message and block until the firmware answers it.
    fn call(&mut self, message: &mut PropertyMessage) -> Result<(), MailboxError>;
}

/// How long to spin on the mailbox status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Block until the firmware answers, however long that takes.
    Forever,
    /// Give up with [`MailboxError::Timeout`] after this many status polls.
    Spins(u32),
}

/// The BCM2711 hardware mailbox.
pub struct VideoCoreMailbox {
    base: u64,
    channel: Channel,
    policy: WaitPolicy,
}

impl VideoCoreMailbox {
    /// Property channel, blocking without a timeout.
    pub const fn new() -> Self {
        Self {
            base: MAILBOX_BASE,
            channel: Channel::PropertyArmToVc,
            policy: WaitPolicy::Forever,
        }
    }

    pub const fn with_wait_policy(mut self, policy: WaitPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Spin while any bit of `mask` is set in the status register at `status`.
    fn wait_while(&self, status: u64, mask: u32) -> Result<(), MailboxError> {
        let mut spins: u32 = 0;
        while unsafe { read32(self.base + status) } & mask != 0 {
            if let WaitPolicy::Spins(limit) = self.policy {
                if spins >= limit {
                    return Err(MailboxError::Timeout);
                }
                spins += 1;
            }
            core::hint::spin_loop();
        }
        Ok(())
    }
}

impl Default for VideoCoreMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl MailboxChannel for VideoCoreMailbox {
    fn call(&mut self, message: &mut PropertyMessage) -> Result<(), MailboxError> {
        if !message.is_sealed() {
            return Err(MailboxError::NotSealed);
        }

        let addr = message.as_ptr() as usize;
        if addr & 0xF != 0 {
            return Err(MailboxError::NotAligned);
        }
        let addr = u32::try_from(addr).map_err(|_| MailboxError::NotAddressable)?;

        // Combine address with channel (lower 4 bits)
        let value = addr | self.channel as u32;

        log::trace!(
            "mailbox: sending {} tags ({} bytes) on channel {}",
            message.tag_count(),
            message.size_bytes(),
            self.channel as u8
        );

        // The buffer must be in memory before the VideoCore reads it.
        fence(Ordering::SeqCst);

        self.wait_while(MBOX1_STATUS, status::FULL)?;
        unsafe { write32(self.base + MBOX1_WRITE, value) };

        loop {
            self.wait_while(MBOX0_STATUS, status::EMPTY)?;
            let response = unsafe { read32(self.base + MBOX0_READ) };

            // Skip answers meant for other channels
            if response & 0xF == self.channel as u32 {
                break;
            }
        }

        fence(Ordering::SeqCst);

        let result = message.check_response();
        if let Err(err) = result {
            log::debug!("mailbox: firmware rejected request: {}", err);
        }
        result
    }
}
