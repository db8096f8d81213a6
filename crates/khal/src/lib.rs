//! Hardware Abstraction Layer for the BCM2711 (Raspberry Pi 4).
#![cfg_attr(not(test), no_std)]

pub mod framebuffer;
pub mod gic400;
pub mod mailbox;
pub mod mmio;
pub mod serial;

pub use mailbox::{MailboxChannel, MailboxError, PropertyMessage, PropertyTag, TagResponse};
pub use mmio::Window;
pub use serial::Serial;
