//! Raspberry Pi 4 platform bring-up.
//!
//! Discovers who the board is and where its memory lives, then builds the
//! memory and device tables the rest of the kernel starts from. Everything
//! here is hardware-independent behind [`khal::MailboxChannel`], so it runs
//! in host tests against an emulated firmware.
#![cfg_attr(not(test), no_std)]

pub mod devices;
pub mod memory;
pub mod platform;

pub use platform::{init, PlatformContext};
