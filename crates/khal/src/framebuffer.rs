//! VideoCore framebuffer entrypoint.
//!
//! The framebuffer driver proper allocates its surface through the mailbox
//! later in boot. Bring-up only hands it the VideoCore memory window the
//! firmware reported.

use crate::mmio::{AttachError, Window, WindowSlot};

static VIDEO_MEMORY: WindowSlot = WindowSlot::new();

/// Bring-up entrypoint: record the VideoCore memory window.
pub fn init(video_memory: Window) -> Result<(), AttachError> {
    VIDEO_MEMORY.attach(video_memory)?;
    log::debug!("framebuffer: video memory at {}", video_memory);
    Ok(())
}

/// VideoCore memory window handed over at bring-up.
pub fn video_memory() -> Option<Window> {
    VIDEO_MEMORY.get()
}
