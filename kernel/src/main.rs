// =============================================================================
// Raspberry Pi 4 bring-up: kernel8.img entry point
// =============================================================================
//
// WHAT HAPPENED BEFORE WE GOT HERE:
//   1. The VideoCore firmware read config.txt (arm_64bit=1, arm_peri_high=1,
//      enable_uart=1) and loaded kernel8.img at 0x80000
//   2. All four cores were released at _start
//
// WHAT WE DO HERE:
//   _start   park cores 1-3, set up core 0's stack, clear .bss
//   kmain    serial + logging, platform bring-up, device enumeration, halt
//
// The whole binary only exists on the bare-metal target. Host builds get an
// empty main so `cargo test` can build the workspace; the bring-up logic is
// tested through the library.
// =============================================================================

#![cfg_attr(all(target_arch = "aarch64", target_os = "none"), no_std)]
#![cfg_attr(all(target_arch = "aarch64", target_os = "none"), no_main)]

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
use core::panic::PanicInfo;

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
use khal::mailbox::VideoCoreMailbox;

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
use rpi4_kernel::platform;

// x0 carries the device tree address from the firmware; left untouched.
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
core::arch::global_asm!(
    ".section .text._start",
    ".global _start",
    "_start:",
    "    mrs     x1, mpidr_el1",
    "    and     x1, x1, #3",
    "    cbz     x1, 2f",
    "1:  wfe",
    "    b       1b",
    "2:  ldr     x1, =__stack_top",
    "    mov     sp, x1",
    "    ldr     x1, =__bss_start",
    "    ldr     x2, =__bss_end",
    "3:  cmp     x1, x2",
    "    b.hs    4f",
    "    str     xzr, [x1], #8",
    "    b       3b",
    "4:  bl      kmain",
    "    b       1b",
);

/// Kernel main, called by `_start` on core 0 with a stack and a clean .bss.
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
#[unsafe(no_mangle)]
extern "C" fn kmain() -> ! {
    // =========================================================================
    // Serial output first; nothing is visible before this.
    // =========================================================================
    klog::init();

    klog::println!();
    klog::println!("==========================================================");
    klog::println!("  rpi4-bringup v{}", env!("CARGO_PKG_VERSION"));
    klog::println!("  Raspberry Pi 4 platform bring-up (BCM2711, AArch64)");
    klog::println!("==========================================================");
    klog::println!();

    // =========================================================================
    // Platform: firmware identity, RAM size, memory + device tables
    // =========================================================================
    let mut mailbox = VideoCoreMailbox::new();
    let context = platform::init(&mut mailbox);
    context.log_summary();

    if context.is_degraded() {
        klog::warn!("Bring-up degraded; memory table is not trustworthy");
    }

    #[cfg(feature = "mapping-plan")]
    rpi4_kernel::memory::plan::build(context.geometry()).log();

    // =========================================================================
    // Hand each device its windows
    // =========================================================================
    klog::info!("Enumerating devices:");
    context.devices().enumerate();

    klog::info!("Bring-up complete; halting");
    halt()
}

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
fn halt() -> ! {
    loop {
        // SAFETY: wfe only parks the core until the next event.
        unsafe { core::arch::asm!("wfe", options(nomem, nostack)) };
    }
}

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    klog::println!();
    klog::println!("==========================================================");
    klog::println!("  KERNEL PANIC");
    klog::println!("==========================================================");
    if let Some(location) = info.location() {
        klog::println!("  Location: {}:{}", location.file(), location.line());
    }
    klog::println!("  Message:  {}", info.message());
    halt()
}

#[cfg(not(all(target_arch = "aarch64", target_os = "none")))]
fn main() {}
