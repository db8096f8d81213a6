//! Serial port (PL011 UART0) driver.
//!
//! The firmware routes UART0 to GPIO 14/15 when `enable_uart=1` is set,
//! so only the UART block itself is programmed here.

use core::fmt;
use spin::Mutex;

use crate::mmio::{read32, write32, PERIPHERAL_BASE};

/// UART0 base address in high peripheral mode.
pub const UART0_BASE: u64 = PERIPHERAL_BASE + 0x0220_1000;

/// Data register
const UART_DR: u64 = 0x00;
/// Flag register
const UART_FR: u64 = 0x18;
/// Integer baud rate divisor
const UART_IBRD: u64 = 0x24;
/// Fractional baud rate divisor
const UART_FBRD: u64 = 0x28;
/// Line control register
const UART_LCRH: u64 = 0x2C;
/// Control register
const UART_CR: u64 = 0x30;
/// Interrupt clear register
const UART_ICR: u64 = 0x44;

/// FR: transmit FIFO full
const FR_TXFF: u32 = 1 << 5;
/// FR: UART busy transmitting
const FR_BUSY: u32 = 1 << 3;

/// LCRH: 8-bit words, FIFOs enabled
const LCRH_WLEN8_FEN: u32 = (0b11 << 5) | (1 << 4);
/// CR: UART, TX and RX enable
const CR_ENABLE: u32 = (1 << 0) | (1 << 8) | (1 << 9);

/// 48 MHz UART clock / (16 * 115200) = 26.0416 → IBRD 26, FBRD 3
const BAUD_IBRD: u32 = 26;
const BAUD_FBRD: u32 = 3;

/// Serial port driver for UART0
pub struct Serial {
    base: u64,
    initialized: bool,
}

impl Serial {
    /// Create a new uninitialized Serial port instance
    const fn new(base: u64) -> Self {
        Self {
            base,
            initialized: false,
        }
    }

    /// Initialize the serial port (115200 baud, 8N1)
    pub fn init(&mut self) {
        unsafe {
            // Disable the UART while reprogramming it
            write32(self.base + UART_CR, 0);

            // Let any byte the firmware queued drain out
            while read32(self.base + UART_FR) & FR_BUSY != 0 {
                core::hint::spin_loop();
            }

            // Clear pending interrupts; we poll
            write32(self.base + UART_ICR, 0x7FF);

            write32(self.base + UART_IBRD, BAUD_IBRD);
            write32(self.base + UART_FBRD, BAUD_FBRD);

            // 8 bits, no parity, one stop bit, FIFOs on
            write32(self.base + UART_LCRH, LCRH_WLEN8_FEN);

            write32(self.base + UART_CR, CR_ENABLE);
        }
        self.initialized = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Write a byte to the serial port
    pub fn write_byte(&self, byte: u8) {
        if !self.initialized {
            return;
        }

        // Wait for room in the transmit FIFO
        while unsafe { read32(self.base + UART_FR) } & FR_TXFF != 0 {
            core::hint::spin_loop();
        }

        unsafe {
            write32(self.base + UART_DR, byte as u32);
        }
    }

    /// Write a string to the serial port, expanding `\n` to `\r\n`
    pub fn write_str(&self, s: &str) {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
    }
}

impl fmt::Write for Serial {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        Serial::write_str(self, s);
        Ok(())
    }
}

/// Global serial port instance (UART0)
static SERIAL: Mutex<Serial> = Mutex::new(Serial::new(UART0_BASE));

/// Initialize the global serial port
pub fn init() {
    SERIAL.lock().init();
}

/// Whether `init()` has run; before that every write is dropped.
pub fn is_initialized() -> bool {
    SERIAL.lock().is_initialized()
}

/// Write a string to the serial port
pub fn write_str(s: &str) {
    SERIAL.lock().write_str(s);
}

/// Write formatted arguments to the serial port
pub fn write_fmt(args: fmt::Arguments) {
    use fmt::Write;
    let _ = SERIAL.lock().write_fmt(args);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_before_init_are_dropped() {
        // No MMIO is touched while the port is uninitialized, which is what
        // lets logging run inside host tests.
        assert!(!is_initialized());
        write_str("dropped\n");
        write_fmt(format_args!("{} {}", "also", "dropped"));
    }
}
