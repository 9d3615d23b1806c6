//! Serial-to-packet framing.

use soc_core::Stream;

use crate::PacketByte;

#[derive(Debug, Clone, Copy)]
enum FramerState {
    /// Discarding bytes until the header appears.
    Hunt,
    LengthHigh,
    LengthLow { high: u8 },
    Body { remaining: u16 },
}

/// Reassembles the raw serial byte stream into packet bodies.
///
/// Anything outside a packet is discarded; a corrupted length simply means
/// the framer swallows that many bytes and re-hunts for the next header.
/// There is no timeout: if the line goes silent mid-packet the framer holds
/// its state until bytes resume.
#[derive(Debug)]
pub struct PacketFramer {
    /// Bytes from the UART receiver.
    pub input: Stream<u8>,
    /// Packet body bytes; the address prefix is included, the header and
    /// length are consumed here.
    pub output: Stream<PacketByte>,
    header: u8,
    state: FramerState,
}

impl PacketFramer {
    #[must_use]
    pub fn new(header: u8) -> Self {
        Self {
            input: Stream::new(),
            output: Stream::new(),
            header,
            state: FramerState::Hunt,
        }
    }

    /// Advance one cycle, consuming at most one input byte.
    pub fn tick(&mut self) {
        match self.state {
            FramerState::Hunt => {
                if let Some(byte) = self.input.take() {
                    if byte == self.header {
                        self.state = FramerState::LengthHigh;
                    }
                }
            }
            FramerState::LengthHigh => {
                if let Some(byte) = self.input.take() {
                    self.state = FramerState::LengthLow { high: byte };
                }
            }
            FramerState::LengthLow { high } => {
                if let Some(byte) = self.input.take() {
                    let length = u16::from_be_bytes([high, byte]);
                    self.state = if length == 0 {
                        // Degenerate empty packet: nothing to emit.
                        FramerState::Hunt
                    } else {
                        FramerState::Body { remaining: length }
                    };
                }
            }
            FramerState::Body { remaining } => {
                // Hold the input byte until the consumer has room.
                if self.output.valid() {
                    return;
                }
                if let Some(byte) = self.input.take() {
                    self.output.offer(PacketByte {
                        data: byte,
                        last: remaining == 1,
                    });
                    self.state = if remaining == 1 {
                        FramerState::Hunt
                    } else {
                        FramerState::Body {
                            remaining: remaining - 1,
                        }
                    };
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.input.clear();
        self.output.clear();
        self.state = FramerState::Hunt;
    }
}
