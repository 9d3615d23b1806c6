//! Memory-to-packet read engine.

use soc_core::{MemoryPorts, ReadRequest, Stream, WORD_BYTES};

use crate::PacketByte;

#[derive(Debug, Clone, Copy)]
enum ReaderState {
    Idle,
    EmitHeader,
    EmitLenHigh,
    EmitLenLow,
    EmitAddress { index: u32 },
    FetchWord,
    AwaitWord,
    EmitPayload { word: u32, offset: u32 },
}

/// Reads a memory span and emits it as a framed packet.
///
/// Output framing matches the inbound wire format (header, big-endian
/// length covering address + payload, big-endian address, payload bytes),
/// so a packet looped back through the serial-to-packet framer lands
/// byte-identical in memory.
///
/// The span may start mid-word: the first fetch skips the bytes before the
/// requested offset. One byte is emitted per cycle at most; memory refetches
/// happen every `WORD_BYTES` payload bytes.
#[derive(Debug)]
pub struct PacketReader {
    /// Framed bytes toward the UART transmitter.
    pub output: Stream<PacketByte>,
    read_channel: usize,
    header: Option<u8>,
    state: ReaderState,
    start_address: u32,
    address: u32,
    remaining: u16,
}

impl PacketReader {
    #[must_use]
    pub fn new(read_channel: usize, header: Option<u8>) -> Self {
        Self {
            output: Stream::new(),
            read_channel,
            header,
            state: ReaderState::Idle,
            start_address: 0,
            address: 0,
            remaining: 0,
        }
    }

    /// Begin transmitting `length` bytes from `address`.
    ///
    /// Returns `false` while a previous packet is still in flight.
    pub fn start(&mut self, address: u32, length: u16) -> bool {
        if !matches!(self.state, ReaderState::Idle) {
            return false;
        }
        self.start_address = address;
        self.address = address;
        self.remaining = length;
        self.state = if self.header.is_some() {
            ReaderState::EmitHeader
        } else {
            ReaderState::EmitLenHigh
        };
        true
    }

    /// A packet is being emitted.
    #[must_use]
    pub fn busy(&self) -> bool {
        !matches!(self.state, ReaderState::Idle)
    }

    /// Length field: the four address bytes plus the payload.
    fn length_field(&self) -> u16 {
        self.remaining.wrapping_add(WORD_BYTES as u16)
    }

    /// Advance one cycle.
    pub fn tick<M: MemoryPorts>(&mut self, mem: &mut M) {
        match self.state {
            ReaderState::Idle => {}
            ReaderState::EmitHeader => {
                if let Some(header) = self.header {
                    if self.emit(header, false) {
                        self.state = ReaderState::EmitLenHigh;
                    }
                }
            }
            ReaderState::EmitLenHigh => {
                if self.emit((self.length_field() >> 8) as u8, false) {
                    self.state = ReaderState::EmitLenLow;
                }
            }
            ReaderState::EmitLenLow => {
                if self.emit(self.length_field() as u8, false) {
                    self.state = ReaderState::EmitAddress { index: 0 };
                }
            }
            ReaderState::EmitAddress { index } => {
                let byte = (self.start_address >> (8 * (3 - index))) as u8;
                let last = index == 3 && self.remaining == 0;
                if self.emit(byte, last) {
                    self.state = if index == 3 {
                        if self.remaining == 0 {
                            ReaderState::Idle
                        } else {
                            ReaderState::FetchWord
                        }
                    } else {
                        ReaderState::EmitAddress { index: index + 1 }
                    };
                }
            }
            ReaderState::FetchWord => {
                let issued = mem.read_port(self.read_channel).request.offer(ReadRequest {
                    address: self.address & !(WORD_BYTES - 1),
                });
                if issued {
                    self.state = ReaderState::AwaitWord;
                }
            }
            ReaderState::AwaitWord => {
                if let Some(resp) = mem.read_port(self.read_channel).response.take() {
                    self.state = ReaderState::EmitPayload {
                        word: resp.data,
                        offset: self.address % WORD_BYTES,
                    };
                }
            }
            ReaderState::EmitPayload { word, offset } => {
                let byte = (word >> (8 * offset)) as u8;
                let last = self.remaining == 1;
                if self.emit(byte, last) {
                    self.remaining -= 1;
                    if self.remaining == 0 {
                        self.state = ReaderState::Idle;
                    } else if offset + 1 == WORD_BYTES {
                        self.address = (self.address & !(WORD_BYTES - 1)) + WORD_BYTES;
                        self.state = ReaderState::FetchWord;
                    } else {
                        self.state = ReaderState::EmitPayload {
                            word,
                            offset: offset + 1,
                        };
                    }
                }
            }
        }
    }

    fn emit(&mut self, data: u8, last: bool) -> bool {
        self.output.offer(PacketByte { data, last })
    }

    pub fn clear(&mut self) {
        self.output.clear();
        self.state = ReaderState::Idle;
        self.start_address = 0;
        self.address = 0;
        self.remaining = 0;
    }
}
