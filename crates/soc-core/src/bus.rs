//! Memory bus payload types and the client-side port abstraction.
//!
//! The bus is word-granular: every request carries a byte address whose low
//! two bits must be zero. Sub-word access is a client concern (read the
//! aligned word, select or splice bytes).

use crate::stream::Stream;

/// Bytes per bus word. Addresses below this alignment fault.
pub const WORD_BYTES: u32 = 4;

/// A read request: the word-aligned byte address to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    pub address: u32,
}

/// A read response, returned on the requesting channel in request order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadResponse {
    pub data: u32,
    /// Set when the request address was not word-aligned. `data` is zero.
    pub error: bool,
}

/// A write request: word-aligned byte address plus the full word to store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRequest {
    pub address: u32,
    pub data: u32,
}

/// A write response. The store is committed when `error` is clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResponse {
    pub error: bool,
}

/// One read channel: a request stream in, a response stream back.
#[derive(Debug, Default)]
pub struct ReadPort {
    pub request: Stream<ReadRequest>,
    pub response: Stream<ReadResponse>,
}

impl ReadPort {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            request: Stream::new(),
            response: Stream::new(),
        }
    }

    pub fn clear(&mut self) {
        self.request.clear();
        self.response.clear();
    }
}

/// One write channel: a request stream in, a response stream back.
#[derive(Debug, Default)]
pub struct WritePort {
    pub request: Stream<WriteRequest>,
    pub response: Stream<WriteResponse>,
}

impl WritePort {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            request: Stream::new(),
            response: Stream::new(),
        }
    }

    pub fn clear(&mut self) {
        self.request.clear();
        self.response.clear();
    }
}

/// Client-side view of a multi-channel memory.
///
/// Memory clients (hart, DMA engines, video scan-out) are generic over this
/// trait and address their assigned channels by index. The real controller
/// arbitrates and pipelines; tests can substitute [`FlatMemory`], which
/// services every channel with zero latency.
pub trait MemoryPorts {
    fn read_port(&mut self, channel: usize) -> &mut ReadPort;
    fn write_port(&mut self, channel: usize) -> &mut WritePort;
}

/// Zero-latency memory for unit tests.
///
/// Every posted request on every channel is serviced on the next `tick()`.
/// No arbitration, no pipelining; alignment faults behave like the real
/// controller's.
#[derive(Debug)]
pub struct FlatMemory {
    words: Vec<u32>,
    read_ports: Vec<ReadPort>,
    write_ports: Vec<WritePort>,
}

impl FlatMemory {
    #[must_use]
    pub fn new(num_bytes: u32, read_channels: usize, write_channels: usize) -> Self {
        Self {
            words: vec![0; (num_bytes as usize).div_ceil(WORD_BYTES as usize)],
            read_ports: (0..read_channels).map(|_| ReadPort::new()).collect(),
            write_ports: (0..write_channels).map(|_| WritePort::new()).collect(),
        }
    }

    /// Copy `bytes` into memory starting at `address` (little-endian words).
    pub fn load(&mut self, address: u32, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            let addr = address + i as u32;
            let word = (addr / WORD_BYTES) as usize % self.words.len();
            let shift = (addr % WORD_BYTES) * 8;
            self.words[word] = (self.words[word] & !(0xFF << shift)) | (u32::from(b) << shift);
        }
    }

    #[must_use]
    pub fn peek_word(&self, address: u32) -> u32 {
        self.words[(address / WORD_BYTES) as usize % self.words.len()]
    }

    #[must_use]
    pub fn peek_byte(&self, address: u32) -> u8 {
        (self.peek_word(address) >> ((address % WORD_BYTES) * 8)) as u8
    }

    /// Service every posted request on every channel.
    pub fn tick(&mut self) {
        let word_count = self.words.len();
        for port in &mut self.read_ports {
            if port.response.valid() {
                continue;
            }
            if let Some(req) = port.request.take() {
                if req.address % WORD_BYTES == 0 {
                    let word = (req.address / WORD_BYTES) as usize % word_count;
                    port.response.offer(ReadResponse {
                        data: self.words[word],
                        error: false,
                    });
                } else {
                    port.response.offer(ReadResponse {
                        data: 0,
                        error: true,
                    });
                }
            }
        }
        for port in &mut self.write_ports {
            if port.response.valid() {
                continue;
            }
            if let Some(req) = port.request.take() {
                if req.address % WORD_BYTES == 0 {
                    let word = (req.address / WORD_BYTES) as usize % word_count;
                    self.words[word] = req.data;
                    port.response.offer(WriteResponse { error: false });
                } else {
                    port.response.offer(WriteResponse { error: true });
                }
            }
        }
    }
}

impl MemoryPorts for FlatMemory {
    fn read_port(&mut self, channel: usize) -> &mut ReadPort {
        &mut self.read_ports[channel]
    }

    fn write_port(&mut self, channel: usize) -> &mut WritePort {
        &mut self.write_ports[channel]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_memory_round_trip() {
        let mut mem = FlatMemory::new(64, 1, 1);
        mem.write_port(0).request.offer(WriteRequest {
            address: 8,
            data: 0xDEAD_BEEF,
        });
        mem.tick();
        assert_eq!(
            mem.write_port(0).response.take(),
            Some(WriteResponse { error: false })
        );

        mem.read_port(0).request.offer(ReadRequest { address: 8 });
        mem.tick();
        assert_eq!(
            mem.read_port(0).response.take(),
            Some(ReadResponse {
                data: 0xDEAD_BEEF,
                error: false
            })
        );
    }

    #[test]
    fn flat_memory_alignment_fault() {
        let mut mem = FlatMemory::new(64, 1, 1);
        mem.read_port(0).request.offer(ReadRequest { address: 2 });
        mem.tick();
        let resp = mem.read_port(0).response.take().unwrap();
        assert!(resp.error);
        assert_eq!(resp.data, 0);
    }

    #[test]
    fn load_is_little_endian() {
        let mut mem = FlatMemory::new(64, 0, 0);
        mem.load(0, &[0x23, 0x01, 0x00, 0x00]);
        assert_eq!(mem.peek_word(0), 0x0000_0123);
        assert_eq!(mem.peek_byte(0), 0x23);
        assert_eq!(mem.peek_byte(1), 0x01);
    }
}
