//! Packet-framed DMA between the serial port and memory.
//!
//! Inbound: UART bytes are framed into packets (header, 16-bit length,
//! 32-bit address, payload) and the payload is written to memory word by
//! word. Outbound: a `{address, length}` trigger reads memory and emits a
//! packet with the same framing, so a loop through both directions is
//! byte-exact.
//!
//! Wire format, all multi-byte fields big-endian:
//!
//! ```text
//! offset  size  field
//! 0       1     header (default 'Q')
//! 1       2     length L: bytes from offset 3 onward
//! 3       4     address
//! 7       L-4   payload (little-endian within memory words)
//! ```

mod framer;
mod reader;
mod writer;

pub use framer::PacketFramer;
pub use reader::PacketReader;
pub use writer::PacketWriter;

use soc_core::MemoryPorts;

/// Default packet header byte.
pub const PACKET_HEADER: u8 = b'Q';

/// One byte of a packet body with an out-of-band end marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketByte {
    pub data: u8,
    /// Set on the final byte of the packet.
    pub last: bool,
}

/// The DMA pipeline: framer feeding the write engine, plus the read engine.
///
/// Channel indices refer to the memory controller ports assigned by the
/// integration layer.
pub struct DmaController {
    pub framer: PacketFramer,
    pub writer: PacketWriter,
    pub reader: PacketReader,
}

impl DmaController {
    #[must_use]
    pub fn new(read_channel: usize, write_channel: usize) -> Self {
        Self {
            framer: PacketFramer::new(PACKET_HEADER),
            writer: PacketWriter::new(write_channel),
            reader: PacketReader::new(read_channel, Some(PACKET_HEADER)),
        }
    }

    /// Advance the whole pipeline one cycle.
    pub fn tick<M: MemoryPorts>(&mut self, mem: &mut M) {
        self.framer.tick();
        // Hand framed bytes to the write engine as its input slot drains.
        if let Some(byte) = self.framer.output.peek().copied() {
            if self.writer.input.offer(byte) {
                let _ = self.framer.output.take();
            }
        }
        self.writer.tick(mem);
        self.reader.tick(mem);
    }

    pub fn clear(&mut self) {
        self.framer.clear();
        self.writer.clear();
        self.reader.clear();
    }
}
