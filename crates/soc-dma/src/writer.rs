//! Packet-to-memory write engine.

use soc_core::{MemoryPorts, Stream, WriteRequest, WORD_BYTES};

use crate::PacketByte;

#[derive(Debug, Clone, Copy)]
enum WriterState {
    /// Accumulating the 4-byte big-endian destination address.
    Address { collected: u32 },
    /// Packing payload bytes into the current word.
    Payload,
    /// Write issued; waiting for the controller's ack.
    AwaitAck { finish: bool },
}

/// Writes packet payloads into memory.
///
/// The first four body bytes load the address register; every subsequent
/// `WORD_BYTES` payload bytes become one word write, little-endian within
/// the word. A trailing partial word is zero-padded. Packet addresses are
/// expected to be word-aligned; an unaligned address faults every write at
/// the controller and the payload is lost.
#[derive(Debug)]
pub struct PacketWriter {
    /// Framed packet bytes.
    pub input: Stream<PacketByte>,
    write_channel: usize,
    state: WriterState,
    address: u32,
    word: u32,
    bytes_in_word: u32,
    done: bool,
}

impl PacketWriter {
    #[must_use]
    pub fn new(write_channel: usize) -> Self {
        Self {
            input: Stream::new(),
            write_channel,
            state: WriterState::Address { collected: 0 },
            address: 0,
            word: 0,
            bytes_in_word: 0,
            done: false,
        }
    }

    /// Advance one cycle.
    pub fn tick<M: MemoryPorts>(&mut self, mem: &mut M) {
        self.done = false;

        match self.state {
            WriterState::Address { collected } => {
                if let Some(byte) = self.input.take() {
                    self.address = self.address << 8 | u32::from(byte.data);
                    if collected == 3 {
                        self.word = 0;
                        self.bytes_in_word = 0;
                        if byte.last {
                            // Address-only packet: nothing to write.
                            self.finish();
                        } else {
                            self.state = WriterState::Payload;
                        }
                    } else {
                        self.state = WriterState::Address {
                            collected: collected + 1,
                        };
                    }
                }
            }
            WriterState::Payload => {
                if let Some(byte) = self.input.take() {
                    self.word |= u32::from(byte.data) << (8 * self.bytes_in_word);
                    self.bytes_in_word += 1;
                    if self.bytes_in_word == WORD_BYTES || byte.last {
                        // Partial words are already zero-padded: the word
                        // register starts from zero.
                        mem.write_port(self.write_channel)
                            .request
                            .offer(WriteRequest {
                                address: self.address,
                                data: self.word,
                            });
                        self.state = WriterState::AwaitAck { finish: byte.last };
                    }
                }
            }
            WriterState::AwaitAck { finish } => {
                if mem
                    .write_port(self.write_channel)
                    .response
                    .take()
                    .is_some()
                {
                    self.address = self.address.wrapping_add(WORD_BYTES);
                    self.word = 0;
                    self.bytes_in_word = 0;
                    if finish {
                        self.finish();
                    } else {
                        self.state = WriterState::Payload;
                    }
                }
            }
        }
    }

    fn finish(&mut self) {
        self.done = true;
        self.address = 0;
        self.state = WriterState::Address { collected: 0 };
    }

    /// One-cycle pulse raised when a packet has been fully committed.
    #[must_use]
    pub const fn done(&self) -> bool {
        self.done
    }

    pub fn clear(&mut self) {
        self.input.clear();
        self.state = WriterState::Address { collected: 0 };
        self.address = 0;
        self.word = 0;
        self.bytes_in_word = 0;
        self.done = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soc_core::FlatMemory;

    /// Feed packet body bytes (address prefix + payload) into the writer.
    fn feed(writer: &mut PacketWriter, mem: &mut FlatMemory, body: &[u8]) -> bool {
        let mut saw_done = false;
        let last_index = body.len() - 1;
        for (i, &b) in body.iter().enumerate() {
            let byte = PacketByte {
                data: b,
                last: i == last_index,
            };
            while !writer.input.offer(byte) {
                writer.tick(mem);
                mem.tick();
                saw_done |= writer.done();
            }
        }
        for _ in 0..32 {
            writer.tick(mem);
            mem.tick();
            saw_done |= writer.done();
        }
        saw_done
    }

    #[test]
    fn writes_full_words_little_endian() {
        let mut mem = FlatMemory::new(256, 0, 1);
        let mut writer = PacketWriter::new(0);
        let done = feed(
            &mut writer,
            &mut mem,
            &[0x00, 0x00, 0x00, 0x40, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88],
        );
        assert!(done);
        assert_eq!(mem.peek_word(0x40), 0x4433_2211);
        assert_eq!(mem.peek_word(0x44), 0x8877_6655);
    }

    #[test]
    fn partial_final_word_is_zero_padded() {
        let mut mem = FlatMemory::new(256, 0, 1);
        mem.load(0x80, &[0xEE; 8]);
        let mut writer = PacketWriter::new(0);
        let done = feed(
            &mut writer,
            &mut mem,
            &[0x00, 0x00, 0x00, 0x80, 0xAA, 0xBB, 0xCC, 0xDD, 0x12],
        );
        assert!(done);
        assert_eq!(mem.peek_word(0x80), 0xDDCC_BBAA);
        assert_eq!(mem.peek_word(0x84), 0x0000_0012, "tail must be zero-padded");
    }

    #[test]
    fn address_only_packet_writes_nothing() {
        let mut mem = FlatMemory::new(256, 0, 1);
        let mut writer = PacketWriter::new(0);
        let done = feed(&mut writer, &mut mem, &[0x00, 0x00, 0x00, 0x40]);
        assert!(done);
        assert_eq!(mem.peek_word(0x40), 0);
    }

    #[test]
    fn consecutive_packets_reload_the_address() {
        let mut mem = FlatMemory::new(256, 0, 1);
        let mut writer = PacketWriter::new(0);
        assert!(feed(&mut writer, &mut mem, &[0x00, 0x00, 0x00, 0x00, 0x01]));
        assert!(feed(&mut writer, &mut mem, &[0x00, 0x00, 0x00, 0x0C, 0x02]));
        assert_eq!(mem.peek_word(0x00), 0x01);
        assert_eq!(mem.peek_word(0x0C), 0x02);
    }
}
