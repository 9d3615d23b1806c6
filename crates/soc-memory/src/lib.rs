//! Single-port memory controller with multi-channel arbitration.
//!
//! One backing word array is shared by K read channels and M write channels.
//! Each cycle the controller arbitrates the two groups independently, accepts
//! at most one request per group, and runs it through a fixed-length delay
//! pipeline before touching the store. Responses return on the channel that
//! issued the request, in acceptance order.
//!
//! Read and write ports are separate in this model; when a read and a write
//! to the same word retire on the same cycle, the read is serviced first and
//! observes the old value.

mod arbiter;

use std::collections::VecDeque;

pub use arbiter::{Arbiter, ArbiterMode};
use soc_core::{
    MemoryPorts, ReadPort, ReadResponse, WritePort, WriteResponse, WORD_BYTES,
};

/// Construction parameters for the controller.
#[derive(Debug, Clone, Copy)]
pub struct MemoryConfig {
    /// Capacity of the backing store in bytes (rounded up to whole words).
    pub num_bytes: u32,
    pub read_channels: usize,
    pub write_channels: usize,
    pub mode: ArbiterMode,
    /// Cycles between accepting a request and presenting it to the store.
    pub request_delay: u32,
    /// Additional cycles between the store access and the read response.
    pub read_latency: u32,
}

#[derive(Debug, Clone, Copy)]
struct InFlightRead {
    channel: usize,
    address: u32,
    cycles_left: u32,
}

#[derive(Debug, Clone, Copy)]
struct InFlightWrite {
    channel: usize,
    address: u32,
    data: u32,
    cycles_left: u32,
}

/// The shared memory controller.
pub struct MemoryController {
    words: Vec<u32>,
    read_ports: Vec<ReadPort>,
    write_ports: Vec<WritePort>,
    read_arbiter: Arbiter,
    write_arbiter: Arbiter,
    read_pipeline: VecDeque<InFlightRead>,
    write_pipeline: VecDeque<InFlightWrite>,
    read_delay: u32,
    write_delay: u32,
    /// Committed write count per channel, for fairness inspection.
    writes_committed: Vec<u64>,
}

impl MemoryController {
    #[must_use]
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            words: vec![0; (config.num_bytes as usize).div_ceil(WORD_BYTES as usize).max(1)],
            read_ports: (0..config.read_channels).map(|_| ReadPort::new()).collect(),
            write_ports: (0..config.write_channels)
                .map(|_| WritePort::new())
                .collect(),
            read_arbiter: Arbiter::new(config.mode, config.read_channels),
            write_arbiter: Arbiter::new(config.mode, config.write_channels),
            read_pipeline: VecDeque::new(),
            write_pipeline: VecDeque::new(),
            read_delay: config.request_delay + config.read_latency,
            write_delay: config.request_delay,
            writes_committed: vec![0; config.write_channels],
        }
    }

    /// Advance the controller by one cycle.
    ///
    /// Accepts at most one read and one write request (draining the winning
    /// request stream is the ack), services pipeline heads whose delay has
    /// elapsed, then ages the remaining in-flight entries.
    pub fn tick(&mut self) {
        self.accept_requests();
        self.service_read_head();
        self.service_write_head();
        self.age_pipelines();
        self.read_arbiter.advance();
        self.write_arbiter.advance();
    }

    fn accept_requests(&mut self) {
        let read_valid: Vec<bool> = self.read_ports.iter().map(|p| p.request.valid()).collect();
        if let Some(channel) = self.read_arbiter.select(&read_valid) {
            if let Some(req) = self.read_ports[channel].request.take() {
                self.read_pipeline.push_back(InFlightRead {
                    channel,
                    address: req.address,
                    cycles_left: self.read_delay,
                });
            }
        }

        let write_valid: Vec<bool> = self.write_ports.iter().map(|p| p.request.valid()).collect();
        if let Some(channel) = self.write_arbiter.select(&write_valid) {
            if let Some(req) = self.write_ports[channel].request.take() {
                self.write_pipeline.push_back(InFlightWrite {
                    channel,
                    address: req.address,
                    data: req.data,
                    cycles_left: self.write_delay,
                });
            }
        }
    }

    fn service_read_head(&mut self) {
        let Some(front) = self.read_pipeline.front() else {
            return;
        };
        // Back-pressure: hold the head until the channel drains its previous
        // response.
        if front.cycles_left > 0 || self.read_ports[front.channel].response.valid() {
            return;
        }
        let Some(head) = self.read_pipeline.pop_front() else {
            return;
        };
        let response = if head.address % WORD_BYTES == 0 {
            ReadResponse {
                data: self.words[self.word_index(head.address)],
                error: false,
            }
        } else {
            ReadResponse {
                data: 0,
                error: true,
            }
        };
        self.read_ports[head.channel].response.offer(response);
    }

    fn service_write_head(&mut self) {
        let Some(front) = self.write_pipeline.front() else {
            return;
        };
        if front.cycles_left > 0 || self.write_ports[front.channel].response.valid() {
            return;
        }
        let Some(head) = self.write_pipeline.pop_front() else {
            return;
        };
        let error = head.address % WORD_BYTES != 0;
        if !error {
            let index = self.word_index(head.address);
            self.words[index] = head.data;
            self.writes_committed[head.channel] += 1;
        }
        self.write_ports[head.channel].response.offer(WriteResponse { error });
    }

    fn age_pipelines(&mut self) {
        for entry in &mut self.read_pipeline {
            entry.cycles_left = entry.cycles_left.saturating_sub(1);
        }
        for entry in &mut self.write_pipeline {
            entry.cycles_left = entry.cycles_left.saturating_sub(1);
        }
    }

    /// Addresses alias modulo the store size; out-of-range access wraps
    /// rather than faulting.
    fn word_index(&self, address: u32) -> usize {
        (address / WORD_BYTES) as usize % self.words.len()
    }

    /// Drop all in-flight requests and reset arbitration. The backing store
    /// is preserved; the host reseeds it via DMA if it wants a clean slate.
    pub fn clear(&mut self) {
        self.read_pipeline.clear();
        self.write_pipeline.clear();
        self.read_arbiter.clear();
        self.write_arbiter.clear();
        for port in &mut self.read_ports {
            port.clear();
        }
        for port in &mut self.write_ports {
            port.clear();
        }
        for count in &mut self.writes_committed {
            *count = 0;
        }
    }

    /// Committed write count on `channel` since the last clear.
    #[must_use]
    pub fn writes_committed(&self, channel: usize) -> u64 {
        self.writes_committed[channel]
    }

    /// Direct word read for host/test inspection. Not a bus access.
    #[must_use]
    pub fn peek_word(&self, address: u32) -> u32 {
        self.words[(address / WORD_BYTES) as usize % self.words.len()]
    }

    /// Direct byte read for host/test inspection.
    #[must_use]
    pub fn peek_byte(&self, address: u32) -> u8 {
        (self.peek_word(address) >> ((address % WORD_BYTES) * 8)) as u8
    }

    /// Host-side image load, bypassing the bus. Little-endian byte order
    /// within words, matching what the DMA write engine produces.
    pub fn load(&mut self, address: u32, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            let addr = address.wrapping_add(i as u32);
            let index = (addr / WORD_BYTES) as usize % self.words.len();
            let shift = (addr % WORD_BYTES) * 8;
            self.words[index] = (self.words[index] & !(0xFF << shift)) | (u32::from(b) << shift);
        }
    }
}

impl MemoryPorts for MemoryController {
    fn read_port(&mut self, channel: usize) -> &mut ReadPort {
        &mut self.read_ports[channel]
    }

    fn write_port(&mut self, channel: usize) -> &mut WritePort {
        &mut self.write_ports[channel]
    }
}
