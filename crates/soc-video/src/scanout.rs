//! Framebuffer expansion.

use soc_core::{MemoryPorts, ReadRequest, WORD_BYTES};

use crate::timing::{SyncTiming, TimingGenerator};

/// Scan-out configuration.
///
/// The framebuffer is a row-major bitvector of `input_width x input_height`
/// packed LSB-first into 32-bit words at `framebuffer_address`. Each input
/// pixel is replicated `output/input` times per axis; the output dimensions
/// must match the timing generator's active region and divide evenly.
#[derive(Debug, Clone, Copy)]
pub struct VideoConfig {
    pub input_width: u32,
    pub input_height: u32,
    pub output_width: u32,
    pub output_height: u32,
    pub framebuffer_address: u32,
}

#[derive(Debug, Clone, Copy)]
struct Fetch {
    row: u32,
    word_index: u32,
    outstanding: bool,
}

/// The framebuffer expander.
///
/// Owns the beam counters and a one-input-row word cache. The row needed
/// next is prefetched during blanking, one word per completed read, so the
/// active region is always served cache-hit; `cache_misses()` counts any
/// pixel that was due before its row arrived.
#[derive(Debug)]
pub struct FramebufferScanout {
    config: VideoConfig,
    timing: TimingGenerator,
    read_channel: usize,
    row_cache: Vec<u32>,
    cached_row: Option<u32>,
    fetch: Option<Fetch>,
    pixel: bool,
    cache_misses: u64,
}

impl FramebufferScanout {
    #[must_use]
    pub fn new(config: VideoConfig, timing: SyncTiming, read_channel: usize) -> Self {
        // Worst case: a row's bit span straddles one extra word.
        let cache_words = (config.input_width as usize).div_ceil(32) + 1;
        Self {
            config,
            timing: TimingGenerator::new(timing),
            read_channel,
            row_cache: vec![0; cache_words],
            cached_row: None,
            fetch: None,
            pixel: false,
            cache_misses: 0,
        }
    }

    /// Advance one pixel clock.
    pub fn tick<M: MemoryPorts>(&mut self, mem: &mut M) {
        let vsync_before = self.timing.vsync();
        self.timing.tick();
        // Start of frame: drop row tracking and refill from row 0.
        if self.timing.vsync() && !vsync_before {
            self.cached_row = None;
            self.fetch = None;
        }

        self.pixel = if self.timing.data_enable() {
            self.lookup_pixel()
        } else {
            false
        };

        self.prefetch(mem);
    }

    /// The bit for the current beam position, from the row cache.
    fn lookup_pixel(&mut self) -> bool {
        let input_row = self.timing.y() / self.y_scale();
        if self.cached_row != Some(input_row) {
            self.cache_misses += 1;
            return false;
        }
        let col = self.timing.x() / self.x_scale();
        let bit_index = input_row * self.config.input_width + col;
        let word = (bit_index / 32) - self.row_first_word(input_row);
        let bit = bit_index % 32;
        self.row_cache[word as usize] >> bit & 1 != 0
    }

    /// Fetch the row needed next, one outstanding read at a time.
    fn prefetch<M: MemoryPorts>(&mut self, mem: &mut M) {
        let target = self.target_row();
        if self.cached_row == Some(target) {
            return;
        }
        let first_word = self.row_first_word(target);
        let word_count = self.row_word_count(target);
        let base = self.config.framebuffer_address;
        let channel = self.read_channel;

        match &mut self.fetch {
            Some(fetch) if fetch.row == target => {
                if fetch.outstanding {
                    if let Some(resp) = mem.read_port(channel).response.take() {
                        self.row_cache[fetch.word_index as usize] = resp.data;
                        fetch.word_index += 1;
                        fetch.outstanding = false;
                        if fetch.word_index == word_count {
                            self.cached_row = Some(target);
                            self.fetch = None;
                        }
                    }
                } else {
                    let address = base + (first_word + fetch.word_index) * WORD_BYTES;
                    if mem.read_port(channel).request.offer(ReadRequest { address }) {
                        fetch.outstanding = true;
                    }
                }
            }
            _ => {
                // New target: discard any stale response and restart.
                let _ = mem.read_port(channel).response.take();
                self.fetch = Some(Fetch {
                    row: target,
                    word_index: 0,
                    outstanding: false,
                });
            }
        }
    }

    /// Input row needed for the next active scanline.
    fn target_row(&self) -> u32 {
        let y = self.timing.y();
        let active = self.timing.sync_timing().v_active;
        let next_line = if y >= active || self.timing.x() >= self.timing.sync_timing().h_active {
            // In blanking: the next active line (or line 0 of the next frame).
            if y + 1 < active { y + 1 } else { 0 }
        } else {
            y
        };
        // Wrapped past the last active line during vertical blanking.
        let next_line = if next_line >= active { 0 } else { next_line };
        next_line / self.y_scale()
    }

    /// First framebuffer word holding bits of `row`.
    fn row_first_word(&self, row: u32) -> u32 {
        row * self.config.input_width / 32
    }

    fn row_word_count(&self, row: u32) -> u32 {
        let first_bit = row * self.config.input_width;
        let last_bit = first_bit + self.config.input_width - 1;
        last_bit / 32 - first_bit / 32 + 1
    }

    const fn x_scale(&self) -> u32 {
        self.config.output_width / self.config.input_width
    }

    const fn y_scale(&self) -> u32 {
        self.config.output_height / self.config.input_height
    }

    /// Current output pixel. Zero during blanking.
    #[must_use]
    pub const fn pixel(&self) -> bool {
        self.pixel
    }

    #[must_use]
    pub const fn hsync(&self) -> bool {
        self.timing.hsync()
    }

    #[must_use]
    pub const fn vsync(&self) -> bool {
        self.timing.vsync()
    }

    #[must_use]
    pub const fn data_enable(&self) -> bool {
        self.timing.data_enable()
    }

    /// Beam position, for hosts assembling frames.
    #[must_use]
    pub const fn beam(&self) -> (u32, u32) {
        (self.timing.x(), self.timing.y())
    }

    /// Pixels that were due before their row had been fetched.
    #[must_use]
    pub const fn cache_misses(&self) -> u64 {
        self.cache_misses
    }

    /// Frame wrap flag, auto-clearing.
    pub fn take_frame_complete(&mut self) -> bool {
        self.timing.take_frame_complete()
    }

    pub fn clear(&mut self) {
        self.timing.clear();
        self.cached_row = None;
        self.fetch = None;
        self.pixel = false;
        self.cache_misses = 0;
        self.row_cache.fill(0);
    }
}
