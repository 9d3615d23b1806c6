//! Machine configuration.
//!
//! Plain data describing one board build. The structs mirror the chip
//! crates' construction parameters so a whole machine can be described in
//! JSON by host tooling; `Machine::new` validates and converts.

use serde::Deserialize;
use soc_memory::ArbiterMode;
use soc_uart::UartConfig;
use soc_video::{SyncTiming, VideoConfig};

/// Memory controller arbitration policy.
///
/// Round-robin is the default: sustained video scan-out on a priority
/// scheme can starve the harts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum ArbitrationPolicy {
    #[default]
    RoundRobin,
    Priority,
}

impl From<ArbitrationPolicy> for ArbiterMode {
    fn from(policy: ArbitrationPolicy) -> Self {
        match policy {
            ArbitrationPolicy::RoundRobin => ArbiterMode::RoundRobin,
            ArbitrationPolicy::Priority => ArbiterMode::Priority,
        }
    }
}

/// Memory controller timing knobs.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct MemoryTuning {
    #[serde(default)]
    pub policy: ArbitrationPolicy,
    /// Cycles between accepting a request and presenting it to the store.
    #[serde(default)]
    pub request_delay: u32,
    /// Additional cycles before a read response asserts.
    #[serde(default)]
    pub read_latency: u32,
}

/// Serial port settings. Presence enables the DMA pipeline and its
/// memory channel slots.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct UartSettings {
    pub baud_rate: u32,
    #[serde(default)]
    pub parity: bool,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u32,
}

const fn default_stop_bits() -> u32 {
    1
}

impl UartSettings {
    pub(crate) fn to_uart_config(self, clock_hz: u32) -> UartConfig {
        UartConfig {
            clock_hz,
            baud_rate: self.baud_rate,
            parity: self.parity,
            stop_bits: self.stop_bits,
        }
    }
}

/// Display timing in pixel clocks and lines.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TimingSettings {
    pub h_active: u32,
    pub h_front_porch: u32,
    pub h_sync: u32,
    pub h_back_porch: u32,
    pub v_active: u32,
    pub v_front_porch: u32,
    pub v_sync: u32,
    pub v_back_porch: u32,
}

impl From<TimingSettings> for SyncTiming {
    fn from(t: TimingSettings) -> Self {
        SyncTiming {
            h_active: t.h_active,
            h_front_porch: t.h_front_porch,
            h_sync: t.h_sync,
            h_back_porch: t.h_back_porch,
            v_active: t.v_active,
            v_front_porch: t.v_front_porch,
            v_sync: t.v_sync,
            v_back_porch: t.v_back_porch,
        }
    }
}

/// Scan-out settings. Presence enables the video engine and its read
/// channel slot.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct VideoSettings {
    pub input_width: u32,
    pub input_height: u32,
    pub framebuffer_address: u32,
    pub timing: TimingSettings,
}

impl VideoSettings {
    /// The output resolution is the timing generator's active region.
    pub(crate) fn to_video_config(self) -> VideoConfig {
        VideoConfig {
            input_width: self.input_width,
            input_height: self.input_height,
            output_width: self.timing.h_active,
            output_height: self.timing.v_active,
            framebuffer_address: self.framebuffer_address,
        }
    }
}

/// Configuration for one board.
#[derive(Debug, Clone, Deserialize)]
pub struct MachineConfig {
    /// SoC clock frequency in Hz; the UART derives its bit period from it.
    pub clock_hz: u32,
    /// Backing store capacity in bytes.
    pub num_bytes: u32,
    /// Number of harts. Only hart 0 is wired to the ECALL/DMA handler.
    #[serde(default = "default_num_harts")]
    pub num_harts: usize,
    #[serde(default)]
    pub memory: MemoryTuning,
    #[serde(default)]
    pub uart: Option<UartSettings>,
    #[serde(default)]
    pub video: Option<VideoSettings>,
}

const fn default_num_harts() -> usize {
    1
}
