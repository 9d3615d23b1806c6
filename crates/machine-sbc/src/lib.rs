//! Top-level single-board RV32I system.
//!
//! Wires every memory client to the shared controller, assigns channel
//! slots, and dispatches hart 0's ECALLs to the DMA transmit engine.
//!
//! Channel slot order mirrors the fabric layout:
//! - reads: `[video?] [dma?]` then per hart `[fetch, load]`
//! - writes: `[dma?]` then per hart `[store]`
//!
//! # Cycle order
//!
//! Each [`Machine::step`] advances one SoC clock: serial receive, DMA
//! pipeline, serial transmit, video, harts, ECALL dispatch, and the memory
//! controller last, so requests posted this cycle arbitrate this cycle.

mod config;

pub use config::{
    ArbitrationPolicy, MachineConfig, MemoryTuning, TimingSettings, UartSettings, VideoSettings,
};

use cpu_rv32i::{Hart, HartChannels, Registers, Transaction};
use log::{debug, trace, warn};
use soc_core::{Clocked, Cycles, Inspect, Value};
use soc_dma::DmaController;
use soc_memory::{MemoryConfig, MemoryController};
use soc_uart::{UartRx, UartTx};
use soc_video::FramebufferScanout;
use thiserror::Error;

/// Configuration and host interaction failures.
///
/// Cycle-level hardware faults never surface here; they are error bits on
/// bus responses and hart transactions.
#[derive(Debug, Error)]
pub enum MachineError {
    #[error("backing store capacity must be non-zero")]
    ZeroCapacity,
    #[error("at least one hart is required")]
    NoHarts,
    #[error("bit period is zero: {clock_hz} Hz clock cannot run {baud_rate} baud")]
    BaudTooFast { clock_hz: u32, baud_rate: u32 },
    #[error("video input dimensions must be non-zero")]
    EmptyVideoInput,
    #[error("active region {output_width}x{output_height} is not an integer multiple of the {input_width}x{input_height} framebuffer")]
    NonIntegerScale {
        input_width: u32,
        input_height: u32,
        output_width: u32,
        output_height: u32,
    },
    #[error("image of {len} bytes at {address:#010X} exceeds the {capacity} byte store")]
    ImageTooLarge { address: u32, len: usize, capacity: u32 },
}

/// The serial port and its DMA pipeline.
struct SerialLink {
    rx: UartRx,
    tx: UartTx,
    dma: DmaController,
}

/// One board: memory fabric, harts, optional serial DMA, optional video.
pub struct Machine {
    controller: MemoryController,
    harts: Vec<Hart>,
    serial: Option<SerialLink>,
    video: Option<FramebufferScanout>,
    /// Level currently driven onto the UART RX wire by the host.
    rx_line: bool,
    /// Bytes handed to the UART transmitter, in order. Host-side tap; not
    /// machine state, so `clear()` leaves it alone.
    tx_log: Vec<u8>,
    num_bytes: u32,
    cycles: Cycles,
}

impl Machine {
    /// Build a machine from `config`, validating it first.
    pub fn new(config: &MachineConfig) -> Result<Self, MachineError> {
        if config.num_bytes == 0 {
            return Err(MachineError::ZeroCapacity);
        }
        if config.num_harts == 0 {
            return Err(MachineError::NoHarts);
        }
        if let Some(uart) = &config.uart {
            if uart.baud_rate == 0 || config.clock_hz < uart.baud_rate {
                return Err(MachineError::BaudTooFast {
                    clock_hz: config.clock_hz,
                    baud_rate: uart.baud_rate,
                });
            }
        }
        if let Some(video) = &config.video {
            let v = video.to_video_config();
            if v.input_width == 0 || v.input_height == 0 {
                return Err(MachineError::EmptyVideoInput);
            }
            if v.output_width < v.input_width
                || v.output_height < v.input_height
                || v.output_width % v.input_width != 0
                || v.output_height % v.input_height != 0
            {
                return Err(MachineError::NonIntegerScale {
                    input_width: v.input_width,
                    input_height: v.input_height,
                    output_width: v.output_width,
                    output_height: v.output_height,
                });
            }
        }

        // Read slots: [video?] [dma?] then per hart [fetch, load].
        let mut next_read = 0;
        let video_read = config.video.map(|_| {
            next_read += 1;
            next_read - 1
        });
        let dma_read = config.uart.map(|_| {
            next_read += 1;
            next_read - 1
        });
        // Write slots: [dma?] then per hart [store].
        let mut next_write = 0;
        let dma_write = config.uart.map(|_| {
            next_write += 1;
            next_write - 1
        });

        let harts: Vec<Hart> = (0..config.num_harts)
            .map(|i| {
                Hart::new(HartChannels {
                    fetch_read: next_read + 2 * i,
                    data_read: next_read + 2 * i + 1,
                    data_write: next_write + i,
                })
            })
            .collect();

        let controller = MemoryController::new(&MemoryConfig {
            num_bytes: config.num_bytes,
            read_channels: next_read + 2 * config.num_harts,
            write_channels: next_write + config.num_harts,
            mode: config.memory.policy.into(),
            request_delay: config.memory.request_delay,
            read_latency: config.memory.read_latency,
        });

        let serial = match (&config.uart, dma_read, dma_write) {
            (Some(settings), Some(read), Some(write)) => {
                let uart_config = settings.to_uart_config(config.clock_hz);
                Some(SerialLink {
                    rx: UartRx::new(&uart_config),
                    tx: UartTx::new(&uart_config),
                    dma: DmaController::new(read, write),
                })
            }
            _ => None,
        };

        let video = config.video.as_ref().zip(video_read).map(|(settings, channel)| {
            FramebufferScanout::new(settings.to_video_config(), settings.timing.into(), channel)
        });

        debug!(
            "machine: {} bytes, {} hart(s), dma={}, video={}",
            config.num_bytes,
            config.num_harts,
            serial.is_some(),
            video.is_some()
        );

        Ok(Self {
            controller,
            harts,
            serial,
            video,
            rx_line: true,
            tx_log: Vec::new(),
            num_bytes: config.num_bytes,
            cycles: Cycles::ZERO,
        })
    }

    /// Advance the whole system one clock cycle.
    pub fn step(&mut self) {
        self.cycles.advance();

        if let Some(serial) = &mut self.serial {
            serial.rx.tick(self.rx_line);
            if let Some(byte) = serial.rx.output.take() {
                if byte.parity_error || byte.stop_bit_unstable {
                    warn!(
                        "serial frame fault (parity={}, stop={}); forwarding {:#04X}",
                        byte.parity_error, byte.stop_bit_unstable, byte.data
                    );
                }
                if !serial.dma.framer.input.offer(byte.data) {
                    warn!("serial overrun: dropped {:#04X}", byte.data);
                }
            }

            serial.dma.tick(&mut self.controller);
            if serial.dma.writer.done() {
                trace!("dma: inbound packet committed");
            }

            if let Some(packet_byte) = serial.dma.reader.output.peek().copied() {
                if serial.tx.input.offer(packet_byte.data) {
                    let _ = serial.dma.reader.output.take();
                    self.tx_log.push(packet_byte.data);
                }
            }
            serial.tx.tick();
        }

        if let Some(video) = &mut self.video {
            video.tick(&mut self.controller);
        }

        for hart in &mut self.harts {
            hart.tick(&mut self.controller);
        }
        self.dispatch_ecalls();

        self.controller.tick();
    }

    /// Answer pending ECALLs. Only hart 0 reaches the DMA handler; the
    /// rest complete with the default no-op transaction.
    fn dispatch_ecalls(&mut self) {
        for index in 0..self.harts.len() {
            if !self.harts[index].ecall_pending() {
                continue;
            }
            let next_pc = self.harts[index].pc().wrapping_add(4);
            if index != 0 {
                self.harts[index].complete_ecall(Transaction::write_rd(next_pc, 0));
                continue;
            }

            let regs = self.harts[0].registers();
            let mode = regs.read(5);
            let address = regs.read(6);
            let length = regs.read(7);
            let accepted = match (mode, &mut self.serial) {
                (0, Some(serial)) => serial.dma.reader.start(address, length as u16),
                _ => false,
            };
            trace!(
                "ecall: mode={mode} address={address:#010X} length={length} accepted={accepted}"
            );
            // ECALL's rd is x0, so the result goes to x10 per the guest ABI.
            self.harts[0].registers_mut().write(10, u32::from(accepted));
            self.harts[0].complete_ecall(Transaction::advance(next_pc));
        }
    }

    /// Reset every state machine and zero the hart registers (pc = 0).
    /// Memory is NOT cleared; the host seeds it via DMA or `load_image`.
    pub fn clear(&mut self) {
        self.controller.clear();
        for hart in &mut self.harts {
            hart.clear();
        }
        if let Some(serial) = &mut self.serial {
            serial.rx.clear();
            serial.tx.clear();
            serial.dma.clear();
        }
        if let Some(video) = &mut self.video {
            video.clear();
        }
        self.rx_line = true;
        self.cycles = Cycles::ZERO;
    }

    /// Seed memory directly, bypassing the bus. Mirrors what an inbound
    /// DMA packet would write.
    pub fn load_image(&mut self, address: u32, bytes: &[u8]) -> Result<(), MachineError> {
        let end = address as usize + bytes.len();
        if end > self.num_bytes as usize {
            return Err(MachineError::ImageTooLarge {
                address,
                len: bytes.len(),
                capacity: self.num_bytes,
            });
        }
        self.controller.load(address, bytes);
        Ok(())
    }

    /// Drive the UART RX wire level. Idle is high.
    pub fn set_rx_line(&mut self, level: bool) {
        self.rx_line = level;
    }

    /// Current UART TX wire level.
    #[must_use]
    pub fn tx_line(&self) -> bool {
        self.serial.as_ref().is_none_or(|s| s.tx.line())
    }

    /// Byte-stream shortcut past the RX wire: push a byte straight into
    /// the packet framer. Returns false if the port is absent or busy.
    pub fn serial_input(&mut self, byte: u8) -> bool {
        match &mut self.serial {
            Some(serial) => serial.dma.framer.input.offer(byte),
            None => false,
        }
    }

    /// Drain the log of bytes handed to the UART transmitter.
    pub fn take_serial_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.tx_log)
    }

    #[must_use]
    pub fn hart_registers(&self, index: usize) -> &Registers {
        self.harts[index].registers()
    }

    #[must_use]
    pub fn hart_halted(&self, index: usize) -> bool {
        self.harts[index].is_halted()
    }

    #[must_use]
    pub fn num_harts(&self) -> usize {
        self.harts.len()
    }

    /// The scan-out engine, when configured.
    #[must_use]
    pub fn video(&self) -> Option<&FramebufferScanout> {
        self.video.as_ref()
    }

    pub fn video_mut(&mut self) -> Option<&mut FramebufferScanout> {
        self.video.as_mut()
    }

    /// Direct word read for host/test inspection.
    #[must_use]
    pub fn peek_word(&self, address: u32) -> u32 {
        self.controller.peek_word(address)
    }

    /// Direct byte read for host/test inspection.
    #[must_use]
    pub fn peek_byte(&self, address: u32) -> u8 {
        self.controller.peek_byte(address)
    }

    /// Cycles elapsed since construction or the last clear.
    #[must_use]
    pub fn cycles(&self) -> Cycles {
        self.cycles
    }
}

impl Clocked for Machine {
    fn clock(&mut self) {
        self.step();
    }
}

impl Inspect for Machine {
    fn probe(&self, path: &str) -> Option<Value> {
        if path == "cycles" {
            return Some(self.cycles.get().into());
        }
        let rest = path.strip_prefix("hart")?;
        let (index, hart_path) = rest.split_once('.')?;
        let index: usize = index.parse().ok()?;
        self.harts.get(index)?.probe(hart_path)
    }

    fn probes(&self) -> &'static [&'static str] {
        &["cycles", "hart0.pc", "hart0.halted", "hart0.ecall_pending"]
    }
}
