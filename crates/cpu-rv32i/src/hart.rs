//! The hart state machine.
//!
//! One instruction at a time: issue the fetch, wait for the word, execute,
//! write back. ALU, jump, and branch instructions retire in the execute
//! cycle; loads, stores, and ECALL run micro-sequenced over further cycles.
//! Memory is word-granular, so sub-word stores fetch the aligned word,
//! splice the addressed bytes, and write the whole word back.
//!
//! A transaction error sets the halt latch: the hart stops issuing work and
//! its registers stay inspectable. A halted hart never mutates memory.

use soc_core::{Inspect, MemoryPorts, ReadRequest, Value, WriteRequest};

use crate::alu;
use crate::decode::{decode, Decoded, Opcode};
use crate::registers::Registers;

/// The writeback contract produced by every instruction.
///
/// Multi-cycle instructions are represented by the state machine staying in
/// a wait state; the transaction is only produced on the retiring cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transaction {
    pub set_rd: bool,
    pub new_rd: u32,
    pub new_pc: u32,
    pub error: bool,
}

impl Transaction {
    /// Advance to `next_pc` without touching the register file.
    #[must_use]
    pub const fn advance(next_pc: u32) -> Self {
        Self {
            set_rd: false,
            new_rd: 0,
            new_pc: next_pc,
            error: false,
        }
    }

    /// Write `value` to rd and advance to `next_pc`.
    #[must_use]
    pub const fn write_rd(next_pc: u32, value: u32) -> Self {
        Self {
            set_rd: true,
            new_rd: value,
            new_pc: next_pc,
            error: false,
        }
    }

    /// An erroring transaction: the hart latches the halt state and the PC
    /// stops advancing.
    #[must_use]
    pub const fn fault() -> Self {
        Self {
            set_rd: false,
            new_rd: 0,
            new_pc: 0,
            error: true,
        }
    }
}

/// Memory channel indices assigned to a hart by the integration layer.
#[derive(Debug, Clone, Copy)]
pub struct HartChannels {
    /// Read channel used for instruction fetch.
    pub fetch_read: usize,
    /// Read channel used for loads and store read-modify-write.
    pub data_read: usize,
    /// Write channel used for stores.
    pub data_write: usize,
}

#[derive(Debug, Clone, Copy)]
enum State {
    /// Issue the instruction fetch at `pc`.
    Fetch,
    /// Waiting for the fetched word.
    WaitFetch,
    /// Waiting for load data. `address` is the unaligned byte address.
    WaitLoad { decoded: Decoded, address: u32 },
    /// Sub-word store: waiting for the aligned word to splice into.
    WaitStoreRead { decoded: Decoded, address: u32 },
    /// Waiting for the store write ack.
    WaitStoreAck,
    /// Parked on the ECALL port until the host answers.
    Ecall,
    /// Error latch set. Terminal until clear.
    Halted,
}

/// One RV32I execution context.
pub struct Hart {
    regs: Registers,
    state: State,
    channels: HartChannels,
    /// rd index of the instruction currently in flight.
    rd: usize,
    ecall_reply: Option<Transaction>,
    total_cycles: u64,
    instructions_retired: u64,
}

impl Hart {
    #[must_use]
    pub const fn new(channels: HartChannels) -> Self {
        Self {
            regs: Registers::new(),
            state: State::Fetch,
            channels,
            rd: 0,
            ecall_reply: None,
            total_cycles: 0,
            instructions_retired: 0,
        }
    }

    /// Advance the hart by one cycle.
    pub fn tick<M: MemoryPorts>(&mut self, mem: &mut M) {
        self.total_cycles += 1;

        match self.state {
            State::Halted => {}
            State::Fetch => {
                let issued = mem
                    .read_port(self.channels.fetch_read)
                    .request
                    .offer(ReadRequest {
                        address: self.regs.pc,
                    });
                if issued {
                    self.state = State::WaitFetch;
                }
            }
            State::WaitFetch => {
                if let Some(resp) = mem.read_port(self.channels.fetch_read).response.take() {
                    if resp.error {
                        self.writeback(Transaction::fault());
                    } else {
                        self.execute(decode(resp.data), mem);
                    }
                }
            }
            State::WaitLoad { decoded, address } => {
                if let Some(resp) = mem.read_port(self.channels.data_read).response.take() {
                    if resp.error {
                        self.writeback(Transaction::fault());
                    } else {
                        let value = extract_load(decoded.funct3, address, resp.data);
                        self.writeback(Transaction::write_rd(self.regs.pc.wrapping_add(4), value));
                    }
                }
            }
            State::WaitStoreRead { decoded, address } => {
                if let Some(resp) = mem.read_port(self.channels.data_read).response.take() {
                    if resp.error {
                        self.writeback(Transaction::fault());
                    } else {
                        let word =
                            splice_store(decoded.funct3, address, resp.data, self.regs.read(decoded.rs2));
                        mem.write_port(self.channels.data_write)
                            .request
                            .offer(WriteRequest {
                                address: address & !0x3,
                                data: word,
                            });
                        self.state = State::WaitStoreAck;
                    }
                }
            }
            State::WaitStoreAck => {
                if let Some(resp) = mem.write_port(self.channels.data_write).response.take() {
                    if resp.error {
                        self.writeback(Transaction::fault());
                    } else {
                        self.writeback(Transaction::advance(self.regs.pc.wrapping_add(4)));
                    }
                }
            }
            State::Ecall => {
                if let Some(t) = self.ecall_reply.take() {
                    self.writeback(t);
                }
            }
        }
    }

    /// Dispatch a decoded instruction. Single-cycle instructions retire
    /// here; memory and system instructions transition to a wait state.
    fn execute<M: MemoryPorts>(&mut self, d: Decoded, mem: &mut M) {
        self.rd = d.rd;
        let pc = self.regs.pc;
        let next = pc.wrapping_add(4);
        let rs1 = self.regs.read(d.rs1);
        let rs2 = self.regs.read(d.rs2);

        match d.opcode {
            Opcode::OpImm => {
                let value = alu::compute(d.funct3, d.funct7, rs1, d.i_imm, false);
                self.writeback(Transaction::write_rd(next, value));
            }
            Opcode::Op => {
                let value = alu::compute(d.funct3, d.funct7, rs1, rs2, true);
                self.writeback(Transaction::write_rd(next, value));
            }
            Opcode::Lui => self.writeback(Transaction::write_rd(next, d.u_imm)),
            Opcode::Auipc => {
                self.writeback(Transaction::write_rd(next, pc.wrapping_add(d.u_imm)));
            }
            Opcode::Jal => {
                let target = pc.wrapping_add(d.j_imm);
                if target % 4 == 0 {
                    self.writeback(Transaction::write_rd(target, next));
                } else {
                    self.writeback(Transaction::fault());
                }
            }
            Opcode::Jalr => {
                let target = rs1.wrapping_add(d.i_imm) & !0x1;
                if target % 4 == 0 {
                    self.writeback(Transaction::write_rd(target, next));
                } else {
                    self.writeback(Transaction::fault());
                }
            }
            Opcode::Branch => match branch_taken(d.funct3, rs1, rs2) {
                None => self.writeback(Transaction::fault()),
                Some(false) => self.writeback(Transaction::advance(next)),
                Some(true) => {
                    let target = pc.wrapping_add(d.b_imm);
                    if target % 4 == 0 {
                        self.writeback(Transaction::advance(target));
                    } else {
                        self.writeback(Transaction::fault());
                    }
                }
            },
            Opcode::Load => {
                let address = rs1.wrapping_add(d.i_imm);
                if !load_encoding_ok(d.funct3, address) {
                    self.writeback(Transaction::fault());
                    return;
                }
                mem.read_port(self.channels.data_read)
                    .request
                    .offer(ReadRequest {
                        address: address & !0x3,
                    });
                self.state = State::WaitLoad { decoded: d, address };
            }
            Opcode::Store => {
                let address = rs1.wrapping_add(d.s_imm);
                if !store_encoding_ok(d.funct3, address) {
                    self.writeback(Transaction::fault());
                    return;
                }
                if d.funct3 == 0b010 {
                    // Full-word store needs no read-modify-write.
                    mem.write_port(self.channels.data_write)
                        .request
                        .offer(WriteRequest {
                            address,
                            data: rs2,
                        });
                    self.state = State::WaitStoreAck;
                } else {
                    mem.read_port(self.channels.data_read)
                        .request
                        .offer(ReadRequest {
                            address: address & !0x3,
                        });
                    self.state = State::WaitStoreRead { decoded: d, address };
                }
            }
            Opcode::System => {
                if d.funct3 == 0 && d.i_imm == 0 {
                    self.state = State::Ecall;
                } else {
                    // EBREAK and the CSR space are unsupported. The odd
                    // set_rd/new_rd combination is long-standing behavior
                    // that existing harnesses depend on.
                    self.writeback(Transaction {
                        set_rd: true,
                        new_rd: 1,
                        new_pc: next,
                        error: true,
                    });
                }
            }
            Opcode::MiscMem => self.writeback(Transaction::advance(next)),
            Opcode::Invalid => self.writeback(Transaction::fault()),
        }
    }

    /// Apply a transaction: rd write, then either advance the PC or latch
    /// the halt state (the PC stops moving on error).
    fn writeback(&mut self, t: Transaction) {
        if t.set_rd {
            self.regs.write(self.rd, t.new_rd);
        }
        if t.error {
            self.state = State::Halted;
        } else {
            self.regs.pc = t.new_pc;
            self.instructions_retired += 1;
            self.state = State::Fetch;
        }
    }

    /// Is the hart parked on the ECALL port?
    #[must_use]
    pub fn ecall_pending(&self) -> bool {
        matches!(self.state, State::Ecall) && self.ecall_reply.is_none()
    }

    /// Answer a pending ECALL. The transaction is applied on the hart's
    /// next cycle.
    pub fn complete_ecall(&mut self, transaction: Transaction) {
        debug_assert!(matches!(self.state, State::Ecall));
        self.ecall_reply = Some(transaction);
    }

    #[must_use]
    pub fn registers(&self) -> &Registers {
        &self.regs
    }

    /// Mutable register access for host-side setup (test fixtures, boot
    /// shims). Not a hardware path.
    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.regs
    }

    #[must_use]
    pub fn pc(&self) -> u32 {
        self.regs.pc
    }

    /// True once the error latch is set.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        matches!(self.state, State::Halted)
    }

    /// True when the previous instruction has fully retired.
    #[must_use]
    pub fn is_instruction_boundary(&self) -> bool {
        matches!(self.state, State::Fetch | State::Halted)
    }

    #[must_use]
    pub fn instructions_retired(&self) -> u64 {
        self.instructions_retired
    }

    /// Reset registers (pc = 0) and the state machine. Counters restart.
    pub fn clear(&mut self) {
        self.regs.clear();
        self.state = State::Fetch;
        self.ecall_reply = None;
        self.total_cycles = 0;
        self.instructions_retired = 0;
    }
}

/// Branch comparison by funct3. `None` for the two reserved encodings.
fn branch_taken(funct3: u32, rs1: u32, rs2: u32) -> Option<bool> {
    match funct3 {
        0b000 => Some(rs1 == rs2),
        0b001 => Some(rs1 != rs2),
        0b100 => Some((rs1 as i32) < (rs2 as i32)),
        0b101 => Some((rs1 as i32) >= (rs2 as i32)),
        0b110 => Some(rs1 < rs2),
        0b111 => Some(rs1 >= rs2),
        _ => None,
    }
}

/// Valid load encoding with a naturally-aligned address?
///
/// The bus is word-granular, so a halfword crossing a word boundary has no
/// single-request rendering; natural alignment is required.
fn load_encoding_ok(funct3: u32, address: u32) -> bool {
    match funct3 {
        0b000 | 0b100 => true,
        0b001 | 0b101 => address % 2 == 0,
        0b010 => address % 4 == 0,
        _ => false,
    }
}

fn store_encoding_ok(funct3: u32, address: u32) -> bool {
    match funct3 {
        0b000 => true,
        0b001 => address % 2 == 0,
        0b010 => address % 4 == 0,
        _ => false,
    }
}

/// Select and extend the addressed bytes of a loaded word.
fn extract_load(funct3: u32, address: u32, word: u32) -> u32 {
    let shift = (address % 4) * 8;
    match funct3 {
        0b000 => ((word >> shift) as u8) as i8 as i32 as u32,
        0b001 => ((word >> shift) as u16) as i16 as i32 as u32,
        0b100 => (word >> shift) & 0xFF,
        0b101 => (word >> shift) & 0xFFFF,
        _ => word,
    }
}

/// Splice the bytes of a sub-word store into the current word.
fn splice_store(funct3: u32, address: u32, old: u32, value: u32) -> u32 {
    let shift = (address % 4) * 8;
    match funct3 {
        0b000 => (old & !(0xFF << shift)) | ((value & 0xFF) << shift),
        0b001 => (old & !(0xFFFF << shift)) | ((value & 0xFFFF) << shift),
        _ => value,
    }
}

impl Inspect for Hart {
    fn probe(&self, path: &str) -> Option<Value> {
        match path {
            "pc" => return Some(self.regs.pc.into()),
            "halted" => return Some(self.is_halted().into()),
            "cycles" => return Some(self.total_cycles.into()),
            "retired" => return Some(self.instructions_retired.into()),
            "ecall_pending" => return Some(self.ecall_pending().into()),
            _ => {}
        }
        let index: usize = path.strip_prefix('x')?.parse().ok()?;
        if index < 32 {
            Some(self.regs.read(index).into())
        } else {
            None
        }
    }

    fn probes(&self) -> &'static [&'static str] {
        &[
            "pc",
            "halted",
            "cycles",
            "retired",
            "ecall_pending",
            "x0",
            "x1",
            "x2",
            "x3",
            "x4",
            "x5",
            "x6",
            "x7",
            "x8",
            "x9",
            "x10",
            "x11",
            "x12",
            "x13",
            "x14",
            "x15",
            "x16",
            "x17",
            "x18",
            "x19",
            "x20",
            "x21",
            "x22",
            "x23",
            "x24",
            "x25",
            "x26",
            "x27",
            "x28",
            "x29",
            "x30",
            "x31",
        ]
    }
}
