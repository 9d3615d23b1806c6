//! RV32I hart.
//!
//! Executes the base integer instruction set one instruction at a time:
//! fetch, decode, execute, writeback. Loads and stores run micro-sequenced
//! against the word-granular memory bus (sub-word stores are
//! read-modify-write). ECALL parks the hart on an external port until the
//! host supplies the writeback transaction, which is how guest code reaches
//! the DMA engine.

mod alu;
mod decode;
mod hart;
mod registers;

pub use decode::{decode, Decoded, Opcode};
pub use hart::{Hart, HartChannels, Transaction};
pub use registers::Registers;
