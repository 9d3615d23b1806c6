//! Core traits and types for the cycle-accurate SoC model.
//!
//! Everything advances in lockstep with a single global clock. Components
//! exchange data exclusively through valid/ready streams; the memory
//! controller is the only owner of backing storage.

mod bus;
mod clocked;
mod cycles;
mod inspect;
mod stream;

pub use bus::{
    FlatMemory, MemoryPorts, ReadPort, ReadRequest, ReadResponse, WritePort, WriteRequest,
    WriteResponse, WORD_BYTES,
};
pub use clocked::Clocked;
pub use cycles::Cycles;
pub use inspect::{Inspect, Value};
pub use stream::Stream;
