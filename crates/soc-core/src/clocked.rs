//! Trait for components driven by the global clock.

use crate::Cycles;

/// A component driven directly by the SoC clock, with no per-cycle inputs.
///
/// Chips that need bus access each cycle (the hart, the DMA engines, the
/// scan-out) take their ports as arguments to an inherent tick method
/// instead; this trait is for self-contained components and the machine
/// itself.
pub trait Clocked {
    /// Apply one rising clock edge.
    ///
    /// One edge is one atomic next-state step: the component either makes
    /// progress or holds, waiting on a handshake. There is no blocking in
    /// the host sense.
    fn clock(&mut self);

    /// Run the clock for `span` edges.
    fn run(&mut self, span: Cycles) {
        for _ in 0..span.get() {
            self.clock();
        }
    }
}
