//! Valid/ready handshake streams.

/// A one-deep valid/ready handshake register.
///
/// The producer side calls [`offer`](Stream::offer) and must keep re-offering
/// the same value every cycle until the slot drains; the consumer side calls
/// [`take`](Stream::take). A transfer is observable only once the consumer
/// has taken the value, which models a `valid && ready` cycle in hardware.
///
/// Because the register is one deep, a producer can never overwrite data the
/// consumer has not yet accepted: `offer` refuses while the slot is held.
#[derive(Debug, Clone)]
pub struct Stream<T> {
    slot: Option<T>,
}

impl<T> Default for Stream<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Stream<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self { slot: None }
    }

    /// Producer side: present `value` on the stream.
    ///
    /// Returns `true` when the value entered the register. Returns `false`
    /// while the previous value is still waiting to be taken; the producer
    /// holds and retries next cycle.
    pub fn offer(&mut self, value: T) -> bool {
        if self.slot.is_some() {
            return false;
        }
        self.slot = Some(value);
        true
    }

    /// Is a value currently presented?
    #[must_use]
    pub const fn valid(&self) -> bool {
        self.slot.is_some()
    }

    /// Consumer side: inspect the presented value without accepting it.
    #[must_use]
    pub const fn peek(&self) -> Option<&T> {
        self.slot.as_ref()
    }

    /// Consumer side: accept the presented value, draining the register.
    ///
    /// Draining is the ack the producer observes.
    pub fn take(&mut self) -> Option<T> {
        self.slot.take()
    }

    /// Drop any in-flight value. Used by the global clear signal.
    pub fn clear(&mut self) {
        self.slot = None;
    }
}
