#![forbid(unsafe_code)]

//! Caller-supplied change flags.
//!
//! Observers never interpret these bits beyond [`ChangeFlags::BIND_COMMIT`];
//! everything else is forwarded to subscribers untouched.

bitflags::bitflags! {
    /// Opaque bitset passed from `set_value` through to subscribers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChangeFlags: u32 {
        /// The write came from a one-time binding.
        const FROM_BIND        = 0b0000_0001;
        /// Consumers should not queue target-observer updates.
        const NO_TARGET_QUEUE  = 0b0000_0010;
        /// Initial binding commit while the source and target start in sync.
        /// Bindable change callbacks are skipped for these writes.
        const BIND_COMMIT      = 0b0000_0100;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_bits_survive() {
        let flags = ChangeFlags::from_bits_retain(0b1000_0001);
        assert!(flags.contains(ChangeFlags::FROM_BIND));
        assert_eq!(flags.bits(), 0b1000_0001);
    }
}
