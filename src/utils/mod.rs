pub mod coalescing_gate;

pub use coalescing_gate::{CoalescingGate, DEFAULT_SETTLE_INTERVAL};
