mod buzhash;

pub use buzhash::{BuzHash, WINDOW_SIZE};

/// Rolling hash.
pub trait RollingHash {
    /// Returns true once the initial hash window has been filled.
    fn init_done(&self) -> bool;
    /// Feed a byte while filling the initial window.
    fn init(&mut self, value: u8);
    /// Slide the window by one byte.
    fn input(&mut self, value: u8);
    /// Get current hash sum.
    fn sum(&self) -> u32;
    /// Clear all state, ready for a new window.
    fn reset(&mut self);
}
