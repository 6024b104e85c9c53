// # State Store Implementations
//
// This module provides implementations of the StateStore trait.

pub mod memory;

pub use memory::MemoryStateStore;
