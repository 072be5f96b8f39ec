pub mod client;
pub mod keys;

pub use client::{HostKeyPolicy, RelayClientHandler};
