//! Command implementations.

pub mod control;
pub mod discover;
pub mod info;

pub use control::{run_color, run_label, run_power, run_waveform};
pub use discover::run_discover;
pub use info::run_info;
