//! CPU stress: core allocation bookkeeping and busy-loop workers.

mod cpu;
mod manager;

pub use cpu::CpuStresser;
pub use manager::CpuStresserManager;
