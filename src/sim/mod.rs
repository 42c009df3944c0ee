//! 离散事件仿真外壳：时钟、source、终端，以及把它们和基站串起来的引擎

mod cellular;
mod engine;
mod event;
mod source;

pub use cellular::Cellular;
pub use engine::Simulation;
pub use event::EventQueue;
pub use source::Source;

/// 各组件独立的随机数流，由主种子和组件编号派生
pub(crate) fn stream_seed(master: u64, stream: u64, id: usize) -> u64 {
    master
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(stream << 32)
        .wrapping_add(id as u64)
}
