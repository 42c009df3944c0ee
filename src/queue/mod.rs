use crate::packet::Packet;

mod fifo_queue;

pub use fifo_queue::FifoQueue;

/// 剩余槽位。无界队列没有可比较的数值，单独成一个变体
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeSlots {
    Limited(usize),
    Unlimited,
}

pub trait PacketQueue {
    /// 入队失败时把包原样退回，由调用方记账
    fn enqueue(&mut self, pkt: Packet) -> Result<(), Packet>;
    fn peek(&self) -> Option<&Packet>;
    fn dequeue(&mut self) -> Option<Packet>;
    fn len(&self) -> usize;
    fn bytes(&self) -> u64;
    fn free_slots(&self) -> FreeSlots;
}
