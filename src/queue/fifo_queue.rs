use std::collections::VecDeque;

use crate::{
    packet::Packet,
    queue::{FreeSlots, PacketQueue},
};

// ==========================================
// 每用户 FIFO 队列 (有界 / 无界)
// ==========================================
#[derive(Debug)]
pub struct FifoQueue {
    queue: VecDeque<Packet>,
    capacity: Option<usize>, // None = 无界
    bytes: u64,
}

impl FifoQueue {
    pub fn bounded(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity: Some(capacity),
            bytes: 0,
        }
    }

    pub fn unbounded() -> Self {
        Self {
            queue: VecDeque::new(),
            capacity: None,
            bytes: 0,
        }
    }
}

impl PacketQueue for FifoQueue {
    fn enqueue(&mut self, pkt: Packet) -> Result<(), Packet> {
        // Drop-Tail: 满了就拒绝新来的，队内的包一个不动
        if let Some(capacity) = self.capacity {
            if self.queue.len() >= capacity {
                return Err(pkt);
            }
        }
        self.bytes += pkt.size as u64;
        self.queue.push_back(pkt);
        Ok(())
    }

    fn peek(&self) -> Option<&Packet> {
        self.queue.front()
    }

    fn dequeue(&mut self) -> Option<Packet> {
        let pkt = self.queue.pop_front()?;
        self.bytes -= pkt.size as u64;
        Some(pkt)
    }

    fn len(&self) -> usize {
        self.queue.len()
    }

    fn bytes(&self) -> u64 {
        self.bytes
    }

    fn free_slots(&self) -> FreeSlots {
        match self.capacity {
            Some(capacity) => FreeSlots::Limited(capacity - self.queue.len()),
            None => FreeSlots::Unlimited,
        }
    }
}
