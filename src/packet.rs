use std::time::Duration;

/// 仿真时钟：从仿真开始经过的时间
pub type SimTime = Duration;

/// 用户编号，取值范围 `[0, population)`
pub type UserId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub size: u32,          // 字节数，恒为正
    pub timestamp: SimTime, // 进入基站队列的时刻 (由 source 盖戳)
    pub owner: UserId,      // 出队后靠它找到对应的用户下发
}

impl Packet {
    pub fn new(owner: UserId, size: u32, timestamp: SimTime) -> Self {
        Self {
            size,
            timestamp,
            owner,
        }
    }
}
