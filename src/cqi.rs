use crate::packet::UserId;

/// 信道质量等级。有效范围 1..=15，其余一律视为无效
pub type CqiLevel = i32;

pub const MIN_CQI: CqiLevel = 1;
pub const MAX_CQI: CqiLevel = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CqiReport {
    pub user: UserId,
    pub level: CqiLevel,
    pub slot: u64, // 回应的是哪个 timeslot 的请求
}

/// CQI -> 每个 RB 可承载的字节数
pub fn bytes_per_rb(level: CqiLevel) -> u32 {
    match level {
        1 | 2 => 3,
        3 => 6,
        4 => 11,
        5 => 15,
        6 => 20,
        7 => 25,
        8 => 36,
        9 => 39,
        10 => 50,
        11 => 63,
        12 => 72,
        13 => 80,
        14 | 15 => 93,
        _ => 0,
    }
}
