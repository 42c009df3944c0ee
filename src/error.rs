use std::io;

use thiserror::Error;

use crate::packet::UserId;

/// 启动阶段的配置错误，运行中不会再出现
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("population must be positive")]
    InvalidPopulation,

    #[error("timeslot duration must be positive, got {0} ms")]
    InvalidTimeslot(f64),

    #[error("frame capacity must be at least one resource block")]
    InvalidFrameCapacity,

    #[error("bounded queue capacity must be positive")]
    InvalidQueueCapacity,

    #[error("arrival rate must be positive and finite, got {0} pkt/s")]
    InvalidArrivalRate(f64),

    #[error("packet size must be positive")]
    InvalidPacketSize,

    #[error("simulation duration must be positive, got {0} s")]
    InvalidDuration(f64),

    #[error("invalid cqi profile: {0}")]
    InvalidCqiProfile(String),

    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
}

/// 协作方违反约定。出现即说明调用方有 bug，直接终止仿真
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("user {user} is outside population of {population}")]
    UnknownUser { user: UserId, population: usize },

    #[error("user {user} reported twice in timeslot {slot}")]
    DuplicateReport { user: UserId, slot: u64 },

    #[error("timeslot tick while slot {slot} still awaits {missing} reports")]
    SlotOverrun { slot: u64, missing: usize },
}

#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("failed to write summary: {0}")]
    Output(#[from] io::Error),

    #[error("failed to encode summary: {0}")]
    Encode(#[from] serde_json::Error),
}
