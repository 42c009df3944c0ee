//! 基站调度器
//!
//! 每个 timeslot：广播 CQI 请求 -> 收齐所有用户的上报 -> 装帧 -> 清空上报集合
//! -> 等下一个 tick。
//! 来自 source 的数据包与 timeslot 无关，随到随入队。

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    config::{QueueMode, SimConfig},
    cqi::{CqiLevel, CqiReport},
    error::{ConfigError, SchedulerError},
    frame::{self, Frame},
    packet::{Packet, SimTime, UserId},
    queue::{FifoQueue, FreeSlots, PacketQueue},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeslotState {
    /// 本帧已发出，等下一个 tick
    Idle,
    AwaitingReports,
    /// 上报已收齐，等 [`Antenna::take_frame`] 装帧
    FrameReady,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    Dropped(Packet),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LossReport {
    pub lost: u64,
    pub accepted: u64,
    /// 只有有界队列模式才有意义
    pub loss_rate: Option<f64>,
}

pub struct Antenna<Q = FifoQueue> {
    queues: Vec<Q>,
    frame_capacity: u32,
    timeslot: Duration,
    bounded: bool,

    state: TimeslotState,
    slot: u64,
    next_slot: u64,
    // 按用户号存放，保证每个用户每帧只算一次
    reports: Vec<Option<CqiLevel>>,
    reported: usize,

    lost: u64,
    accepted: u64,
}

impl Antenna<FifoQueue> {
    pub fn new(config: &SimConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let queues = (0..config.population)
            .map(|_| match config.queue {
                QueueMode::Bounded { capacity } => FifoQueue::bounded(capacity),
                QueueMode::Unbounded => FifoQueue::unbounded(),
            })
            .collect();

        info!(
            population = config.population,
            frame_capacity = config.frame_capacity,
            queue = ?config.queue,
            "antenna initialised"
        );

        Ok(Self::with_queues(
            queues,
            config.frame_capacity,
            config.timeslot()?,
            matches!(config.queue, QueueMode::Bounded { .. }),
        ))
    }
}

impl<Q: PacketQueue> Antenna<Q> {
    pub fn with_queues(
        queues: Vec<Q>,
        frame_capacity: u32,
        timeslot: Duration,
        bounded: bool,
    ) -> Self {
        let population = queues.len();
        Self {
            queues,
            frame_capacity,
            timeslot,
            bounded,
            state: TimeslotState::Idle,
            slot: 0,
            next_slot: 0,
            reports: vec![None; population],
            reported: 0,
            lost: 0,
            accepted: 0,
        }
    }

    pub fn population(&self) -> usize {
        self.queues.len()
    }

    pub fn timeslot(&self) -> Duration {
        self.timeslot
    }

    #[cfg(test)]
    pub fn state(&self) -> TimeslotState {
        self.state
    }

    #[cfg(test)]
    pub fn queue(&self, user: UserId) -> Option<&Q> {
        self.queues.get(user)
    }

    /// 所有用户队列里还没下发的 (包数, 字节数)
    pub fn backlog(&self) -> (u64, u64) {
        self.queues
            .iter()
            .fold((0, 0), |(pkts, bytes), q| (pkts + q.len() as u64, bytes + q.bytes()))
    }

    /// 新 timeslot 开始，返回需要回应的 slot 编号
    pub fn on_timeslot_tick(&mut self, now: SimTime) -> Result<u64, SchedulerError> {
        if self.state != TimeslotState::Idle {
            return Err(SchedulerError::SlotOverrun {
                slot: self.slot,
                missing: self.population() - self.reported,
            });
        }
        self.slot = self.next_slot;
        self.next_slot += 1;
        self.state = TimeslotState::AwaitingReports;
        debug!(slot = self.slot, ?now, "cqi request broadcast");
        Ok(self.slot)
    }

    /// 收到一份 CQI 上报，返回处理后的状态。收齐后进入 `FrameReady`
    pub fn report_quality(&mut self, report: CqiReport) -> Result<TimeslotState, SchedulerError> {
        let population = self.population();
        if report.user >= population {
            return Err(SchedulerError::UnknownUser {
                user: report.user,
                population,
            });
        }

        if self.state != TimeslotState::AwaitingReports || report.slot != self.slot {
            warn!(
                user = report.user,
                report_slot = report.slot,
                current_slot = self.slot,
                "stale cqi report discarded"
            );
            return Ok(self.state);
        }

        let entry = &mut self.reports[report.user];
        if entry.is_some() {
            return Err(SchedulerError::DuplicateReport {
                user: report.user,
                slot: self.slot,
            });
        }
        *entry = Some(report.level);
        self.reported += 1;
        debug!(user = report.user, level = report.level, slot = self.slot, "cqi received");

        if self.reported == population {
            self.state = TimeslotState::FrameReady;
        }
        Ok(self.state)
    }

    /// `FrameReady` 时装帧、清空上报集合并回到 `Idle`，其余状态返回 None
    pub fn take_frame(&mut self, now: SimTime) -> Option<Frame> {
        if self.state != TimeslotState::FrameReady {
            return None;
        }
        let frame = self.compose_frame();
        self.reset_reports();
        self.state = TimeslotState::Idle;
        debug!(
            slot = frame.slot,
            bytes = frame.total_bytes,
            used_rbs = frame.used_rbs(),
            next_tick = ?now.saturating_add(self.timeslot),
            "frame composed"
        );
        Some(frame)
    }

    fn compose_frame(&mut self) -> Frame {
        let mut ranked: Vec<CqiReport> = self
            .reports
            .iter()
            .enumerate()
            .filter_map(|(user, level)| {
                level.map(|level| CqiReport {
                    user,
                    level,
                    slot: self.slot,
                })
            })
            .collect();
        frame::rank(&mut ranked);
        frame::allocate(self.slot, &ranked, &mut self.queues, self.frame_capacity)
    }

    fn reset_reports(&mut self) {
        self.reports.iter_mut().for_each(|r| *r = None);
        self.reported = 0;
    }

    /// 来自 source 的数据包，按 owner 投递到对应用户队列
    pub fn receive_packet(&mut self, pkt: Packet) -> Result<Admission, SchedulerError> {
        let population = self.population();
        let Some(queue) = self.queues.get_mut(pkt.owner) else {
            return Err(SchedulerError::UnknownUser {
                user: pkt.owner,
                population,
            });
        };

        let admitted = match queue.free_slots() {
            FreeSlots::Limited(0) => Err(pkt),
            _ => queue.enqueue(pkt),
        };
        match admitted {
            Ok(()) => {
                self.accepted += 1;
                Ok(Admission::Accepted)
            }
            Err(pkt) => {
                self.lost += 1;
                debug!(user = pkt.owner, size = pkt.size, "queue full, packet lost");
                Ok(Admission::Dropped(pkt))
            }
        }
    }

    pub fn loss_report(&self) -> LossReport {
        let loss_rate = self.bounded.then(|| loss_rate(self.lost, self.accepted));
        LossReport {
            lost: self.lost,
            accepted: self.accepted,
            loss_rate,
        }
    }
}

/// 丢包率 (%)，分母为 0 时记 0
pub fn loss_rate(lost: u64, accepted: u64) -> f64 {
    let total = lost + accepted;
    if total == 0 {
        return 0.0;
    }
    lost as f64 / total as f64 * 100.0
}
