use std::time::Duration;

use chrono::Local;
use serde::Serialize;
use tracing::info;

use crate::{
    antenna::LossReport,
    frame::Frame,
    packet::{SimTime, UserId},
};

// ==========================================
// 1. 每用户队列统计 (区间增量 + 积压水位)
// ==========================================
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub in_pkts: u64,
    pub drop_pkts: u64,
    pub out_pkts: u64,
    pub out_bytes: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Backlog {
    pkts: u64,
    bytes: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct ResponseStats {
    count: u64,
    total: Duration,
    max: Duration,
}

impl ResponseStats {
    fn record(&mut self, rt: Duration) {
        self.count += 1;
        self.total += rt;
        self.max = self.max.max(rt);
    }

    fn mean_ms(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.total.as_nanos() as f64 / self.count as f64 / 1e6
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSummary {
    pub user: UserId,
    #[serde(flatten)]
    pub stats: QueueStats,
    pub backlog_pkts: u64,
    pub backlog_bytes: u64,
    pub mean_response_ms: f64,
    pub max_response_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub slots: u64,
    pub sim_time_s: f64,
    pub total_bytes: u64,
    /// 每个 timeslot 的平均下发字节数
    pub mean_throughput: f64,
    pub max_throughput: u64,
    pub mean_response_ms: f64,
    pub users: Vec<UserSummary>,
    pub loss: LossReport,
}

// ==========================================
// 2. 监控面板
// ==========================================
pub struct Monitor {
    interval: Vec<QueueStats>, // 区间增量，每次汇报后清零
    totals: Vec<QueueStats>,
    backlog: Vec<Backlog>, // 真实库存，永不清零
    response: Vec<ResponseStats>,

    slots: u64,
    total_bytes: u64,
    max_throughput: u64,
    interval_bytes: u64,
    report_interval_slots: u64,
}

impl Monitor {
    pub fn new(population: usize, report_interval_slots: u64) -> Self {
        Self {
            interval: vec![QueueStats::default(); population],
            totals: vec![QueueStats::default(); population],
            backlog: vec![Backlog::default(); population],
            response: vec![ResponseStats::default(); population],
            slots: 0,
            total_bytes: 0,
            max_throughput: 0,
            interval_bytes: 0,
            report_interval_slots,
        }
    }

    pub fn record_admission(&mut self, user: UserId, size: u32, accepted: bool) {
        let (Some(interval), Some(total)) = (self.interval.get_mut(user), self.totals.get_mut(user))
        else {
            return;
        };
        if accepted {
            interval.in_pkts += 1;
            total.in_pkts += 1;
            self.backlog[user].pkts += 1;
            self.backlog[user].bytes += size as u64;
        } else {
            interval.drop_pkts += 1;
            total.drop_pkts += 1;
        }
    }

    /// 帧结束时调用：核销积压，记录吞吐
    pub fn record_frame(&mut self, now: SimTime, frame: &Frame) {
        for pkt in frame.served_packets() {
            let user = pkt.owner;
            let (Some(interval), Some(total)) =
                (self.interval.get_mut(user), self.totals.get_mut(user))
            else {
                continue;
            };
            let size = pkt.size as u64;
            interval.out_pkts += 1;
            interval.out_bytes += size;
            total.out_pkts += 1;
            total.out_bytes += size;

            let backlog = &mut self.backlog[user];
            backlog.pkts = backlog.pkts.saturating_sub(1);
            backlog.bytes = backlog.bytes.saturating_sub(size);
        }

        self.slots += 1;
        self.total_bytes += frame.total_bytes;
        self.interval_bytes += frame.total_bytes;
        self.max_throughput = self.max_throughput.max(frame.total_bytes);

        if self.report_interval_slots > 0 && self.slots % self.report_interval_slots == 0 {
            self.report_interval(now);
        }
    }

    pub fn record_delivery(&mut self, user: UserId, response_time: Duration) {
        if let Some(stats) = self.response.get_mut(user) {
            stats.record(response_time);
        }
    }

    fn report_interval(&mut self, now: SimTime) {
        let (mut in_pkts, mut drop_pkts, mut out_pkts) = (0, 0, 0);
        for stat in &mut self.interval {
            in_pkts += stat.in_pkts;
            drop_pkts += stat.drop_pkts;
            out_pkts += stat.out_pkts;
            // 只清增量，积压水位在 backlog 里
            *stat = QueueStats::default();
        }
        let backlog_pkts: u64 = self.backlog.iter().map(|b| b.pkts).sum();
        let backlog_bytes: u64 = self.backlog.iter().map(|b| b.bytes).sum();

        info!(
            sim_time = ?now,
            slots = self.slots,
            in_pkts,
            drop_pkts,
            out_pkts,
            bytes = self.interval_bytes,
            mean_throughput = self.interval_bytes as f64 / self.report_interval_slots as f64,
            backlog_pkts,
            backlog_bytes,
            "interval report"
        );
        self.interval_bytes = 0;
    }

    pub fn summary(&self, elapsed: SimTime, loss: LossReport) -> Summary {
        let users: Vec<UserSummary> = self
            .totals
            .iter()
            .enumerate()
            .map(|(user, stats)| UserSummary {
                user,
                stats: *stats,
                backlog_pkts: self.backlog[user].pkts,
                backlog_bytes: self.backlog[user].bytes,
                mean_response_ms: self.response[user].mean_ms(),
                max_response_ms: self.response[user].max.as_nanos() as f64 / 1e6,
            })
            .collect();

        let all = self.response.iter().fold(ResponseStats::default(), |mut acc, r| {
            acc.count += r.count;
            acc.total += r.total;
            acc.max = acc.max.max(r.max);
            acc
        });

        let mean_throughput = if self.slots == 0 {
            0.0
        } else {
            self.total_bytes as f64 / self.slots as f64
        };

        Summary {
            slots: self.slots,
            sim_time_s: elapsed.as_secs_f64(),
            total_bytes: self.total_bytes,
            mean_throughput,
            max_throughput: self.max_throughput,
            mean_response_ms: all.mean_ms(),
            users,
            loss,
        }
    }
}

/// 打印最终报表
pub fn print_report(summary: &Summary) {
    let now_str = Local::now().format("%H:%M:%S").to_string();

    println!(
        "\n📊 [{}] timeslots: {}  sim time: {:.3}s",
        now_str, summary.slots, summary.sim_time_s
    );
    println!("---------------------------------------------------------------------------------");
    println!(
        "{:<6} | {:<10} | {:<10} | {:<10} | {:<12} | {:<10} | {:<12}",
        "User", "In(pkts)", "Drop(pkts)", "Out(pkts)", "Out(bytes)", "Backlog", "RespTime(ms)"
    );
    println!("---------------------------------------------------------------------------------");

    for u in &summary.users {
        println!(
            "{:<6} | {:<10} | {:<10} | {:<10} | {:<12} | {:<10} | {:<12.3}",
            u.user,
            u.stats.in_pkts,
            u.stats.drop_pkts,
            u.stats.out_pkts,
            u.stats.out_bytes,
            u.backlog_pkts,
            u.mean_response_ms
        );
    }

    println!("---------------------------------------------------------------------------------");
    println!(
        "throughput: {:.2} B/slot (max {})  total: {} B  response: {:.3} ms",
        summary.mean_throughput,
        summary.max_throughput,
        summary.total_bytes,
        summary.mean_response_ms
    );
    match summary.loss.loss_rate {
        Some(rate) => println!(
            "packet loss: {:.3}% ({} lost / {} accepted)",
            rate, summary.loss.lost, summary.loss.accepted
        ),
        None => println!("packet loss: n/a (unbounded queues)"),
    }
    println!("=================================================================================\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{frame::Grant, packet::Packet};

    fn frame_with(slot: u64, served: Vec<Packet>) -> Frame {
        let total_bytes = served.iter().map(|p| p.size as u64).sum();
        Frame {
            slot,
            capacity_rbs: 25,
            remaining_rbs: 20,
            grants: vec![Grant {
                user: 0,
                level: 15,
                bytes_per_rb: 93,
                bytes: total_bytes,
                rbs: 5,
                served,
            }],
            total_bytes,
        }
    }

    fn no_loss() -> LossReport {
        LossReport {
            lost: 0,
            accepted: 0,
            loss_rate: None,
        }
    }

    #[test]
    fn backlog_follows_admissions_and_service() {
        let mut m = Monitor::new(1, 0);
        m.record_admission(0, 100, true);
        m.record_admission(0, 50, true);
        m.record_admission(0, 70, false);

        m.record_frame(Duration::ZERO, &frame_with(0, vec![Packet::new(0, 100, Duration::ZERO)]));

        let s = m.summary(Duration::from_millis(1), no_loss());
        let u = &s.users[0];
        assert_eq!(u.stats.in_pkts, 2);
        assert_eq!(u.stats.drop_pkts, 1);
        assert_eq!(u.stats.out_pkts, 1);
        assert_eq!((u.backlog_pkts, u.backlog_bytes), (1, 50));
    }

    #[test]
    fn throughput_is_averaged_per_slot() {
        let mut m = Monitor::new(1, 2);
        m.record_frame(Duration::ZERO, &frame_with(0, vec![Packet::new(0, 30, Duration::ZERO)]));
        m.record_frame(Duration::ZERO, &frame_with(1, vec![]));
        m.record_frame(Duration::ZERO, &frame_with(2, vec![Packet::new(0, 60, Duration::ZERO)]));

        let s = m.summary(Duration::from_millis(3), no_loss());
        assert_eq!(s.slots, 3);
        assert_eq!(s.total_bytes, 90);
        assert_eq!(s.mean_throughput, 30.0);
        assert_eq!(s.max_throughput, 60);
    }

    #[test]
    fn response_times_average_per_user_and_overall() {
        let mut m = Monitor::new(2, 0);
        m.record_delivery(0, Duration::from_millis(2));
        m.record_delivery(0, Duration::from_millis(4));
        m.record_delivery(1, Duration::from_millis(9));

        let s = m.summary(Duration::ZERO, no_loss());
        assert_eq!(s.users[0].mean_response_ms, 3.0);
        assert_eq!(s.users[0].max_response_ms, 4.0);
        assert_eq!(s.users[1].mean_response_ms, 9.0);
        assert_eq!(s.mean_response_ms, 5.0);
    }

    #[test]
    fn empty_run_has_zero_throughput() {
        let m = Monitor::new(3, 10);
        let s = m.summary(Duration::ZERO, no_loss());
        assert_eq!(s.mean_throughput, 0.0);
        assert_eq!(s.users.len(), 3);
    }
}
