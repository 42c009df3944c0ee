use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::{
    antenna::{Admission, Antenna, TimeslotState},
    config::SimConfig,
    cqi::CqiReport,
    error::{ConfigError, SchedulerError},
    monitor::{Monitor, Summary},
    packet::{Packet, SimTime, UserId},
    sim::{Cellular, EventQueue, Source, stream_seed},
};

const SOURCE_STREAM: u64 = 1;
const CELLULAR_STREAM: u64 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    TimeslotTick,
    CqiRequest { user: UserId, slot: u64 },
    CqiReport(CqiReport),
    SourceFire { source: usize },
    PacketArrival(Packet),
    Delivery(Packet),
}

// ==========================================
// 仿真引擎：单线程，逐个事件推进
// ==========================================
pub struct Simulation {
    now: SimTime,
    end: SimTime,
    events: EventQueue<Event>,
    antenna: Antenna,
    sources: Vec<Source>,
    cellulars: Vec<Cellular>,
    monitor: Monitor,
}

impl Simulation {
    pub fn new(config: &SimConfig) -> Result<Self, ConfigError> {
        let antenna = Antenna::new(config)?;

        let sources = (0..config.population)
            .map(|id| Source::new(id, &config.source, stream_seed(config.seed, SOURCE_STREAM, id)))
            .collect::<Result<Vec<_>, _>>()?;
        let cellulars = (0..config.population)
            .map(|id| Cellular::new(id, &config.cqi, stream_seed(config.seed, CELLULAR_STREAM, id)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut sim = Self {
            now: Duration::ZERO,
            end: config.duration()?,
            events: EventQueue::new(),
            antenna,
            sources,
            cellulars,
            monitor: Monitor::new(config.population, config.report_interval_slots),
        };

        sim.events.schedule(Duration::ZERO, Event::TimeslotTick);
        for id in 0..sim.sources.len() {
            let first = sim.sources[id].next_arrival(Duration::ZERO);
            sim.events.schedule(first, Event::SourceFire { source: id });
        }
        Ok(sim)
    }

    /// 处理下一个事件；到达结束时刻或事件表为空时返回 false
    pub fn step(&mut self) -> Result<bool, SchedulerError> {
        match self.events.peek_time() {
            Some(at) if at <= self.end => {}
            _ => return Ok(false),
        }
        let Some((at, event)) = self.events.pop() else {
            return Ok(false);
        };
        self.now = at;
        self.dispatch(event)?;
        Ok(true)
    }

    #[instrument(name = "simulation", skip(self), fields(end = ?self.end))]
    pub fn run(&mut self) -> Result<Summary, SchedulerError> {
        info!(population = self.antenna.population(), "simulation started");
        while self.step()? {}
        let summary = self.summary();
        let emitted: u64 = self.sources.iter().map(Source::emitted).sum();
        let delivered: u64 = self.cellulars.iter().map(|c| c.received().1).sum();
        let (backlog_pkts, backlog_bytes) = self.antenna.backlog();
        info!(
            slots = summary.slots,
            total_bytes = summary.total_bytes,
            emitted,
            delivered,
            backlog_pkts,
            backlog_bytes,
            "simulation finished"
        );
        Ok(summary)
    }

    pub fn summary(&self) -> Summary {
        self.monitor.summary(self.now, self.antenna.loss_report())
    }

    fn dispatch(&mut self, event: Event) -> Result<(), SchedulerError> {
        let now = self.now;
        match event {
            Event::TimeslotTick => {
                let slot = self.antenna.on_timeslot_tick(now)?;
                for user in 0..self.antenna.population() {
                    self.events.schedule(now, Event::CqiRequest { user, slot });
                }
            }
            Event::CqiRequest { user, slot } => {
                if let Some(ue) = self.cellulars.get_mut(user) {
                    let report = ue.report(slot);
                    self.events.schedule(now, Event::CqiReport(report));
                }
            }
            Event::CqiReport(report) => {
                if self.antenna.report_quality(report)? != TimeslotState::FrameReady {
                    return Ok(());
                }
                let Some(frame) = self.antenna.take_frame(now) else {
                    return Ok(());
                };
                self.monitor.record_frame(now, &frame);
                for pkt in frame.into_served() {
                    self.events.schedule(now, Event::Delivery(pkt));
                }
                let next = now.saturating_add(self.antenna.timeslot());
                self.events.schedule(next, Event::TimeslotTick);
            }
            Event::SourceFire { source } => {
                let Some(src) = self.sources.get_mut(source) else {
                    return Ok(());
                };
                let pkt = src.emit(now);
                let next = src.next_arrival(now);
                self.events.schedule(now, Event::PacketArrival(pkt));
                self.events.schedule(next, Event::SourceFire { source });
            }
            Event::PacketArrival(pkt) => {
                let (user, size) = (pkt.owner, pkt.size);
                let admission = self.antenna.receive_packet(pkt)?;
                self.monitor
                    .record_admission(user, size, admission == Admission::Accepted);
            }
            Event::Delivery(pkt) => {
                if let Some(ue) = self.cellulars.get_mut(pkt.owner) {
                    let rt = ue.deliver(now, &pkt);
                    self.monitor.record_delivery(pkt.owner, rt);
                    debug!(user = pkt.owner, size = pkt.size, response = ?rt, "packet delivered");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
impl Simulation {
    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn antenna(&self) -> &Antenna {
        &self.antenna
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn cellulars(&self) -> &[Cellular] {
        &self.cellulars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CqiProfile, PacketSizeDist, QueueMode, SourceConfig};
    use crate::queue::PacketQueue;

    fn small_config() -> SimConfig {
        SimConfig {
            population: 4,
            timeslot_ms: 1.0,
            duration_s: 0.5,
            seed: 17,
            report_interval_slots: 0,
            ..SimConfig::default()
        }
    }

    #[test]
    fn first_tick_fires_at_zero_and_slots_follow_timeslot() {
        let mut sim = Simulation::new(&small_config()).unwrap();
        let summary = sim.run().unwrap();

        // t = 0, 1ms, ..., 500ms
        assert_eq!(summary.slots, 501);
        assert!(sim.now() <= Duration::from_millis(500));
    }

    #[test]
    fn same_seed_reproduces_the_run() {
        let a = Simulation::new(&small_config()).unwrap().run().unwrap();
        let b = Simulation::new(&small_config()).unwrap().run().unwrap();
        assert_eq!(a, b);

        let mut other = small_config();
        other.seed = 18;
        let c = Simulation::new(&other).unwrap().run().unwrap();
        assert_ne!(a.total_bytes, c.total_bytes);
    }

    #[test]
    fn bounded_queues_account_every_packet() {
        let config = SimConfig {
            queue: QueueMode::Bounded { capacity: 2 },
            source: SourceConfig {
                arrival_rate: 20_000.0,
                packet_size: PacketSizeDist::Uniform { max: 200 },
            },
            ..small_config()
        };
        let mut sim = Simulation::new(&config).unwrap();
        let summary = sim.run().unwrap();

        let emitted: u64 = sim.sources().iter().map(|s| s.emitted()).sum();
        let loss = summary.loss;
        // 最后一个时刻发出的包可能还没处理，所以只能 <=
        assert!(loss.lost + loss.accepted <= emitted);
        assert!(loss.lost > 0);
        assert!(loss.accepted > 0);
        assert!(loss.loss_rate.is_some_and(|r| r > 0.0 && r < 100.0));

        for user in 0..config.population {
            assert!(sim.antenna().queue(user).is_some_and(|q| q.len() <= 2));
        }
        let backlog_pkts: u64 = summary.users.iter().map(|u| u.backlog_pkts).sum();
        let backlog_bytes: u64 = summary.users.iter().map(|u| u.backlog_bytes).sum();
        assert_eq!(sim.antenna().backlog(), (backlog_pkts, backlog_bytes));
    }

    #[test]
    fn tiny_arrival_rate_runs_without_traffic() {
        let config = SimConfig {
            source: SourceConfig {
                arrival_rate: 1e-30,
                ..SourceConfig::default()
            },
            ..small_config()
        };
        assert!(config.validate().is_ok());

        let mut sim = Simulation::new(&config).unwrap();
        let summary = sim.run().unwrap();

        assert_eq!(summary.slots, 501);
        assert_eq!(summary.total_bytes, 0);
        assert_eq!(summary.loss.accepted, 0);
    }

    #[test]
    fn oversized_duration_is_rejected_at_setup() {
        let config = SimConfig {
            duration_s: 1e20,
            ..small_config()
        };
        assert!(matches!(Simulation::new(&config), Err(ConfigError::InvalidDuration(_))));
    }

    #[test]
    fn served_bytes_reach_the_users() {
        let mut sim = Simulation::new(&small_config()).unwrap();
        let summary = sim.run().unwrap();

        let delivered: u64 = sim.cellulars().iter().map(|c| c.received().1).sum();
        let out: u64 = summary.users.iter().map(|u| u.stats.out_bytes).sum();
        assert_eq!(delivered, summary.total_bytes);
        assert_eq!(out, summary.total_bytes);
        assert!(summary.total_bytes > 0);
    }

    #[test]
    fn invalid_cqi_everywhere_serves_nothing() {
        let config = SimConfig {
            cqi: CqiProfile::Uniform { min: 0, max: 0 },
            ..small_config()
        };
        let summary = Simulation::new(&config).unwrap().run().unwrap();

        assert_eq!(summary.total_bytes, 0);
        assert!(summary.slots > 0);
        assert!(summary.users.iter().all(|u| u.stats.out_pkts == 0));
    }

    #[test]
    fn unbounded_queues_never_drop() {
        let config = SimConfig {
            source: SourceConfig {
                arrival_rate: 20_000.0,
                packet_size: PacketSizeDist::Fixed { size: 90 },
            },
            ..small_config()
        };
        let summary = Simulation::new(&config).unwrap().run().unwrap();
        assert_eq!(summary.loss.lost, 0);
        assert_eq!(summary.loss.loss_rate, None);
    }
}
