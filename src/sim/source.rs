use std::time::Duration;

use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Exp};
use tracing::trace;

use crate::{
    config::{PacketSizeDist, SourceConfig},
    error::ConfigError,
    packet::{Packet, SimTime, UserId},
};

// ==========================================
// 泊松到达的发包源，一个用户一个
// ==========================================
#[derive(Debug)]
pub struct Source {
    owner: UserId,
    inter_arrival: Exp<f64>,
    size: PacketSizeDist,
    rng: StdRng,
    emitted: u64,
}

impl Source {
    pub fn new(owner: UserId, config: &SourceConfig, seed: u64) -> Result<Self, ConfigError> {
        let rate = config.arrival_rate;
        let inter_arrival = Exp::new(rate).map_err(|_| ConfigError::InvalidArrivalRate(rate))?;
        Ok(Self {
            owner,
            inter_arrival,
            size: config.packet_size,
            rng: StdRng::seed_from_u64(seed),
            emitted: 0,
        })
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// 下一次发包的时刻；间隔大到装不下时饱和到 `Duration::MAX`
    pub fn next_arrival(&mut self, now: SimTime) -> SimTime {
        let gap = self.inter_arrival.sample(&mut self.rng);
        let gap = Duration::try_from_secs_f64(gap).unwrap_or(Duration::MAX);
        now.saturating_add(gap)
    }

    pub fn emit(&mut self, now: SimTime) -> Packet {
        let size = match self.size {
            PacketSizeDist::Uniform { max } => self.rng.random_range(1..=max),
            PacketSizeDist::Fixed { size } => size,
        };
        self.emitted += 1;
        trace!(owner = self.owner, size, ?now, "packet emitted");
        Packet::new(self.owner, size, now)
    }
}
