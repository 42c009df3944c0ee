use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Binomial, Distribution};

use crate::{
    config::CqiProfile,
    cqi::{CqiLevel, CqiReport, MAX_CQI, MIN_CQI},
    error::ConfigError,
    packet::{Packet, SimTime, UserId},
};

#[derive(Debug)]
enum CqiDraw {
    Uniform { min: CqiLevel, max: CqiLevel },
    Binomial(Binomial),
}

/// 终端：应答 CQI 请求，接收基站下发的数据包
#[derive(Debug)]
pub struct Cellular {
    id: UserId,
    draw: CqiDraw,
    rng: StdRng,
    received_pkts: u64,
    received_bytes: u64,
}

impl Cellular {
    pub fn new(id: UserId, profile: &CqiProfile, seed: u64) -> Result<Self, ConfigError> {
        let draw = match profile {
            CqiProfile::Uniform { min, max } => CqiDraw::Uniform {
                min: *min,
                max: *max,
            },
            CqiProfile::Binomial { probabilities } => {
                let Some(&p) = probabilities.get(id % probabilities.len().max(1)) else {
                    return Err(ConfigError::InvalidCqiProfile(
                        "binomial profile needs at least one probability".to_string(),
                    ));
                };
                let trials = (MAX_CQI - MIN_CQI) as u64;
                let binomial = Binomial::new(trials, p)
                    .map_err(|e| ConfigError::InvalidCqiProfile(e.to_string()))?;
                CqiDraw::Binomial(binomial)
            }
        };
        Ok(Self {
            id,
            draw,
            rng: StdRng::seed_from_u64(seed),
            received_pkts: 0,
            received_bytes: 0,
        })
    }

    pub fn report(&mut self, slot: u64) -> CqiReport {
        let level = match &self.draw {
            CqiDraw::Uniform { min, max } => self.rng.random_range(*min..=*max),
            CqiDraw::Binomial(b) => MIN_CQI + b.sample(&mut self.rng) as CqiLevel,
        };
        CqiReport {
            user: self.id,
            level,
            slot,
        }
    }

    /// 收到下发的包，返回响应时间 (从进入基站到送达)
    pub fn deliver(&mut self, now: SimTime, pkt: &Packet) -> SimTime {
        self.received_pkts += 1;
        self.received_bytes += pkt.size as u64;
        now.saturating_sub(pkt.timestamp)
    }

    pub fn received(&self) -> (u64, u64) {
        (self.received_pkts, self.received_bytes)
    }
}
