//! 仿真参数
//!
//! 从 JSON 文件读取，缺省字段回落到 [`SimConfig::default`]，
//! 命令行参数再覆盖其中几项。

use std::{fs::File, io::BufReader, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    cqi::{CqiLevel, MAX_CQI, MIN_CQI},
    error::ConfigError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum QueueMode {
    Unbounded,
    Bounded { capacity: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PacketSizeDist {
    /// 均匀分布 `1..=max`
    Uniform { max: u32 },
    /// 测试模式：每个包都一样大
    Fixed { size: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// 每个 source 的平均发包速率 (包/秒)，到达间隔服从指数分布
    pub arrival_rate: f64,
    pub packet_size: PacketSizeDist,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            arrival_rate: 500.0,
            packet_size: PacketSizeDist::Uniform { max: 75 },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CqiProfile {
    Uniform { min: CqiLevel, max: CqiLevel },
    /// level = 1 + Binomial(14, p)，第 i 个用户取 `probabilities[i % len]`
    Binomial { probabilities: Vec<f64> },
}

impl Default for CqiProfile {
    fn default() -> Self {
        CqiProfile::Uniform {
            min: MIN_CQI,
            max: MAX_CQI,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub population: usize,
    pub timeslot_ms: f64,
    /// 每帧 RB 总数，全局唯一的容量来源
    pub frame_capacity: u32,
    pub queue: QueueMode,
    pub source: SourceConfig,
    pub cqi: CqiProfile,
    pub duration_s: f64,
    pub seed: u64,
    /// 每隔多少个 timeslot 输出一次区间统计，0 表示关闭
    pub report_interval_slots: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            population: 10,
            timeslot_ms: 1.0,
            frame_capacity: 25,
            queue: QueueMode::Unbounded,
            source: SourceConfig::default(),
            cqi: CqiProfile::default(),
            duration_s: 10.0,
            seed: 0,
            report_interval_slots: 1000,
        }
    }
}

impl SimConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: SimConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// 换算不出 `Duration` (负数、NaN、超出范围) 的算非法
    pub fn timeslot(&self) -> Result<Duration, ConfigError> {
        Duration::try_from_secs_f64(self.timeslot_ms / 1000.0)
            .map_err(|_| ConfigError::InvalidTimeslot(self.timeslot_ms))
    }

    pub fn duration(&self) -> Result<Duration, ConfigError> {
        Duration::try_from_secs_f64(self.duration_s)
            .map_err(|_| ConfigError::InvalidDuration(self.duration_s))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population == 0 {
            return Err(ConfigError::InvalidPopulation);
        }
        // 换算成 Duration 后为 0 的也不行，否则时钟不前进
        if self.timeslot_ms <= 0.0 || self.timeslot()?.is_zero() {
            return Err(ConfigError::InvalidTimeslot(self.timeslot_ms));
        }
        if self.frame_capacity == 0 {
            return Err(ConfigError::InvalidFrameCapacity);
        }
        if let QueueMode::Bounded { capacity: 0 } = self.queue {
            return Err(ConfigError::InvalidQueueCapacity);
        }
        let rate = self.source.arrival_rate;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(ConfigError::InvalidArrivalRate(rate));
        }
        match self.source.packet_size {
            PacketSizeDist::Uniform { max: 0 } | PacketSizeDist::Fixed { size: 0 } => {
                return Err(ConfigError::InvalidPacketSize);
            }
            _ => {}
        }
        if self.duration_s <= 0.0 || self.duration()?.is_zero() {
            return Err(ConfigError::InvalidDuration(self.duration_s));
        }
        self.validate_cqi()
    }

    fn validate_cqi(&self) -> Result<(), ConfigError> {
        match &self.cqi {
            CqiProfile::Uniform { min, max } => {
                if min > max {
                    return Err(ConfigError::InvalidCqiProfile(format!(
                        "uniform range {min}..={max} is empty"
                    )));
                }
            }
            CqiProfile::Binomial { probabilities } => {
                if probabilities.is_empty() {
                    return Err(ConfigError::InvalidCqiProfile(
                        "binomial profile needs at least one probability".to_string(),
                    ));
                }
                if let Some(p) = probabilities.iter().find(|p| !(0.0..=1.0).contains(*p)) {
                    return Err(ConfigError::InvalidCqiProfile(format!(
                        "probability {p} is outside [0, 1]"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = SimConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.frame_capacity, 25);
        assert_eq!(cfg.timeslot().unwrap(), Duration::from_millis(1));
    }

    #[test]
    fn parses_partial_json() {
        let json = r#"{
            "population": 4,
            "queue": { "mode": "bounded", "capacity": 8 },
            "source": { "arrival_rate": 100.0, "packet_size": { "kind": "fixed", "size": 20 } },
            "cqi": { "kind": "binomial", "probabilities": [0.2, 0.8] }
        }"#;
        let cfg: SimConfig = serde_json::from_str(json).unwrap();

        assert_eq!(cfg.population, 4);
        assert_eq!(cfg.queue, QueueMode::Bounded { capacity: 8 });
        assert_eq!(cfg.source.packet_size, PacketSizeDist::Fixed { size: 20 });
        assert_eq!(cfg.frame_capacity, 25);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn bundled_configs_load() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("configs");

        let bounded = SimConfig::load(dir.join("bounded.json")).unwrap();
        assert_eq!(bounded.queue, QueueMode::Bounded { capacity: 50 });

        let unbounded = SimConfig::load(dir.join("unbounded.json")).unwrap();
        assert_eq!(unbounded.queue, QueueMode::Unbounded);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            SimConfig::load("/nonexistent/cell_scheduler.json"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn rejects_non_positive_settings() {
        let mut cfg = SimConfig::default();
        cfg.population = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidPopulation)));

        let mut cfg = SimConfig::default();
        cfg.timeslot_ms = 0.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidTimeslot(_))));

        let mut cfg = SimConfig::default();
        cfg.frame_capacity = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidFrameCapacity)));

        let mut cfg = SimConfig::default();
        cfg.queue = QueueMode::Bounded { capacity: 0 };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidQueueCapacity)));

        let mut cfg = SimConfig::default();
        cfg.source.arrival_rate = -1.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidArrivalRate(_))));

        let mut cfg = SimConfig::default();
        cfg.source.packet_size = PacketSizeDist::Uniform { max: 0 };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidPacketSize)));

        let mut cfg = SimConfig::default();
        cfg.duration_s = 0.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidDuration(_))));
    }

    #[test]
    fn rejects_durations_that_do_not_fit() {
        let mut cfg = SimConfig::default();
        cfg.timeslot_ms = 1e25;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidTimeslot(_))));

        let mut cfg = SimConfig::default();
        cfg.timeslot_ms = f64::NAN;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidTimeslot(_))));

        let mut cfg = SimConfig::default();
        cfg.duration_s = 1e20;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidDuration(_))));
        assert!(matches!(cfg.duration(), Err(ConfigError::InvalidDuration(_))));

        let mut cfg = SimConfig::default();
        cfg.duration_s = f64::INFINITY;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidDuration(_))));
    }

    #[test]
    fn tiny_arrival_rate_is_still_valid() {
        let mut cfg = SimConfig::default();
        cfg.source.arrival_rate = 1e-30;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_malformed_cqi_profiles() {
        let mut cfg = SimConfig::default();
        cfg.cqi = CqiProfile::Uniform { min: 9, max: 3 };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidCqiProfile(_))));

        cfg.cqi = CqiProfile::Binomial { probabilities: vec![] };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidCqiProfile(_))));

        cfg.cqi = CqiProfile::Binomial { probabilities: vec![0.5, 1.5] };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidCqiProfile(_))));
    }
}
