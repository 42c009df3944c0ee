use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::Parser;
use tracing::{error, info};

mod antenna;
mod config;
mod cqi;
mod error;
mod frame;
mod logging;
mod monitor;
mod packet;
mod queue;
mod sim;

use crate::{
    config::{QueueMode, SimConfig},
    error::SimError,
    monitor::Summary,
    sim::Simulation,
};

/// 机会式蜂窝调度仿真：按 CQI 从高到低给用户分配 RB
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct ProgArgs {
    /// JSON 配置文件，缺省时使用内置默认值
    #[clap(value_parser)]
    config: Option<PathBuf>,
    #[clap(long)]
    population: Option<usize>,
    /// 每帧 RB 数
    #[clap(long)]
    frame_capacity: Option<u32>,
    /// 设置后切换为有界队列
    #[clap(long)]
    queue_capacity: Option<usize>,
    /// 仿真时长 (秒)
    #[clap(long)]
    duration: Option<f64>,
    #[clap(long)]
    seed: Option<u64>,
    /// 把汇总结果写成 JSON
    #[clap(long)]
    output: Option<PathBuf>,
    #[clap(long, default_value = "info")]
    log_level: String,
}

impl ProgArgs {
    fn load_config(&self) -> Result<SimConfig, SimError> {
        let mut config = match &self.config {
            Some(path) => SimConfig::load(path)?,
            None => SimConfig::default(),
        };
        if let Some(population) = self.population {
            config.population = population;
        }
        if let Some(frame_capacity) = self.frame_capacity {
            config.frame_capacity = frame_capacity;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue = QueueMode::Bounded { capacity };
        }
        if let Some(duration) = self.duration {
            config.duration_s = duration;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        config.validate()?;
        Ok(config)
    }
}

fn write_summary(path: &Path, summary: &Summary) -> Result<(), SimError> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, summary)?;
    Ok(())
}

fn run(args: &ProgArgs) -> Result<(), SimError> {
    let config = args.load_config()?;
    info!(?config, "configuration loaded");

    let mut sim = Simulation::new(&config)?;
    let summary = sim.run()?;

    monitor::print_report(&summary);
    if let Some(path) = &args.output {
        write_summary(path, &summary)?;
        info!(path = %path.display(), "summary written");
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = ProgArgs::parse();
    logging::init_logging(&args.log_level);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
