// src/main.rs
use anyhow::Result;
use clap::Parser;
use std::{path::PathBuf, sync::Arc};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crab_pulse::{broadcast::Broadcaster, config, monitor::{Monitor, SystemSampler}, server};

/// 实时服务器状态面板
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// JSON 配置文件，不存在时写入默认配置
    #[arg(short, long, default_value = "crab-pulse.json")]
    config: PathBuf,
    /// 监听端口，优先级高于配置文件和 PORT
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env 不存在也没关系
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let fresh = !cli.config.exists();
    let mut cfg = config::load(&cli.config)?;
    cfg.apply_env(|key| std::env::var(key).ok())?;
    if let Some(port) = cli.port {
        cfg.port = port;
    }
    cfg.validate()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    if fresh {
        info!(path = ?cli.config, "default config created");
    }

    // 跟踪器和采样器由这里持有，再注入调度器和路由
    let monitor = Monitor::new();
    let sampler = Arc::new(SystemSampler::new(cfg.cpu_sample_window())?);
    let broadcaster = Arc::new(Broadcaster::new(monitor, sampler, cfg.broadcast_interval()));

    let scheduler = tokio::spawn(broadcaster.clone().run());

    server::start(&cfg, broadcaster, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;

    scheduler.abort();
    info!("server stopped");
    Ok(())
}
