// src/monitor/metrics.rs
//! 主机指标采样

use anyhow::{Context, Result, anyhow, bail};
use futures::future::BoxFuture;
use sysinfo::{Pid, System, MINIMUM_CPU_UPDATE_INTERVAL};
use tokio::sync::Mutex;
use tokio::time::Duration;
use tracing::debug;

/// 一次采样得到的原始主机数据，所有字段来自同一次采样
#[derive(Debug, Clone, PartialEq)]
pub struct HostSample {
    /// 逻辑 CPU 数
    pub cpu_count: usize,
    /// 采样窗口内的平均 CPU 占用（0-100）
    pub cpu_usage_percent: f64,
    pub total_memory_bytes: u64,
    pub free_memory_bytes: u64,
    /// 当前进程常驻内存
    pub process_memory_bytes: u64,
    pub uptime_secs: u64,
}

/// 指标来源。采样可能需要等待一个短窗口，调用方按异步操作对待。
/// 失败时整体返回错误，不给出半成品。
pub trait HostSampler: Send + Sync {
    fn sample(&self) -> BoxFuture<'_, Result<HostSample>>;
}

/// 基于 sysinfo 的采样器
///
/// 内部的 `System` 放在异步锁里，整个采样窗口都持有它，
/// 所以并发的采样请求会排队，不会互相打乱 CPU 的两次读数。
pub struct SystemSampler {
    system: Mutex<System>,
    pid: Pid,
    window: Duration,
}

impl SystemSampler {
    pub fn new(window: Duration) -> Result<Self> {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| anyhow!("cannot resolve current pid: {}", e))?;

        Ok(SystemSampler {
            system: Mutex::new(System::new()),
            pid,
            window: window.max(MINIMUM_CPU_UPDATE_INTERVAL),
        })
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    async fn sample_host(&self) -> Result<HostSample> {
        let mut sys = self.system.lock().await;

        // CPU 占用需要两次读数之间的差值
        sys.refresh_cpu_usage();
        tokio::time::sleep(self.window).await;
        sys.refresh_cpu_usage();
        sys.refresh_memory();

        if !sys.refresh_process(self.pid) {
            bail!("process {} not visible to sampler", self.pid);
        }
        let process_memory_bytes = sys
            .process(self.pid)
            .map(|p| p.memory())
            .with_context(|| format!("process {} disappeared during sampling", self.pid))?;

        let cpu_count = sys.cpus().len();
        if cpu_count == 0 {
            bail!("host reported no cpus");
        }
        let total_memory_bytes = sys.total_memory();
        if total_memory_bytes == 0 {
            bail!("host reported zero total memory");
        }

        let sample = HostSample {
            cpu_count,
            cpu_usage_percent: f64::from(sys.global_cpu_info().cpu_usage()),
            total_memory_bytes,
            free_memory_bytes: sys.available_memory(),
            process_memory_bytes,
            uptime_secs: System::uptime(),
        };
        debug!(?sample, "host sampled");
        Ok(sample)
    }
}

impl HostSampler for SystemSampler {
    fn sample(&self) -> BoxFuture<'_, Result<HostSample>> {
        Box::pin(self.sample_host())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_system_sample() {
        let sampler = SystemSampler::new(Duration::from_millis(250)).unwrap();
        let sample = sampler.sample().await.unwrap();
        assert!(sample.cpu_count > 0);
        assert!(sample.total_memory_bytes > 0);
        assert!(sample.free_memory_bytes <= sample.total_memory_bytes);
        assert!(sample.process_memory_bytes > 0);
        assert!((0.0..=100.0 * sample.cpu_count as f64).contains(&sample.cpu_usage_percent));
    }

    // 窗口不会小于 sysinfo 要求的最小间隔
    #[test]
    fn test_window_floor() {
        let sampler = SystemSampler::new(Duration::from_millis(1)).unwrap();
        assert_eq!(sampler.window(), MINIMUM_CPU_UPDATE_INTERVAL);
    }
}
