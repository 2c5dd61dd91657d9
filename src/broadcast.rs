// src/broadcast.rs
//! 推送调度：
//! - 每个周期采样一次，组装快照，发给所有在线观看者
//! - 新观看者连上时先单独发一份快照，再加入周期推送
//! - 单个观看者发送失败只影响它自己：从登记表中移除，其他人照常收到
//! - 每个观看者的待发队列有上限，积压满了视同连接失效
use anyhow::Result;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, Receiver, Sender, error::TrySendError};
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::monitor::{HostSampler, Monitor, RequestRecord, Snapshot};

/// 单个观看者最多积压的帧数
pub const OUTBOX_CAPACITY: usize = 8;

pub struct Broadcaster {
    monitor: Monitor,
    sampler: Arc<dyn HostSampler>,
    /// 会话 ID -> 该观看者的发送端
    outlets: DashMap<u64, Sender<String>>,
    period: Duration,
}

impl Broadcaster {
    pub fn new(monitor: Monitor, sampler: Arc<dyn HostSampler>, period: Duration) -> Self {
        Broadcaster {
            monitor,
            sampler,
            outlets: DashMap::new(),
            period,
        }
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    /// 采样并组装快照。采样失败整体返回错误。
    pub async fn snapshot(&self) -> Result<Snapshot> {
        let host = self.sampler.sample().await?;
        Ok(self.monitor.snapshot(host))
    }

    /// 新观看者：登记、单独推送首份快照、再加入周期推送。
    /// 发送端在首份快照写入之后才对周期推送可见，保证首份快照先到。
    pub async fn connect(&self, record: RequestRecord) -> (u64, Receiver<String>) {
        let addr = record.source_address.clone();
        let id = self.monitor.connect(record);
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);

        match self.snapshot().await.and_then(|s| s.encode_event()) {
            Ok(payload) => {
                // 接收端还在我们手里，队列也是空的，这里不会失败
                let _ = tx.try_send(payload);
            }
            Err(e) => warn!(session = id, "initial snapshot skipped: {:#}", e),
        }

        self.outlets.insert(id, tx);
        info!(session = id, %addr, "viewer connected");
        (id, rx)
    }

    pub fn disconnect(&self, id: u64) {
        self.outlets.remove(&id);
        if self.monitor.disconnect(id) {
            info!(session = id, "viewer disconnected");
        }
    }

    pub fn viewer_count(&self) -> usize {
        self.outlets.len()
    }

    /// 一次推送周期，返回成功送达的观看者数。
    /// 按登记顺序发送；发送失败或积压已满的观看者在本轮结束后移除。
    /// 发送不等待，慢观看者不会拖住其他人。
    pub async fn tick(&self) -> Result<usize> {
        let snapshot = self.snapshot().await?;
        let payload = snapshot.encode_event()?;

        let mut delivered = 0;
        let mut failed = Vec::new();
        for viewer in &snapshot.viewers {
            let Some(outlet) = self.outlets.get(&viewer.session_id) else {
                continue;
            };
            match outlet.try_send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => failed.push((viewer.session_id, "outbox full")),
                Err(TrySendError::Closed(_)) => failed.push((viewer.session_id, "channel closed")),
            }
        }

        for (id, reason) in failed {
            warn!(session = id, reason, "delivery failed, dropping viewer");
            self.disconnect(id);
        }

        debug!(delivered, "tick broadcast");
        Ok(delivered)
    }

    /// 周期推送循环，随进程存活。
    /// 上一轮没结束时下一轮不会开始；错过的周期直接跳过。
    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period_ms = self.period.as_millis() as u64, "broadcast scheduler started");

        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                warn!("tick skipped: {:#}", e);
            }
        }
    }
}
