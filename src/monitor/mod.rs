// src/monitor/mod.rs
//! 监控模块：请求日志 / 请求速率 / 在线观看者 / 主机指标 / 快照
//!
//! 三个跟踪器（`RequestLog`、`RateSeries`、`ViewerRegistry`）放在同一把锁后面，
//! 请求只经 `Monitor::ingest` 写入，连接只经 `connect` / `disconnect` 增删，
//! 读取只走 `Monitor::snapshot`，这样一次快照看到的三份数据总是同一时刻的。
mod request_log;
mod rate;
mod viewer;
pub mod metrics;
pub mod snapshot;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, atomic::{AtomicU64, Ordering}};
use std::collections::{BTreeMap, VecDeque};
use chrono::{DateTime, Local};

pub use request_log::RequestLog;
pub use rate::{RatePoint, RateSeries};
pub use viewer::ViewerRegistry;
pub use metrics::{HostSample, HostSampler, SystemSampler};
pub use snapshot::{Snapshot, SystemInfo};

/// 请求日志容量
pub const REQUEST_LOG_CAPACITY: usize = 100;
/// 速率序列保留的秒数
pub const RATE_SERIES_CAPACITY: usize = 60;
/// 计算当前 RPS 时取最近几个桶
pub const RATE_WINDOW: usize = 5;
/// 快照里带的最近请求条数
pub const RECENT_REQUESTS: usize = 10;

pub const UNKNOWN_ADDRESS: &str = "unknown";
pub const UNKNOWN_AGENT: &str = "Unknown";

/// 单条入站请求记录
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRecord {
    pub source_address: String,
    pub user_agent: String,
    pub timestamp: DateTime<Local>,
    pub path: String,
}

impl RequestRecord {
    /// 缺失的地址 / UA 用占位值代替，不让请求失败
    pub fn new(
        source_address: Option<String>,
        user_agent: Option<String>,
        path: impl Into<String>,
        timestamp: DateTime<Local>,
    ) -> Self {
        RequestRecord {
            source_address: source_address
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string()),
            user_agent: user_agent
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_AGENT.to_string()),
            timestamp,
            path: path.into(),
        }
    }
}

/// 一个在线的实时观看者
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerSession {
    pub session_id: u64,
    pub source_address: String,
    pub user_agent: String,
    pub last_seen: DateTime<Local>,
    pub last_path: String,
}

/// 三个跟踪器，共用一把锁
#[derive(Debug, Default)]
pub struct Trackers {
    pub requests: RequestLog,
    pub rates: RateSeries,
    pub viewers: ViewerRegistry,
}

/// 监控系统主结构，由服务上下文持有并注入到中间件和调度器
#[derive(Clone)]
pub struct Monitor {
    trackers: Arc<Mutex<Trackers>>,
    next_session: Arc<AtomicU64>,
}

impl Default for Monitor {
    fn default() -> Self {
        Monitor::new()
    }
}

impl Monitor {
    pub fn new() -> Self {
        Monitor {
            trackers: Arc::new(Mutex::new(Trackers::default())),
            next_session: Arc::new(AtomicU64::new(1)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Trackers> {
        self.trackers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 入站 HTTP 请求的唯一写入口：日志和速率在同一个临界区内更新
    pub fn ingest(&self, record: RequestRecord) {
        let mut trackers = self.lock();
        trackers.rates.record(record.timestamp.timestamp());
        trackers.requests.record(record);
    }

    /// 新的实时连接：分配会话 ID 并登记为观看者。
    /// 推送通道的握手不计入请求日志和速率。
    pub fn connect(&self, record: RequestRecord) -> u64 {
        let id = self.next_session.fetch_add(1, Ordering::SeqCst);
        self.lock().viewers.upsert(
            id,
            &record.source_address,
            &record.user_agent,
            &record.path,
            record.timestamp,
        );
        id
    }

    /// 观看者有活动时刷新 last_seen
    pub fn touch(&self, id: u64) -> bool {
        self.lock().viewers.touch(id, Local::now())
    }

    pub fn disconnect(&self, id: u64) -> bool {
        self.lock().viewers.remove(id)
    }

    pub fn viewers(&self) -> Vec<ViewerSession> {
        self.lock().viewers.all()
    }

    pub fn recent_requests(&self, n: usize) -> Vec<RequestRecord> {
        self.lock().requests.recent(n)
    }

    pub fn rate_series(&self) -> Vec<RatePoint> {
        self.lock().rates.series()
    }

    pub fn current_rate(&self) -> f64 {
        self.lock().rates.current_rate()
    }

    /// 用一份主机采样加上跟踪器当前内容组装快照（只读）
    pub fn snapshot(&self, host: HostSample) -> Snapshot {
        let trackers = self.lock();
        Snapshot::capture(host, &trackers, Local::now())
    }
}
