// src/monitor/snapshot.rs
//! 快照：一次采样 + 跟踪器摘要，构造后不再变化。
//! 推送给浏览器的 JSON 结构（`SystemInfo`）在这里由原始数值派生。

use super::*;
use chrono::TimeZone;
use serde::Serialize;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const LABEL_FORMAT: &str = "%H:%M:%S";

/// 推送事件名
pub const SYSTEM_INFO_EVENT: &str = "systemInfo";

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub host: HostSample,
    pub viewers: Vec<ViewerSession>,
    /// 最近的请求，最新的在前
    pub recent_requests: Vec<RequestRecord>,
    /// 速率序列，最老的在前
    pub rate_series: Vec<RatePoint>,
    pub current_rps: f64,
    /// 组装时刻，随消息以 `sampledAt` 发出
    pub taken_at: DateTime<Local>,
}

impl Snapshot {
    /// 从跟踪器拷贝一份数据，之后跟踪器的变化不会影响快照
    pub fn capture(host: HostSample, trackers: &Trackers, taken_at: DateTime<Local>) -> Self {
        Snapshot {
            host,
            viewers: trackers.viewers.all(),
            recent_requests: trackers.requests.recent(RECENT_REQUESTS),
            rate_series: trackers.rates.series(),
            current_rps: trackers.rates.current_rate(),
            taken_at,
        }
    }

    pub fn uptime(&self) -> Uptime {
        Uptime {
            hours: self.host.uptime_secs / 3600,
            minutes: (self.host.uptime_secs % 3600) / 60,
        }
    }

    /// 派生出推送给浏览器的消息
    pub fn to_system_info(&self) -> SystemInfo {
        SystemInfo {
            cpu_count: self.host.cpu_count,
            cpu_usage: format!("{:.2}", self.host.cpu_usage_percent),
            total_memory: format!("{:.2}", self.host.total_memory_bytes as f64 / BYTES_PER_GB),
            free_memory: format!("{:.2}", self.host.free_memory_bytes as f64 / BYTES_PER_GB),
            memory_usage: format!("{:.2}", self.host.process_memory_bytes as f64 / BYTES_PER_MB),
            uptime: self.uptime(),
            connected_clients: self
                .viewers
                .iter()
                .map(|v| ClientView {
                    ip: v.source_address.clone(),
                    user_agent: v.user_agent.clone(),
                    last_seen: v.last_seen.format(TIMESTAMP_FORMAT).to_string(),
                    url: v.last_path.clone(),
                })
                .collect(),
            request_history: self
                .recent_requests
                .iter()
                .map(|r| RequestView {
                    timestamp: r.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                    ip: r.source_address.clone(),
                    user_agent: r.user_agent.clone(),
                    url: r.path.clone(),
                })
                .collect(),
            request_rate_data: RateData {
                labels: self.rate_series.iter().map(|p| second_label(p.second)).collect(),
                values: self.rate_series.iter().map(|p| p.count).collect(),
                current_rps: format!("{:.2}", self.current_rps),
            },
            sampled_at: self.taken_at.format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    /// 编码成推送帧：`{"event":"systemInfo","data":{...}}`
    pub fn encode_event(&self) -> anyhow::Result<String> {
        let envelope = Envelope {
            event: SYSTEM_INFO_EVENT,
            data: self.to_system_info(),
        };
        Ok(serde_json::to_string(&envelope)?)
    }
}

fn second_label(second: i64) -> String {
    Local
        .timestamp_opt(second, 0)
        .single()
        .map(|t| t.format(LABEL_FORMAT).to_string())
        .unwrap_or_else(|| second.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Uptime {
    pub hours: u64,
    pub minutes: u64,
}

/// 推送消息
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub cpu_count: usize,
    pub cpu_usage: String,
    /// GB
    pub total_memory: String,
    /// GB
    pub free_memory: String,
    /// 进程内存，MB
    pub memory_usage: String,
    pub uptime: Uptime,
    pub connected_clients: Vec<ClientView>,
    pub request_history: Vec<RequestView>,
    pub request_rate_data: RateData,
    pub sampled_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientView {
    pub ip: String,
    pub user_agent: String,
    pub last_seen: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestView {
    pub timestamp: String,
    pub ip: String,
    pub user_agent: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateData {
    pub labels: Vec<String>,
    pub values: Vec<u64>,
    #[serde(rename = "currentRPS")]
    pub current_rps: String,
}

#[derive(Serialize)]
struct Envelope {
    event: &'static str,
    data: SystemInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> HostSample {
        HostSample {
            cpu_count: 8,
            cpu_usage_percent: 12.346,
            total_memory_bytes: 16 * 1024 * 1024 * 1024,
            free_memory_bytes: 4 * 1024 * 1024 * 1024 + 512 * 1024 * 1024,
            process_memory_bytes: 42 * 1024 * 1024,
            uptime_secs: 3 * 3600 + 25 * 60 + 59,
        }
    }

    fn record(path: &str, secs: i64) -> RequestRecord {
        RequestRecord::new(
            Some("10.0.0.1".into()),
            Some("agent".into()),
            path,
            Local.timestamp_opt(secs, 0).unwrap(),
        )
    }

    // 派生字段：GB / MB 两位小数，uptime 拆成小时和分钟
    #[test]
    fn test_derived_fields() {
        let trackers = Trackers::default();
        let snapshot = Snapshot::capture(host(), &trackers, Local::now());
        let info = snapshot.to_system_info();

        assert_eq!(info.cpu_count, 8);
        assert_eq!(info.cpu_usage, "12.35");
        assert_eq!(info.total_memory, "16.00");
        assert_eq!(info.free_memory, "4.50");
        assert_eq!(info.memory_usage, "42.00");
        assert_eq!(info.uptime, Uptime { hours: 3, minutes: 25 });
        assert_eq!(info.request_rate_data.current_rps, "0.00");
        assert!(info.request_history.is_empty());
    }

    // 快照构造后修改跟踪器，不影响快照
    #[test]
    fn test_snapshot_is_detached() {
        let mut trackers = Trackers::default();
        trackers.requests.record(record("/a", 1_700_000_000));
        trackers.rates.record(1_700_000_000);

        let snapshot = Snapshot::capture(host(), &trackers, Local::now());
        let before = snapshot.clone();

        for i in 0..20 {
            trackers.requests.record(record("/b", 1_700_000_001 + i));
            trackers.rates.record(1_700_000_001 + i);
        }
        trackers.viewers.upsert(1, "10.0.0.2", "agent", "/ws", Local::now());

        assert_eq!(snapshot, before);
        assert_eq!(snapshot.recent_requests.len(), 1);
        assert_eq!(snapshot.rate_series.len(), 1);
        assert!(snapshot.viewers.is_empty());
    }

    // 请求历史最多 10 条，最新在前
    #[test]
    fn test_request_history_window() {
        let mut trackers = Trackers::default();
        for i in 0..15 {
            trackers.requests.record(record(&format!("/{}", i), 1_700_000_000 + i));
        }
        let info = Snapshot::capture(host(), &trackers, Local::now()).to_system_info();
        assert_eq!(info.request_history.len(), RECENT_REQUESTS);
        assert_eq!(info.request_history[0].url, "/14");
        assert_eq!(info.request_history[9].url, "/5");
    }

    // JSON 字段名与浏览器端脚本约定一致
    #[test]
    fn test_event_encoding() {
        let mut trackers = Trackers::default();
        trackers.rates.record(1_700_000_000);
        trackers.requests.record(record("/", 1_700_000_000));
        trackers.viewers.upsert(5, "10.0.0.3", "agent", "/ws", Local::now());

        let taken_at = Local.timestamp_opt(1_700_000_030, 0).unwrap();
        let snapshot = Snapshot::capture(host(), &trackers, taken_at);
        let v: serde_json::Value = serde_json::from_str(&snapshot.encode_event().unwrap()).unwrap();

        assert_eq!(v["event"], SYSTEM_INFO_EVENT);
        let data = &v["data"];
        assert_eq!(data["cpuCount"], 8);
        assert_eq!(data["uptime"]["hours"], 3);
        assert_eq!(data["connectedClients"][0]["ip"], "10.0.0.3");
        assert_eq!(data["requestHistory"][0]["url"], "/");
        assert_eq!(data["requestRateData"]["values"][0], 1);
        assert_eq!(data["requestRateData"]["currentRPS"], "1.00");
        assert_eq!(data["requestRateData"]["labels"].as_array().unwrap().len(), 1);
        assert_eq!(data["sampledAt"], taken_at.format("%Y-%m-%d %H:%M:%S").to_string());
    }
}
