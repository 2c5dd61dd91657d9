// src/monitor/request_log.rs

use super::*;

/// 定长请求日志：新记录追加到尾部，满了丢掉最老的一条
#[derive(Debug)]
pub struct RequestLog {
    logs: VecDeque<RequestRecord>,
    max_entries: usize,
}

impl Default for RequestLog {
    fn default() -> Self {
        RequestLog::new(REQUEST_LOG_CAPACITY)
    }
}

impl RequestLog {
    pub fn new(max_entries: usize) -> Self {
        RequestLog {
            logs: VecDeque::with_capacity(max_entries),
            max_entries,
        }
    }

    pub fn record(&mut self, entry: RequestRecord) {
        if self.max_entries == 0 {
            return;
        }
        while self.logs.len() >= self.max_entries {
            self.logs.pop_front();
        }
        self.logs.push_back(entry);
    }

    /// 最近 n 条，最新的在前
    pub fn recent(&self, n: usize) -> Vec<RequestRecord> {
        self.logs.iter().rev().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }
}
