// src/monitor/rate.rs

use super::*;

/// 一个秒级桶
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePoint {
    /// UNIX 秒
    pub second: i64,
    pub count: u64,
}

/// 按秒分桶的请求计数环形缓冲
///
/// 桶的时间戳严格递增，每秒至多一个桶；超过容量时淘汰最老的桶。
/// 时间被假定单调不减：比最新桶还早的时间记到最新桶里。
#[derive(Debug)]
pub struct RateSeries {
    buckets: VecDeque<RatePoint>,
    max_buckets: usize,
}

impl Default for RateSeries {
    fn default() -> Self {
        RateSeries::new(RATE_SERIES_CAPACITY)
    }
}

impl RateSeries {
    pub fn new(max_buckets: usize) -> Self {
        RateSeries {
            buckets: VecDeque::with_capacity(max_buckets),
            max_buckets: max_buckets.max(1),
        }
    }

    pub fn record(&mut self, now_secs: i64) {
        if let Some(last) = self.buckets.back_mut() {
            if now_secs <= last.second {
                last.count += 1;
                return;
            }
        }

        self.buckets.push_back(RatePoint { second: now_secs, count: 1 });
        while self.buckets.len() > self.max_buckets {
            self.buckets.pop_front();
        }
    }

    /// 最近 min(5, len) 个桶的平均值，保留两位小数
    pub fn current_rate(&self) -> f64 {
        let window = self.buckets.len().min(RATE_WINDOW);
        if window == 0 {
            return 0.0;
        }
        let total: u64 = self.buckets.iter().rev().take(window).map(|b| b.count).sum();
        let avg = total as f64 / window as f64;
        (avg * 100.0).round() / 100.0
    }

    /// 全部桶，最老的在前
    pub fn series(&self) -> Vec<RatePoint> {
        self.buckets.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
