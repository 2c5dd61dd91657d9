// src/monitor/viewer.rs

use super::*;

/// 在线观看者登记表，按会话 ID 索引。
/// 会话 ID 单调分配，所以按 ID 排序就是登记顺序。
#[derive(Debug, Default)]
pub struct ViewerRegistry {
    viewers: BTreeMap<u64, ViewerSession>,
}

impl ViewerRegistry {
    pub fn new() -> Self {
        ViewerRegistry::default()
    }

    /// 插入或覆盖，last_seen 取 `seen_at`
    pub fn upsert(
        &mut self,
        session_id: u64,
        source_address: &str,
        user_agent: &str,
        path: &str,
        seen_at: DateTime<Local>,
    ) {
        self.viewers.insert(
            session_id,
            ViewerSession {
                session_id,
                source_address: source_address.to_string(),
                user_agent: user_agent.to_string(),
                last_seen: seen_at,
                last_path: path.to_string(),
            },
        );
    }

    pub fn touch(&mut self, session_id: u64, seen_at: DateTime<Local>) -> bool {
        match self.viewers.get_mut(&session_id) {
            Some(viewer) => {
                viewer.last_seen = seen_at;
                true
            }
            None => false,
        }
    }

    /// 不存在时什么也不做
    pub fn remove(&mut self, session_id: u64) -> bool {
        self.viewers.remove(&session_id).is_some()
    }

    pub fn all(&self) -> Vec<ViewerSession> {
        self.viewers.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.viewers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    // upsert(A), upsert(B), remove(A) 之后只剩 B
    #[test]
    fn test_upsert_and_remove() {
        let mut registry = ViewerRegistry::new();
        let now = Local::now();
        registry.upsert(1, "10.0.0.1", "agent-a", "/", now);
        registry.upsert(2, "10.0.0.2", "agent-b", "/", now);
        assert!(registry.remove(1));

        let all = registry.all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].session_id, 2);
        assert_eq!(all[0].source_address, "10.0.0.2");

        // 重复删除是 no-op
        assert!(!registry.remove(1));
        assert_eq!(registry.len(), 1);
    }

    // 重复 upsert 覆盖元数据，不产生第二条
    #[test]
    fn test_upsert_overwrites() {
        let mut registry = ViewerRegistry::new();
        let first = Local::now();
        let later = first + Duration::seconds(5);
        registry.upsert(7, "10.0.0.1", "agent", "/", first);
        registry.upsert(7, "10.0.0.9", "agent", "/about", later);

        let all = registry.all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].source_address, "10.0.0.9");
        assert_eq!(all[0].last_path, "/about");
        assert_eq!(all[0].last_seen, later);
    }

    // 同一地址的多个会话各自独立
    #[test]
    fn test_same_address_distinct_sessions() {
        let mut registry = ViewerRegistry::new();
        let now = Local::now();
        registry.upsert(3, "10.0.0.1", "agent", "/", now);
        registry.upsert(1, "10.0.0.1", "agent", "/", now);
        let ids: Vec<u64> = registry.all().iter().map(|v| v.session_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_touch_refreshes_last_seen() {
        let mut registry = ViewerRegistry::new();
        let now = Local::now();
        registry.upsert(1, "10.0.0.1", "agent", "/", now);
        let later = now + Duration::seconds(30);
        assert!(registry.touch(1, later));
        assert!(!registry.touch(2, later));
        assert_eq!(registry.all()[0].last_seen, later);
    }
}
