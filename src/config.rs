use serde::{Deserialize, Serialize};
use std::{
    fs,
    net::{IpAddr, SocketAddr},
    path::Path,
};
use anyhow::{Context, Result, bail};
use tokio::time::Duration;


/// 进程启动时读到的配置
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// 监听地址
    pub bind_addr: String,
    /// 监听端口
    pub port: u16,
    /// 运行环境标签（development / production ...）
    pub mode: String,
    /// 推送周期（毫秒）
    pub broadcast_interval_ms: u64,
    /// CPU 占用采样窗口（毫秒）
    pub cpu_sample_window_ms: u64,
    /// 日志级别，RUST_LOG 优先
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "0.0.0.0".to_string(),
            port: 3000,
            mode: "development".to_string(),
            broadcast_interval_ms: 2000,
            cpu_sample_window_ms: 1000,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// 环境变量覆盖：PORT、APP_ENV（没有时退回 NODE_ENV）。
    /// `lookup` 一般传 `|k| std::env::var(k).ok()`。
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT").filter(|s| !s.trim().is_empty()) {
            self.port = port
                .trim()
                .parse()
                .with_context(|| format!("invalid PORT value {:?}", port))?;
        }
        let mode = ["APP_ENV", "NODE_ENV"]
            .into_iter()
            .find_map(|key| lookup(key).filter(|s| !s.trim().is_empty()));
        if let Some(mode) = mode {
            self.mode = mode.trim().to_string();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.broadcast_interval_ms == 0 {
            bail!("broadcast_interval_ms must be greater than zero");
        }
        self.socket_addr()?;
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .bind_addr
            .parse()
            .with_context(|| format!("invalid bind_addr {:?}", self.bind_addr))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    pub fn cpu_sample_window(&self) -> Duration {
        Duration::from_millis(self.cpu_sample_window_ms)
    }
}

/// 从指定路径读取并反序列化 JSON 配置
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path_ref = path.as_ref();

    // 如果配置文件不存在，创建默认配置
    if !path_ref.exists() {
        let default_cfg = Config::default();
        let default_json = serde_json::to_string_pretty(&default_cfg)?;
        fs::write(path_ref, default_json)
            .with_context(|| format!("Failed to write default config {:?}", path_ref))?;

        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path_ref)
        .with_context(|| format!("Failed to read config file {:?}", path_ref))?;
    let cfg: Config = serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse {:?}", path_ref))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = Config::default();
        cfg.apply_env(env(&[("PORT", "8080"), ("APP_ENV", "production")])).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.mode, "production");
    }

    // 兼容已有的 .env：只有 NODE_ENV 时也能设置模式，两者都有时 APP_ENV 优先
    #[test]
    fn test_env_mode_fallback() {
        let mut cfg = Config::default();
        cfg.apply_env(env(&[("NODE_ENV", "production")])).unwrap();
        assert_eq!(cfg.mode, "production");

        let mut cfg = Config::default();
        cfg.apply_env(env(&[("APP_ENV", "staging"), ("NODE_ENV", "production")])).unwrap();
        assert_eq!(cfg.mode, "staging");

        let mut cfg = Config::default();
        cfg.apply_env(env(&[("APP_ENV", " "), ("NODE_ENV", "test")])).unwrap();
        assert_eq!(cfg.mode, "test");
    }

    // 没设置的变量不改动默认值
    #[test]
    fn test_env_absent_keeps_defaults() {
        let mut cfg = Config::default();
        cfg.apply_env(env(&[("PORT", "")])).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn test_env_bad_port() {
        let mut cfg = Config::default();
        assert!(cfg.apply_env(env(&[("PORT", "eighty")])).is_err());
    }

    #[test]
    fn test_validate() {
        let mut cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.socket_addr().unwrap().port(), 3000);

        cfg.broadcast_interval_ms = 0;
        assert!(cfg.validate().is_err());

        let cfg = Config { bind_addr: "not-an-ip".into(), ..Config::default() };
        assert!(cfg.validate().is_err());
    }
}
