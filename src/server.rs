// src/server.rs
//! 网络层：
//! - 入站中间件：每个 HTTP 请求记入请求日志和速率序列
//! - GET /、/about、/api/snapshot
//! - GET /ws：实时推送通道，连上即登记为观看者，断开即移除
use anyhow::{Context, Result};
use chrono::Local;
use futures::{SinkExt, StreamExt};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};
use warp::http::StatusCode;
use warp::path::FullPath;
use warp::ws::{Message, WebSocket, Ws};
use warp::{Filter, Rejection, Reply};

use crate::broadcast::Broadcaster;
use crate::config::Config;
use crate::monitor::RequestRecord;
use crate::page;

/// 启动 HTTP 服务，`shutdown` 完成后优雅退出
pub async fn start<F>(cfg: &Config, broadcaster: Arc<Broadcaster>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = cfg.socket_addr()?;
    let (bound, server) = warp::serve(routes(broadcaster))
        .try_bind_with_graceful_shutdown(addr, shutdown)
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%bound, mode = %cfg.mode, "dashboard listening");

    server.await;
    Ok(())
}

/// 全部路由。/ws 自己登记连接，其余路由先过入站中间件。
pub fn routes(
    broadcaster: Arc<Broadcaster>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let live = warp::path("ws")
        .and(warp::path::end())
        .and(warp::ws())
        .and(request_record())
        .and(with_broadcaster(broadcaster.clone()))
        .map(|ws: Ws, record: RequestRecord, b: Arc<Broadcaster>| {
            ws.on_upgrade(move |socket| viewer_session(socket, record, b))
        });

    let index = warp::path::end()
        .and(warp::get())
        .and(with_broadcaster(broadcaster.clone()))
        .and_then(dashboard);

    let about = warp::path("about")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| warp::reply::html(page::render_about()));

    let api = warp::path!("api" / "snapshot")
        .and(warp::get())
        .and(with_broadcaster(broadcaster.clone()))
        .and_then(snapshot_json);

    live.or(ingress(broadcaster).and(index.or(about).or(api)))
}

fn with_broadcaster(
    broadcaster: Arc<Broadcaster>,
) -> impl Filter<Extract = (Arc<Broadcaster>,), Error = Infallible> + Clone {
    warp::any().map(move || broadcaster.clone())
}

/// 从请求头和对端地址组装请求记录。
/// x-forwarded-for 优先（取第一跳），缺失的字段用占位值。
fn request_record() -> impl Filter<Extract = (RequestRecord,), Error = Rejection> + Clone {
    warp::header::optional::<String>("x-forwarded-for")
        .and(warp::addr::remote())
        .and(warp::header::optional::<String>("user-agent"))
        .and(warp::path::full())
        .map(
            |forwarded: Option<String>,
             remote: Option<SocketAddr>,
             agent: Option<String>,
             path: FullPath| {
                let addr = forwarded
                    .as_deref()
                    .and_then(|f| f.split(',').next())
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .or_else(|| remote.map(|r| r.ip().to_string()));
                RequestRecord::new(addr, agent, path.as_str(), Local::now())
            },
        )
}

/// 入站中间件：不产出值，只记录
fn ingress(
    broadcaster: Arc<Broadcaster>,
) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    request_record()
        .and(with_broadcaster(broadcaster))
        .map(|record: RequestRecord, b: Arc<Broadcaster>| {
            b.monitor().ingest(record);
        })
        .untuple_one()
}

async fn dashboard(broadcaster: Arc<Broadcaster>) -> Result<warp::reply::Response, Infallible> {
    match broadcaster.snapshot().await {
        Ok(snapshot) => {
            let html = page::render_dashboard(&snapshot.to_system_info());
            Ok(warp::reply::html(html).into_response())
        }
        Err(e) => {
            warn!("dashboard render failed: {:#}", e);
            Ok(metrics_unavailable())
        }
    }
}

async fn snapshot_json(broadcaster: Arc<Broadcaster>) -> Result<warp::reply::Response, Infallible> {
    match broadcaster.snapshot().await {
        Ok(snapshot) => Ok(warp::reply::json(&snapshot.to_system_info()).into_response()),
        Err(e) => {
            warn!("snapshot request failed: {:#}", e);
            Ok(metrics_unavailable())
        }
    }
}

fn metrics_unavailable() -> warp::reply::Response {
    warp::reply::with_status("metrics unavailable", StatusCode::SERVICE_UNAVAILABLE).into_response()
}

/// 单个观看者连接的生命周期
async fn viewer_session(socket: WebSocket, record: RequestRecord, broadcaster: Arc<Broadcaster>) {
    let (mut sink, mut stream) = socket.split();
    let (id, mut outbox) = broadcaster.connect(record).await;

    // 写半边单独一个任务，慢连接不会拖住推送循环
    let writer = tokio::spawn(async move {
        while let Some(payload) = outbox.recv().await {
            if let Err(e) = sink.send(Message::text(payload)).await {
                debug!(session = id, "websocket send failed: {}", e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(msg) if msg.is_close() => break,
            Ok(msg) if msg.is_text() => {
                broadcaster.monitor().touch(id);
            }
            Ok(_) => {}
            Err(e) => {
                debug!(session = id, "websocket read failed: {}", e);
                break;
            }
        }
    }

    // 移除发送端后 outbox 关闭，写任务随之结束
    broadcaster.disconnect(id);
    let _ = writer.await;
}
