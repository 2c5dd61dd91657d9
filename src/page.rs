// src/page.rs
//! 仪表盘页面。首屏用快照渲染，之后由页面脚本通过 /ws 接收推送原地更新。
use std::fmt::Write;

use crate::monitor::SystemInfo;

const HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Server monitor</title>
    <style>
        body { font-family: Arial, sans-serif; margin: 20px; }
        h1 { color: #333; }
        .container { display: flex; flex-wrap: wrap; }
        .section { margin: 10px; padding: 15px; border: 1px solid #ddd; border-radius: 5px; flex: 1; min-width: 300px; }
        table { width: 100%; border-collapse: collapse; }
        th, td { padding: 8px; text-align: left; border-bottom: 1px solid #ddd; }
        th { background-color: #f2f2f2; }
        .updated { animation: highlight 2s; }
        @keyframes highlight { 0% { background-color: #ffff99; } 100% { background-color: transparent; } }
    </style>
</head>
<body>
    <h1>Server monitor</h1>
    <p><small>Values update in real time</small></p>
    <div class="container">
"#;

const SCRIPT: &str = r#"    </div>
    <script>
        function esc(s) {
            return String(s).replace(/[&<>"']/g, c => ({'&':'&amp;','<':'&lt;','>':'&gt;','"':'&quot;',"'":'&#39;'}[c]));
        }
        function set(id, value) {
            const el = document.getElementById(id);
            if (el && el.textContent !== String(value)) {
                el.textContent = value;
                el.classList.remove('updated');
                void el.offsetWidth;
                el.classList.add('updated');
            }
        }
        function rows(id, items, cols) {
            const body = document.getElementById(id);
            if (body) {
                body.innerHTML = items.map(i => '<tr>' + cols.map(c => '<td>' + esc(i[c]) + '</td>').join('') + '</tr>').join('');
            }
        }
        function update(d) {
            set('cpu-count', d.cpuCount);
            set('cpu-usage', d.cpuUsage + '%');
            set('total-memory', d.totalMemory + ' GB');
            set('free-memory', d.freeMemory + ' GB');
            set('memory-usage', d.memoryUsage + ' MB');
            set('uptime', d.uptime.hours + ' h ' + d.uptime.minutes + ' min');
            set('current-rps', d.requestRateData.currentRPS);
            set('sampled-at', d.sampledAt);
            set('clients-count', d.connectedClients.length);
            rows('clients-table', d.connectedClients, ['ip', 'lastSeen', 'url']);
            set('history-count', d.requestHistory.length);
            rows('history-table', d.requestHistory, ['timestamp', 'ip', 'url']);
        }
        function connect() {
            const proto = location.protocol === 'https:' ? 'wss://' : 'ws://';
            const ws = new WebSocket(proto + location.host + '/ws');
            ws.onmessage = ev => {
                const msg = JSON.parse(ev.data);
                if (msg.event === 'systemInfo') update(msg.data);
            };
            ws.onclose = () => setTimeout(connect, 2000);
        }
        connect();
    </script>
</body>
</html>
"#;

/// 转义插入到 HTML 里的文本
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn row(out: &mut String, cells: &[&str]) {
    out.push_str("<tr>");
    for cell in cells {
        let _ = write!(out, "<td>{}</td>", escape(cell));
    }
    out.push_str("</tr>");
}

pub fn render_dashboard(info: &SystemInfo) -> String {
    let mut out = String::from(HEAD);

    out.push_str("<div class=\"section\"><h2>Server</h2><table>");
    let _ = write!(
        out,
        "<tr><td>CPUs:</td><td id=\"cpu-count\">{}</td></tr>\
         <tr><td>CPU load:</td><td id=\"cpu-usage\">{}%</td></tr>\
         <tr><td>Total memory:</td><td id=\"total-memory\">{} GB</td></tr>\
         <tr><td>Free memory:</td><td id=\"free-memory\">{} GB</td></tr>\
         <tr><td>Process memory:</td><td id=\"memory-usage\">{} MB</td></tr>\
         <tr><td>Uptime:</td><td id=\"uptime\">{} h {} min</td></tr>\
         <tr><td>Requests/s:</td><td id=\"current-rps\">{}</td></tr>\
         <tr><td>Sampled at:</td><td id=\"sampled-at\">{}</td></tr>",
        info.cpu_count,
        info.cpu_usage,
        info.total_memory,
        info.free_memory,
        info.memory_usage,
        info.uptime.hours,
        info.uptime.minutes,
        info.request_rate_data.current_rps,
        escape(&info.sampled_at),
    );
    out.push_str("</table></div>");

    let _ = write!(
        out,
        "<div class=\"section\"><h2>Connected clients (<span id=\"clients-count\">{}</span>)</h2>\
         <table><tr><th>IP</th><th>Last seen</th><th>URL</th></tr><tbody id=\"clients-table\">",
        info.connected_clients.len()
    );
    for client in &info.connected_clients {
        row(&mut out, &[&client.ip, &client.last_seen, &client.url]);
    }
    out.push_str("</tbody></table></div>");

    let _ = write!(
        out,
        "<div class=\"section\"><h2>Request history (last <span id=\"history-count\">{}</span>)</h2>\
         <table><tr><th>Time</th><th>IP</th><th>URL</th></tr><tbody id=\"history-table\">",
        info.request_history.len()
    );
    for req in &info.request_history {
        row(&mut out, &[&req.timestamp, &req.ip, &req.url]);
    }
    out.push_str("</tbody></table></div>\n");

    out.push_str(SCRIPT);
    out
}

pub fn render_about() -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>About</title></head>\
         <body><h1>About this server</h1>\
         <p>A small server that shows live host metrics and recent traffic.</p>\
         <p><small>crab-pulse {}</small></p></body></html>",
        env!("CARGO_PKG_VERSION")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{HostSample, Snapshot, Trackers, RequestRecord};
    use chrono::Local;

    #[test]
    fn test_escape() {
        assert_eq!(escape("<a href='x'>&\"</a>"), "&lt;a href=&#39;x&#39;&gt;&amp;&quot;&lt;/a&gt;");
        assert_eq!(escape("plain"), "plain");
    }

    // 首屏带上快照数值，请求路径被转义
    #[test]
    fn test_render_dashboard() {
        let mut trackers = Trackers::default();
        trackers.requests.record(RequestRecord::new(
            Some("10.1.1.1".into()),
            None,
            "/<script>",
            Local::now(),
        ));
        let host = HostSample {
            cpu_count: 2,
            cpu_usage_percent: 50.0,
            total_memory_bytes: 1 << 30,
            free_memory_bytes: 1 << 29,
            process_memory_bytes: 1 << 20,
            uptime_secs: 3660,
        };
        let info = Snapshot::capture(host, &trackers, Local::now()).to_system_info();
        let html = render_dashboard(&info);
        let sampled = format!("<td id=\"sampled-at\">{}</td>", info.sampled_at);

        assert!(html.contains("<td id=\"cpu-count\">2</td>"));
        assert!(html.contains("50.00%"));
        assert!(html.contains("1 h 1 min"));
        assert!(html.contains("10.1.1.1"));
        assert!(html.contains("/&lt;script&gt;"));
        assert!(!html.contains("/<script>"));
        assert!(html.contains("/ws"));
        assert!(html.contains(&sampled));
    }
}
