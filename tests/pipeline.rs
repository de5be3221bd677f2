use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use haproxy_statsd::bridge::Bridge;
use haproxy_statsd::config::Config;
use haproxy_statsd::report::fields::{GAUGE_FIELDS, MIN_ROW_WIDTH};
use tokio::net::{TcpListener, UdpSocket};

const HEADER: &str = "# pxname,svname,qcur,qmax,scur,smax,slim,stot,bin,bout,dreq,dresp,\
    ereq,econ,eresp,wretr,wredis,status,weight,act,bck,chkfail,chkdown,lastchg,downtime,\
    qlimit,pid,iid,sid,throttle,lbtot,tracked,type,rate,rate_lim,rate_max,check_status,\
    check_code,check_duration,hrsp_1xx,hrsp_2xx,hrsp_3xx,hrsp_4xx,hrsp_5xx,hrsp_other,\
    hanafail,req_rate,req_rate_max,req_tot,cli_abrt,srv_abrt,comp_in,comp_out,comp_byp,\
    comp_rsp,lastsess,last_chk,last_agt,qtime,ctime,rtime,ttime,";

fn csv_row(pxname: &str, svname: &str, values: &[(usize, &str)]) -> String {
    let mut columns = vec![String::new(); MIN_ROW_WIDTH + 1];
    columns[0] = pxname.to_string();
    columns[1] = svname.to_string();
    for (index, value) in values {
        columns[*index] = (*value).to_string();
    }
    columns.join(",")
}

fn stats_body() -> String {
    format!(
        "{HEADER}\n{}\n",
        csv_row("web:8080", "srv1", &[(4, "2"), (12, "5"), (13, "10"), (40, "321")])
    )
}

/// HAProxy stand-in: fails the first `failures` requests with a 503.
struct Stats {
    requests: AtomicUsize,
    failures: usize,
}

async fn stats_handler(State(stats): State<Arc<Stats>>) -> (StatusCode, String) {
    let n = stats.requests.fetch_add(1, Ordering::SeqCst);
    if n < stats.failures {
        (StatusCode::SERVICE_UNAVAILABLE, "no server available".to_string())
    } else {
        (StatusCode::OK, stats_body())
    }
}

async fn serve_stats(failures: usize) -> (SocketAddr, Arc<Stats>) {
    let stats = Arc::new(Stats {
        requests: AtomicUsize::new(0),
        failures,
    });
    let app = Router::new()
        .route("/haproxy", get(stats_handler))
        .with_state(Arc::clone(&stats));

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (addr, stats)
}

fn config(stats_addr: SocketAddr, statsd_addr: SocketAddr, interval: &str) -> Config {
    Config::from_yaml(&format!(
        r#"
haproxy:
  url: "http://{stats_addr}/haproxy"
  timeout: 2s
statsd:
  address: "{statsd_addr}"
  prefix: mystore.haproxy
poll_interval: {interval}
"#
    ))
    .expect("config")
}

async fn recv_lines(socket: &UdpSocket, count: usize) -> Vec<String> {
    let mut lines = Vec::with_capacity(count);
    let mut buf = [0u8; 1024];
    while lines.len() < count {
        let (n, _) = tokio::time::timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
            .await
            .expect("datagram before timeout")
            .expect("recv");
        lines.push(String::from_utf8_lossy(&buf[..n]).into_owned());
    }
    lines
}

#[tokio::test]
async fn test_single_cycle_end_to_end() {
    let (stats_addr, _) = serve_stats(0).await;
    let statsd = UdpSocket::bind("127.0.0.1:0").await.expect("bind statsd");
    let statsd_addr = statsd.local_addr().expect("statsd addr");

    let bridge = Bridge::new(config(stats_addr, statsd_addr, "10s")).expect("bridge");
    let summary = bridge.run_once().await.expect("cycle");

    assert_eq!(summary.rows, 1);
    assert_eq!(summary.gauges, GAUGE_FIELDS.len());

    let lines = recv_lines(&statsd, GAUGE_FIELDS.len()).await;
    let expected: Vec<String> = GAUGE_FIELDS
        .iter()
        .map(|field| {
            let value = match field.key {
                "scur" => 2,
                "ereq" => 5,
                "econ" => 10,
                "hrsp_2xx" => 321,
                _ => 0,
            };
            format!("mystore.haproxy.web.8080.srv1.{}:{}|g", field.key, value)
        })
        .collect();
    assert_eq!(lines, expected);
}

#[tokio::test]
async fn test_unreachable_source_fails_cycle() {
    let reserved = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let stats_addr = reserved.local_addr().expect("local addr");
    drop(reserved);

    let statsd = UdpSocket::bind("127.0.0.1:0").await.expect("bind statsd");
    let statsd_addr = statsd.local_addr().expect("statsd addr");

    let bridge = Bridge::new(config(stats_addr, statsd_addr, "10s")).expect("bridge");
    let err = bridge.run_once().await.expect_err("should fail");
    assert!(format!("{err:#}").contains("fetching stats report"));

    let mut buf = [0u8; 64];
    let received =
        tokio::time::timeout(Duration::from_millis(200), statsd.recv_from(&mut buf)).await;
    assert!(received.is_err(), "no metrics expected");
}

#[tokio::test]
async fn test_loop_survives_failed_cycles() {
    let (stats_addr, stats) = serve_stats(2).await;
    let statsd = UdpSocket::bind("127.0.0.1:0").await.expect("bind statsd");
    let statsd_addr = statsd.local_addr().expect("statsd addr");

    let mut bridge = Bridge::new(config(stats_addr, statsd_addr, "20ms")).expect("bridge");
    bridge.start().await.expect("start");

    // Two failed cycles, then two successful ones.
    let first = recv_lines(&statsd, GAUGE_FIELDS.len()).await;
    let second = recv_lines(&statsd, GAUGE_FIELDS.len()).await;

    bridge.stop().await.expect("stop");

    assert!(stats.requests.load(Ordering::SeqCst) >= 4);
    assert_eq!(first, second);

    let names: BTreeSet<&str> = first
        .iter()
        .map(|line| line.split(':').next().expect("name"))
        .collect();
    assert_eq!(names.len(), GAUGE_FIELDS.len());

    let health = bridge.health();
    assert!(
        health
            .cycle_failures
            .with_label_values(&["fetch"])
            .get()
            >= 2.0
    );
    assert!(health.gauges_sent.get() >= 2.0 * GAUGE_FIELDS.len() as f64);
}
