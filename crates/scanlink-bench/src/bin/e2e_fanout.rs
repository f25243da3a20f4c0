//! End-to-end fan-out benchmark for Scanlink.
//!
//! Starts an in-process server on an ephemeral port, connects N WebSocket
//! clients, and pushes scans through the scanner handle as fast as the
//! pump accepts them. Counts `Barcode:` lines received across all clients.

use futures_util::StreamExt;
use scanlink_core::{scan_channel, SessionRegistry};
use scanlink_protocol::codec::parse_text;
use scanlink_server::{config::Config, Server};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Barrier;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const WARMUP_SECS: u64 = 2;
const BENCH_SECS: u64 = 10;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let num_clients = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(16);

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║         Scanlink End-to-End Fan-out Benchmark                ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let mut config = Config::default();
    config.port = 0;
    config.liveness.enabled = false;
    config.metrics.enabled = false;

    let registry = Arc::new(SessionRegistry::new());
    let server = Server::new(config, Arc::clone(&registry));
    let addr = server.start().await?;
    let url = format!("ws://{}/ws", addr);

    println!("📊 Fan-out Benchmark: {} clients on {}", num_clients, url);
    println!("   Warmup: {}s, Measurement: {}s", WARMUP_SECS, BENCH_SECS);
    println!();

    let received = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(num_clients + 1));

    let mut handles = Vec::new();
    for client_id in 0..num_clients {
        let received = Arc::clone(&received);
        let barrier = Arc::clone(&barrier);
        let url = url.clone();

        handles.push(tokio::spawn(async move {
            if let Err(e) = run_client(&url, received, barrier).await {
                eprintln!("Client {} error: {}", client_id, e);
            }
        }));
    }

    barrier.wait().await;
    while registry.len() < num_clients {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    println!("✓ All {} clients connected", num_clients);

    let (scanner, source) = scan_channel();
    server.attach_source(source).await?;

    let producer = tokio::spawn(async move {
        let mut sequence = 0u64;
        loop {
            if !scanner.on_scan_event(format!("SCAN-{sequence:08}"), None) {
                break;
            }
            sequence += 1;
            // Let the pump drain the queue.
            tokio::task::yield_now().await;
        }
    });

    println!("⏳ Warming up for {}s...", WARMUP_SECS);
    tokio::time::sleep(Duration::from_secs(WARMUP_SECS)).await;

    received.store(0, Ordering::SeqCst);
    let start = Instant::now();

    println!("📈 Measuring for {}s...", BENCH_SECS);
    tokio::time::sleep(Duration::from_secs(BENCH_SECS)).await;

    let elapsed = start.elapsed();
    let total = received.load(Ordering::SeqCst);
    let per_sec = total as f64 / elapsed.as_secs_f64();

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                         RESULTS                              ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!(
        "║  Clients:              {:>10}                           ║",
        num_clients
    );
    println!(
        "║  Duration:             {:>10.2}s                          ║",
        elapsed.as_secs_f64()
    );
    println!(
        "║  Deliveries:           {:>10}                           ║",
        total
    );
    println!(
        "║  Throughput:           {:>10.0} msg/s                    ║",
        per_sec
    );
    println!(
        "║  Scans/s (per client): {:>10.0}                           ║",
        per_sec / num_clients as f64
    );
    println!("╚══════════════════════════════════════════════════════════════╝");

    producer.abort();
    server.stop(Duration::from_secs(2)).await?;
    for handle in handles {
        handle.abort();
    }
    Ok(())
}

async fn run_client(
    url: &str,
    received: Arc<AtomicU64>,
    barrier: Arc<Barrier>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (mut ws, _) = connect_async(url).await?;
    barrier.wait().await;

    while let Some(message) = ws.next().await {
        match message? {
            Message::Text(text) if parse_text(&text).is_some() => {
                received.fetch_add(1, Ordering::Relaxed);
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    Ok(())
}
