//! Load testing for the write path.

use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;

use tsdb_relay::backend::Consistency;
use tsdb_relay::lifecycle::Shutdown;
use tsdb_relay::{HttpServer, Relay};

mod common;

#[tokio::test]
async fn test_load_performance() {
    // 1. Setup replica backends
    let (addr_a, received_a) =
        common::start_programmable_backend(|_req| async { (204, String::new()) }).await;
    let (addr_b, received_b) =
        common::start_programmable_backend(|_req| async { (204, String::new()) }).await;

    // 2. Setup relay config: one "all" group of both replicas
    let mut config = common::relay_config(&["a", "b"], Consistency::All);
    config.backends[0].address = format!("http://{}", addr_a);
    config.backends[1].address = format!("http://{}", addr_b);
    config.groups[0].max_in_flight = 64;

    // 3. Start relay
    let shutdown = Shutdown::new();
    let relay = Arc::new(Relay::new(config.clone()).unwrap());
    relay.start();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let relay_addr = listener.local_addr().unwrap();
    let server = HttpServer::new(relay.clone(), &config);
    let mut server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server
            .run(listener, async move { server_shutdown.cancelled().await })
            .await;
    });

    // 4. Run load test
    let concurrency = 20;
    let writes_per_task = 50;
    let total_writes = concurrency * writes_per_task;

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let start = Instant::now();

    let mut tasks = Vec::new();
    for task in 0..concurrency {
        let client = client.clone();
        let url = format!("http://{}/write?db=db&precision=s", relay_addr);
        tasks.push(tokio::spawn(async move {
            let mut latencies = Vec::new();
            for i in 0..writes_per_task {
                let body = format!("cpu,task={} value={} {}", task, i, 1_700_000_000 + i);
                let req_start = Instant::now();
                if let Ok(res) = client.post(&url).body(body).send().await {
                    if res.status() == 204 {
                        latencies.push(req_start.elapsed());
                    }
                }
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for task in tasks {
        all_latencies.extend(task.await.unwrap());
    }

    let duration = start.elapsed();
    let wps = total_writes as f64 / duration.as_secs_f64();

    assert_eq!(all_latencies.len(), total_writes, "every write should be acknowledged");

    all_latencies.sort();
    let p50 = all_latencies[all_latencies.len() / 2];
    let p95 = all_latencies[(all_latencies.len() as f64 * 0.95) as usize];
    let p99 = all_latencies[(all_latencies.len() as f64 * 0.99) as usize];

    println!("\n--- Load Test Results ---");
    println!("Total Writes:   {}", total_writes);
    println!("Concurrency:    {}", concurrency);
    println!("Total Duration: {:?}", duration);
    println!("Writes/sec:     {:.2}", wps);
    println!("P50 Latency:    {:?}", p50);
    println!("P95 Latency:    {:?}", p95);
    println!("P99 Latency:    {:?}", p99);
    println!("-------------------------\n");

    // Every replica saw every write; nothing left behind.
    assert_eq!(received_a.lock().unwrap().len(), total_writes);
    assert_eq!(received_b.lock().unwrap().len(), total_writes);
    assert_eq!(relay.buffer().total(), 0);
    assert_eq!(relay.stats().snapshot().accepted, total_writes as u64);

    shutdown.trigger();
    relay.stop().await.unwrap();
}
