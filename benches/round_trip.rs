//! Round trip benchmark suite.
//!
//! Measures command correlation against an in-process echo endpoint:
//! - Sequential round trips
//! - Concurrent batches: 10, 100, 1000 commands in flight
//! - Event fan-out to handlers
//!
//! Run with: cargo bench --bench round_trip
//! Results saved to: target/criterion/

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cdp_wire::{Connection, Handler, RawCommand};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio_tungstenite::tungstenite::Message;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const BATCH_SIZES: &[usize] = &[10, 100, 1000];
const EVENTS_PER_COMMAND: &[usize] = &[1, 16];

// ============================================================================
// Echo Endpoint
// ============================================================================

/// Starts an endpoint that answers every command, preceded by
/// `params.events` events.
async fn start_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind endpoint");
    let url = format!("ws://{}/devtools/page/BENCH", listener.local_addr().expect("addr"));

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                let (mut sink, mut source) = ws.split();

                while let Some(Ok(Message::Text(text))) = source.next().await {
                    let Ok(request) = serde_json::from_str::<Value>(&text) else {
                        continue;
                    };

                    let events = request["params"]["events"].as_u64().unwrap_or(0);
                    for n in 0..events {
                        let event = json!({ "method": "Network.dataReceived", "params": { "n": n } });
                        if sink.send(Message::Text(event.to_string().into())).await.is_err() {
                            return;
                        }
                    }

                    let reply = json!({ "id": request["id"], "result": { "ok": true } });
                    if sink.send(Message::Text(reply.to_string().into())).await.is_err() {
                        return;
                    }
                }
            });
        }
    });

    url
}

// ============================================================================
// Benchmark: Sequential Round Trips
// ============================================================================

fn bench_sequential(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let connection = rt.block_on(async {
        let url = start_endpoint().await;
        Connection::connect(&url).await.expect("connect")
    });

    c.bench_function("round_trip/sequential", |b| {
        b.to_async(&rt).iter(|| async {
            connection
                .send(RawCommand::new("Bench.echo"))
                .await
                .expect("send")
        });
    });

    rt.block_on(connection.close());
}

// ============================================================================
// Benchmark: Concurrent Batches
// ============================================================================

fn bench_concurrent(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let connection = rt.block_on(async {
        let url = start_endpoint().await;
        Connection::connect(&url).await.expect("connect")
    });

    let mut group = c.benchmark_group("round_trip/concurrent");

    for &size in BATCH_SIZES {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.to_async(&rt).iter(|| async {
                let sends = (0..size).map(|_| connection.send(RawCommand::new("Bench.echo")));
                futures_util::future::try_join_all(sends)
                    .await
                    .expect("batch")
            });
        });
    }

    group.finish();
    rt.block_on(connection.close());
}

// ============================================================================
// Benchmark: Event Fan-out
// ============================================================================

fn bench_event_fanout(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let delivered = Arc::new(AtomicUsize::new(0));

    let connection = rt.block_on(async {
        let url = start_endpoint().await;
        let connection = Connection::new(&url).expect("valid url");
        let delivered = Arc::clone(&delivered);
        connection.add_handler(
            "Network.dataReceived",
            Handler::from_async(move |_, _| {
                let delivered = Arc::clone(&delivered);
                async move {
                    delivered.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }
            }),
        );
        connection.open().await.expect("open");
        connection
    });

    let mut group = c.benchmark_group("round_trip/events");

    for &events in EVENTS_PER_COMMAND {
        group.throughput(Throughput::Elements(events as u64));
        group.bench_with_input(BenchmarkId::from_parameter(events), &events, |b, &events| {
            b.to_async(&rt).iter(|| async {
                connection
                    .send(RawCommand::new("Bench.echo").param("events", events))
                    .await
                    .expect("send")
            });
        });
    }

    group.finish();
    rt.block_on(connection.close());
}

criterion_group!(
    benches,
    bench_sequential,
    bench_concurrent,
    bench_event_fanout
);
criterion_main!(benches);
