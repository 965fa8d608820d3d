use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use loop_bridge::{
    net::tcp::{
        ClientHandler, ConnectionId, NoOpLogger, ServerContext, ServerHandler, TransportClient,
        TransportConfig, TransportServer,
    },
    reactor::DEFAULT_MAX_TICKS,
    EventLoop, StreamHandle,
};
use std::{cell::Cell, sync::Arc, time::Duration};

struct Echo;

impl ServerHandler for Echo {
    fn on_data(&self, ctx: &ServerContext, conn_id: ConnectionId, data: &[u8]) {
        ctx.send_to(conn_id, data);
    }
}

#[derive(Default)]
struct Counter {
    bytes: Cell<usize>,
}

impl ClientHandler for Counter {
    fn on_data(&self, _stream: &StreamHandle, data: &[u8]) {
        self.bytes.set(self.bytes.get() + data.len());
    }
}

fn quiet_config(port: u16) -> TransportConfig {
    TransportConfig::builder()
        .port(port)
        .logger(Arc::new(NoOpLogger))
        .build()
}

fn bench_idle_tick(c: &mut Criterion) {
    let mut event_loop = EventLoop::new(&quiet_config(0)).unwrap();
    c.bench_function("idle_tick", |b| {
        b.iter(|| black_box(event_loop.tick(DEFAULT_MAX_TICKS).unwrap()))
    });
}

fn bench_echo(c: &mut Criterion) {
    let mut server = TransportServer::new(quiet_config(0), Echo);
    server.init().unwrap();
    server.start_server().unwrap();
    let port = server.local_addr().unwrap().port();

    let mut client = TransportClient::new(quiet_config(port), Counter::default());
    client.init().unwrap();
    client.connect("127.0.0.1").unwrap();
    while !(client.is_connected() && server.connection_count() == 1) {
        server.tick().unwrap();
        client.tick().unwrap();
        std::thread::sleep(Duration::from_millis(1));
    }

    let mut group = c.benchmark_group("loopback_echo");
    for size in [64usize, 1024, 16 * 1024] {
        let payload = vec![0xAB; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, payload| {
            b.iter(|| {
                let target = client.handler().bytes.get() + payload.len();
                client.send(payload);
                while client.handler().bytes.get() < target {
                    client.tick().unwrap();
                    server.tick().unwrap();
                }
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_idle_tick, bench_echo);
criterion_main!(benches);
