//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Benchmarks for the client-bound pipeline and separator splitting

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use mudproxy_records::Origin;
use mudproxy_service::pipeline::split_on_separator;
use mudproxy_service::{Addressing, ClientConnection, Proxy, ProxyConfig};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn bench_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("split_on_separator");

    group.bench_function("single_command", |b| {
        b.iter(|| black_box(split_on_separator(black_box("kill goblin"), '|')))
    });

    group.bench_function("many_commands", |b| {
        b.iter(|| {
            black_box(split_on_separator(
                black_box("n|n|e|open door|say hi||there|s|look"),
                '|',
            ))
        })
    });

    group.finish();
}

fn bench_to_clients(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("process_to_client");

    for clients in [1usize, 10] {
        let proxy = Proxy::new(ProxyConfig::default());
        let mut queues = Vec::new();
        for port in 0..clients {
            let addr = format!("127.0.0.1:{}", 20000 + port).parse().unwrap();
            let (client, rx) = ClientConnection::new(proxy.clients().next_client_id(), addr);
            proxy.clients().insert(Arc::new(client));
            queues.push(rx);
        }

        group.throughput(Throughput::Elements(50));
        group.bench_function(format!("50_lines_{clients}_clients"), |b| {
            b.iter(|| {
                runtime.block_on(async {
                    let mut batch = proxy.new_batch("mud");
                    for index in 0..50 {
                        batch
                            .push_text(format!("A goblin arrives ({index})."), Origin::Mud)
                            .unwrap();
                    }
                    proxy
                        .send_batch_to_clients(batch, Addressing::all())
                        .await
                        .unwrap();
                });
                for queue in &mut queues {
                    while queue.try_recv().is_ok() {}
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_split, bench_to_clients);
criterion_main!(benches);
