use coronet::sse::event::EventSink;
use coronet::sse::{SseEvent, SseParser};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::time::Duration;

struct NullSink {
    events: usize,
}

impl EventSink for NullSink {
    fn on_event(&mut self, event: SseEvent) {
        black_box(&event);
        self.events += 1;
    }
    fn on_retry(&mut self, retry: Duration) {
        black_box(retry);
    }
}

fn build_input(events: usize) -> Vec<u8> {
    let mut input = Vec::new();
    for i in 0..events {
        input.extend_from_slice(format!("id: {i}\nevent: tick\ndata: payload {i}\n\n").as_bytes());
    }
    input
}

fn bench_parser_whole(c: &mut Criterion) {
    let input = build_input(1000);
    let mut group = c.benchmark_group("sse_parser");
    group.throughput(Throughput::Bytes(input.len() as u64));
    group.bench_function("feed_whole", |b| {
        b.iter(|| {
            let mut parser = SseParser::new();
            let mut sink = NullSink { events: 0 };
            parser.feed(black_box(&input), &mut sink);
            parser.end_of_stream(&mut sink);
            black_box(sink.events)
        })
    });
    group.bench_function("feed_small_chunks", |b| {
        b.iter(|| {
            let mut parser = SseParser::new();
            let mut sink = NullSink { events: 0 };
            for chunk in input.chunks(64) {
                parser.feed(black_box(chunk), &mut sink);
            }
            parser.end_of_stream(&mut sink);
            black_box(sink.events)
        })
    });
    group.finish();
}

criterion_group!(benches, bench_parser_whole);
criterion_main!(benches);
