//! Packet codec benchmark suite.
//!
//! Measures the hot path of the event loop:
//! - Encoding outbound `EVENT` frames
//! - Decoding inbound frames (engine + socket layer)
//! - Parsing document broadcasts into typed events
//!
//! Run with: cargo bench --bench packet_codec
//! Results saved to: target/criterion/

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use serde_json::{Value, json};

use docshare_realtime::identifiers::AckId;
use docshare_realtime::protocol::{EnginePacket, Packet, ServerEvent};
use docshare_realtime::{Document, DocumentId};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const BATCH_SIZES: &[usize] = &[1, 10, 100];

fn document(index: usize) -> Document {
    Document::new(format!("doc-{index}"), format!("Quarterly report {index}.pdf"))
}

fn delete_payload(count: usize) -> Value {
    let ids: Vec<DocumentId> = (0..count).map(|i| DocumentId::new(format!("doc-{i}"))).collect();
    json!(ids)
}

// ============================================================================
// Benchmark: Encode
// ============================================================================

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    let payload = serde_json::to_value(document(1)).unwrap();
    group.bench_function("document_event", |b| {
        b.iter(|| {
            Packet::event("/", "newDocument", black_box(payload.clone()), None).to_frame()
        });
    });

    group.bench_function("document_event_with_ack", |b| {
        b.iter(|| {
            Packet::event("/", "updateDocument", black_box(payload.clone()), Some(AckId::new(42)))
                .to_frame()
        });
    });

    for &count in BATCH_SIZES {
        let ids = delete_payload(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("delete_documents", count), &ids, |b, ids| {
            b.iter(|| Packet::event("/", "deleteDocuments", black_box(ids.clone()), None).to_frame());
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Decode
// ============================================================================

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    let frame = Packet::event("/", "newDocument", serde_json::to_value(document(1)).unwrap(), None)
        .to_frame();
    group.bench_function("document_event", |b| {
        b.iter(|| match EnginePacket::decode(black_box(&frame)).unwrap() {
            EnginePacket::Message(body) => Packet::decode(&body).unwrap(),
            other => panic!("unexpected {other:?}"),
        });
    });

    group.bench_function("ping", |b| {
        b.iter(|| EnginePacket::decode(black_box("2")).unwrap());
    });

    group.bench_function("namespaced_ack", |b| {
        b.iter(|| Packet::decode(black_box(r#"3/admin,17["ok",{"saved":true}]"#)).unwrap());
    });

    group.finish();
}

// ============================================================================
// Benchmark: Typed Parse
// ============================================================================

fn bench_server_event(c: &mut Criterion) {
    let mut group = c.benchmark_group("server_event");

    let created = serde_json::to_value(document(7)).unwrap();
    group.bench_function("document_created", |b| {
        b.iter(|| ServerEvent::parse("newDocument", black_box(&created)));
    });

    for &count in BATCH_SIZES {
        let ids = delete_payload(count);
        group.bench_with_input(BenchmarkId::new("documents_deleted", count), &ids, |b, ids| {
            b.iter(|| ServerEvent::parse("deleteDocuments", black_box(ids)));
        });
    }

    group.finish();
}

// ============================================================================
// Criterion Setup
// ============================================================================

criterion_group!(benches, bench_encode, bench_decode, bench_server_event);
criterion_main!(benches);
