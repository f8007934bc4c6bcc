use criterion::{black_box, criterion_group, criterion_main, Criterion};
use meridian::dns::{Message, Name, Question, RecordClass, RecordType};

fn sample_query_bytes() -> Vec<u8> {
    Message::query(
        1,
        Question {
            qname: Name::from_str_lossy("www.example.com"),
            qtype: RecordType::A,
            qclass: RecordClass::IN,
        },
    )
    .to_bytes()
}

fn bench_decode(c: &mut Criterion) {
    let wire = sample_query_bytes();
    c.bench_function("decode simple query", |b| {
        b.iter(|| {
            let msg = Message::from_bytes(black_box(&wire)).unwrap();
            black_box(msg);
        });
    });
}

fn bench_encode(c: &mut Criterion) {
    let message = Message::query(
        1,
        Question {
            qname: Name::from_str_lossy("www.example.com"),
            qtype: RecordType::A,
            qclass: RecordClass::IN,
        },
    );
    c.bench_function("encode simple query", |b| {
        b.iter(|| {
            black_box(message.to_bytes());
        });
    });
}

criterion_group!(benches, bench_decode, bench_encode);
criterion_main!(benches);
