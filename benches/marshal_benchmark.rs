use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::HashMap;
use std::num::NonZeroU32;

use dbus_wire::message_builder::MessageBuilder;
use dbus_wire::wire::marshal::marshal;
use dbus_wire::wire::unmarshal::{unmarshal_dynamic_header, unmarshal_header, unmarshal_next_message};

fn marsh(msg: &dbus_wire::message_builder::MarshalledMessage, buf: &mut Vec<u8>) {
    marshal(msg, NonZeroU32::new(1).unwrap(), buf).unwrap();
}

fn unmarshal(buf: &[u8]) {
    let (hdrbytes, header) = unmarshal_header(buf, 0).unwrap();
    let (dynhdrbytes, dynheader) = unmarshal_dynamic_header(&header, buf, hdrbytes).unwrap();
    let (_, _unmarshalled) =
        unmarshal_next_message(&header, dynheader, buf, hdrbytes + dynhdrbytes).unwrap();
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut dict: HashMap<String, i32> = HashMap::new();
    dict.insert("A".to_owned(), 1234567);
    dict.insert("B".to_owned(), 1234567);
    dict.insert("C".to_owned(), 1234567);
    dict.insert("D".to_owned(), 1234567);
    dict.insert("E".to_owned(), 1234567);

    let array: Vec<String> = (0..1024)
        .map(|i| format!("{}{}{}{}{}{}{}{}{}", i, i, i, i, i, i, i, i, i))
        .collect();

    let mut msg = MessageBuilder::new()
        .signal(
            "io.example.Bench".to_owned(),
            "TestSignal".to_owned(),
            "/io/example/bench".to_owned(),
        )
        .build();

    for _ in 0..10 {
        msg.body.push_param("TesttestTesttest".to_owned()).unwrap();
        msg.body.push_param(0xFFFFFFFFFFFFFFFFu64).unwrap();
        msg.body
            .push_param((0xFFFFFFFFFFFFFFFFu64, "TesttestTesttest".to_owned()))
            .unwrap();
        msg.body.push_param(dict.clone()).unwrap();
        msg.body.push_param(array.clone()).unwrap();
        msg.body.push_param(vec!["ABCD".to_owned()]).unwrap();
    }
    msg.dynheader.serial = Some(1);

    let mut buf = Vec::new();
    c.bench_function("marshal", |b| {
        b.iter(|| {
            buf.clear();
            marsh(black_box(&msg), &mut buf)
        })
    });

    buf.clear();
    marsh(&msg, &mut buf);
    c.bench_function("unmarshal", |b| b.iter(|| unmarshal(black_box(&buf))));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
