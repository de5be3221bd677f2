use criterion::{black_box, criterion_group, criterion_main, Criterion};
use haproxy_statsd::dispatch::derive_points;
use haproxy_statsd::report::fields::MIN_ROW_WIDTH;
use haproxy_statsd::report::RawReport;

const ROWS: usize = 500;

fn csv_row(pxname: &str, svname: &str) -> String {
    let mut columns: Vec<String> = (0..=MIN_ROW_WIDTH).map(|i| (i * 7).to_string()).collect();
    columns[0] = pxname.to_string();
    columns[1] = svname.to_string();
    columns[17] = "UP".to_string();
    columns[36] = "L7OK".to_string();
    columns.join(",")
}

fn report_body() -> String {
    let mut body = String::from("# pxname,svname,qcur,qmax,scur,smax\n");
    for i in 0..ROWS {
        body.push_str(&csv_row(&format!("backend:{}", 8000 + i % 20), &format!("srv{i}")));
        body.push('\n');
    }
    body
}

fn bench_parse(c: &mut Criterion) {
    let report = RawReport::new(report_body());

    c.bench_function("parse_report_500_rows", |b| {
        b.iter(|| {
            let count = report
                .records()
                .map(|r| r.expect("valid row"))
                .count();
            black_box(count)
        });
    });
}

fn bench_parse_and_derive(c: &mut Criterion) {
    let report = RawReport::new(report_body());

    c.bench_function("parse_and_derive_500_rows", |b| {
        b.iter(|| {
            let mut points = 0usize;
            for record in report.records() {
                let record = record.expect("valid row");
                points += derive_points(black_box(&record))
                    .expect("numeric values")
                    .len();
            }
            black_box(points)
        });
    });
}

criterion_group!(benches, bench_parse, bench_parse_and_derive);
criterion_main!(benches);
