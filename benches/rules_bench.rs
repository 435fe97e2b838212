//! Benchmarks for rule evaluation.
//!
//! Measures first-match evaluation over the default rule set.

use std::hint::black_box;
use std::net::{IpAddr, Ipv4Addr};

use criterion::{BenchmarkId, Criterion, Throughput};

use tollgate::dns::{self, CLASS_IN, DnsQuery, TYPE_A};
use tollgate::filter::{Request, RuleSet, loader};

const SOURCE: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 30, 5));
const DESTINATION: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 30, 1));

fn query(name: &str, qtype: u16) -> DnsQuery {
    DnsQuery::parse(&dns::encode_query(0x1234, name, qtype, CLASS_IN)).unwrap()
}

fn bench_evaluate(c: &mut Criterion) {
    let rules = RuleSet::defaults();

    let mut group = c.benchmark_group("rules");
    group.throughput(Throughput::Elements(1));

    let cases = [
        ("first_rule_drop", query("malicious.com", TYPE_A)),
        ("contains_drop", query("cdn.tracker.com", TYPE_A)),
        ("qtype_pass", query("www.google.com", TYPE_A)),
        ("no_match", query("a.b.c.d.e.f.example.org", 16)),
    ];

    for (label, query) in &cases {
        let request = Request {
            query,
            source: SOURCE,
            destination: DESTINATION,
        };
        group.bench_function(BenchmarkId::new("evaluate", label), |b| {
            b.iter(|| rules.evaluate(black_box(&request)))
        });
    }

    group.finish();
}

fn bench_address_rules(c: &mut Criterion) {
    let rules = loader::parse_rules(
        "src_ip == 10.0.0.9 drop\n\
         dst_ip matches 8.8. drop\n\
         qtype_desc == MX pass\n",
    );
    let query = query("example.com", TYPE_A);
    let request = Request {
        query: &query,
        source: SOURCE,
        destination: DESTINATION,
    };

    c.bench_function("rules/address_miss", |b| {
        b.iter(|| rules.evaluate(black_box(&request)))
    });
}

fn bench_parse(c: &mut Criterion) {
    let text = "qname contains \"ads\" drop\n".repeat(100);

    let mut group = c.benchmark_group("loader");
    group.throughput(Throughput::Elements(100));
    group.bench_function("parse_100_rules", |b| {
        b.iter(|| loader::parse_rules(black_box(&text)))
    });
    group.finish();
}

fn main() {
    let mut criterion = Criterion::default().configure_from_args();
    bench_evaluate(&mut criterion);
    bench_address_rules(&mut criterion);
    bench_parse(&mut criterion);
    criterion.final_summary();
}
