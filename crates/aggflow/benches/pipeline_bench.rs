use aggflow::{Pipeline, PipelineOptions, Record, Value, compile_pipeline};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use serde_json::json;

const AIRLINES: [&str; 5] = ["Alaska", "Delta", "United", "JetBlue", "Southwest"];
const AIRPORTS: [&str; 4] = ["SFO", "OAK", "SJC", "LAX"];

fn flights(n: usize) -> Vec<Record> {
    (0..n)
        .filter_map(|i| {
            let record = json!({
                "year": 2019 + (i % 2) as i64,
                "month": 1 + (i % 12) as i64,
                "carrier": {"airline": AIRLINES[i % AIRLINES.len()]},
                "dest": {"code": AIRPORTS[i % AIRPORTS.len()], "state": "CA"},
                "arr_delay": (i % 97) as i64 - 20,
                "cancelled": (i % 31 == 0) as i64,
                "diverted": (i % 53 == 0) as i64,
                "crs_arr_time": format!("{:04}", (i * 37) % 2400)
            });
            Value::from(record).into_record()
        })
        .collect()
}

fn market_share() -> Pipeline {
    let doc = json!([
        {"$match": {"year": 2020}},
        {"$group": {
            "_id": "$carrier.airline",
            "volume": {"$sum": 1},
            "cancelled": {"$sum": "$cancelled"}
        }},
        {"$project": {
            "_id": 0,
            "airline": "$_id",
            "flight_count": "$volume",
            "cancelled_pct": {"$round": [{"$multiply": [{"$divide": ["$cancelled", "$volume"]}, 100]}, 2]}
        }},
        {"$sort": {"flight_count": -1}}
    ]);
    compile_pipeline(&doc).expect("benchmark pipeline compiles")
}

fn arrival_hours() -> Pipeline {
    let doc = json!([
        {"$match": {"arr_delay": {"$gt": 0}, "dest.code": {"$in": ["SFO", "OAK", "SJC"]}}},
        {"$addFields": {"hour": {"$toInt": {"$substr": ["$crs_arr_time", 0, 2]}}}},
        {"$group": {
            "_id": {"dest": "$dest.code", "hour": "$hour"},
            "avg": {"$avg": "$arr_delay"},
            "max": {"$max": "$arr_delay"}
        }},
        {"$sort": {"_id.dest": 1, "_id.hour": 1}}
    ]);
    compile_pipeline(&doc).expect("benchmark pipeline compiles")
}

fn bench_pipelines(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    for size in [1_000usize, 10_000] {
        let input = flights(size);
        let share = market_share();
        group.bench_with_input(BenchmarkId::new("market_share", size), &input, |b, input| {
            b.iter(|| share.execute(black_box(input.clone())).expect("runs"))
        });
        let hours = arrival_hours();
        group.bench_with_input(BenchmarkId::new("arrival_hours", size), &input, |b, input| {
            b.iter(|| hours.execute(black_box(input.clone())).expect("runs"))
        });
        let partitioned = arrival_hours().with_options(PipelineOptions {
            group_partitions: 4,
            ..PipelineOptions::default()
        });
        group.bench_with_input(BenchmarkId::new("arrival_hours_partitioned", size), &input, |b, input| {
            b.iter(|| partitioned.execute(black_box(input.clone())).expect("runs"))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_pipelines);
criterion_main!(benches);
