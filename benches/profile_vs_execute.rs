use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use table_scout::config::Config;
use table_scout::tools::{self, RunCodeRequest};
use tempfile::TempDir;

fn generate_orders(rows: usize) -> (TempDir, PathBuf) {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let csv_path = temp_dir.path().join("orders.csv");
    let mut file = File::create(&csv_path).expect("create csv");
    writeln!(file, "id,region,amount,status,ordered_at,notes").expect("header");
    for i in 0..rows {
        let region = ["north", "south", "east", "west"][i % 4];
        let status = match i % 3 {
            0 => "shipped",
            1 => "pending",
            _ => "processing",
        };
        let day = (i % 28) + 1;
        let notes = if i % 5 == 0 { "priority" } else { "" };
        writeln!(
            file,
            "{i},{region},{}.{:02},{status},2024-01-{day:02},{notes}",
            (i * 7) % 500,
            i % 100
        )
        .expect("row");
    }
    (temp_dir, csv_path)
}

fn bench_profile_vs_execute(c: &mut Criterion) {
    let (temp_dir, csv_path) = generate_orders(50_000);
    let config = Config {
        enable_memory_monitoring: false,
        ..Config::default()
    };
    let grouped = RunCodeRequest {
        file_path: csv_path.clone(),
        sheet: None,
        code: "result = df.groupby('region')['amount'].agg(['sum', 'mean', 'count'])".to_string(),
    };
    let filtered = RunCodeRequest {
        file_path: csv_path.clone(),
        sheet: None,
        code: "recent = df.query(\"amount > 250\")\nresult = recent.nlargest(20, 'amount')"
            .to_string(),
    };

    let mut group = c.benchmark_group("table_scout");
    group.sample_size(10);

    group.bench_function("read_metadata_sampled", |b| {
        b.iter_batched(
            || (),
            |_| {
                tools::read_metadata(&config, &csv_path, None).expect("metadata");
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("interpret_column_full", |b| {
        let columns = vec!["region".to_string(), "status".to_string()];
        b.iter_batched(
            || (),
            |_| {
                tools::interpret_column(&config, &csv_path, &columns, None).expect("interpret");
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("run_code_groupby", |b| {
        b.iter_batched(
            || (),
            |_| {
                assert!(tools::run_code(&config, &grouped).success);
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("run_code_query", |b| {
        b.iter_batched(
            || (),
            |_| {
                assert!(tools::run_code(&config, &filtered).success);
            },
            BatchSize::SmallInput,
        );
    });

    drop(temp_dir);
    group.finish();
}

criterion_group!(benches, bench_profile_vs_execute);
criterion_main!(benches);
