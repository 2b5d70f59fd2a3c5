//! Schema Introspection Benchmarks
//!
//! Measures table listing and full table-detail assembly over a database
//! with a few dozen tables.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use sqlite_tui::engine::{Connection, Introspector};

fn many_tables() -> (tempfile::TempDir, Connection) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bench.db");
    let conn = Connection::open_read_write(&path).expect("open");
    conn.with_handle(|c| {
        for i in 0..32 {
            c.execute_batch(&format!(
                "CREATE TABLE t{i} (
                     id INTEGER PRIMARY KEY,
                     name TEXT NOT NULL,
                     created_at DATETIME
                 );
                 CREATE INDEX idx_t{i}_name ON t{i}(name);"
            ))?;
        }
        Ok(())
    })
    .expect("schema");
    (dir, conn)
}

fn bench_list_tables(c: &mut Criterion) {
    let (_dir, conn) = many_tables();
    c.bench_function("list_tables", |b| {
        b.iter(|| {
            let tables = Introspector::new(black_box(&conn)).list_tables().expect("tables");
            assert_eq!(tables.len(), 32);
        });
    });
}

fn bench_table_details(c: &mut Criterion) {
    let (_dir, conn) = many_tables();
    c.bench_function("get_table_info", |b| {
        b.iter(|| {
            Introspector::new(black_box(&conn)).get_table_info("t0").expect("info")
        });
    });
}

fn bench_indexes(c: &mut Criterion) {
    let (_dir, conn) = many_tables();
    c.bench_function("get_indexes", |b| {
        b.iter(|| Introspector::new(black_box(&conn)).get_indexes("t0").expect("indexes"));
    });
}

criterion_group!(benches, bench_list_tables, bench_table_details, bench_indexes);
criterion_main!(benches);
