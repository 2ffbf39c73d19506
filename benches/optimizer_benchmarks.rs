//! Benchmarks the deterministic pass plus genetic search against a
//! two-table join query, the shape the cost model and rule set were
//! designed around.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use oxiql::config::OptimizerConfig;
use oxiql::query::parser::parse;
use oxiql::query::tree::reset_ids_for_test;
use oxiql::storage::catalog::{Catalog, ColumnDefinition, LogicalType, Table, TableKind};

fn catalog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog.add_table(Table {
        name: "orders".into(),
        columns: vec![
            ColumnDefinition { name: "id".into(), logical_type: LogicalType::Integer, is_primary_key: true },
            ColumnDefinition { name: "customer_id".into(), logical_type: LogicalType::Integer, is_primary_key: false },
            ColumnDefinition { name: "total".into(), logical_type: LogicalType::Integer, is_primary_key: false },
        ],
        primary_keys: vec!["id".into()],
        foreign_keys: vec![],
        kind: TableKind::Data,
    });
    catalog.add_table(Table {
        name: "customers".into(),
        columns: vec![
            ColumnDefinition { name: "id".into(), logical_type: LogicalType::Integer, is_primary_key: true },
            ColumnDefinition { name: "region".into(), logical_type: LogicalType::Varchar(255), is_primary_key: false },
        ],
        primary_keys: vec!["id".into()],
        foreign_keys: vec![],
        kind: TableKind::Data,
    });
    catalog
}

fn bench_optimize(c: &mut Criterion) {
    let catalog = catalog();
    let sql = "SELECT orders.id, customers.region FROM orders INNER JOIN customers ON orders.customer_id = customers.id WHERE orders.total > 100 AND customers.region = 'west';";
    let config = OptimizerConfig { population_size: 30, generations: 15, ..OptimizerConfig::default() };

    c.bench_function("optimize_two_table_join", |b| {
        b.iter(|| {
            reset_ids_for_test();
            let root = parse(black_box(sql)).unwrap();
            black_box(oxiql::optimizer::optimize(&root, &catalog, &config));
        });
    });
}

criterion_group!(benches, bench_optimize);
criterion_main!(benches);
