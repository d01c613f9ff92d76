use criterion::{black_box, criterion_group, criterion_main, Criterion};
use string_remapper::{merge, parse_compact_mapping, parse_debug_mapping, SymbolTable};

static DEBUG_MAPPING: &[u8] = include_bytes!("../tests/res/debug-mapping.txt");
static COMPACT_MAPPING: &[u8] = include_bytes!("../tests/res/compact-mapping.csrg");

fn benchmark_symbol_table(c: &mut Criterion) {
    let table = SymbolTable::from_mappings(DEBUG_MAPPING, COMPACT_MAPPING).unwrap();
    let json = table.to_json().unwrap();

    let mut group = c.benchmark_group("Symbol Table");

    group.bench_function("Parse debug mapping", |b| {
        b.iter(|| parse_debug_mapping(black_box(DEBUG_MAPPING)))
    });
    group.bench_function("Parse and merge", |b| {
        b.iter(|| {
            let debug = parse_debug_mapping(black_box(DEBUG_MAPPING)).unwrap();
            let compact = parse_compact_mapping(black_box(COMPACT_MAPPING)).unwrap();
            merge(debug, &compact)
        })
    });
    group.bench_function("Serialize", |b| b.iter(|| black_box(&table).to_json()));
    group.bench_function("Deserialize", |b| {
        b.iter(|| SymbolTable::from_json(black_box(&json)))
    });

    group.finish();
}

criterion_group!(benches, benchmark_symbol_table);
criterion_main!(benches);
