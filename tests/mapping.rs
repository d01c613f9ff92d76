use std::collections::BTreeMap;

use string_remapper::{
    merge, parse_compact_mapping, parse_debug_mapping, CompactMapping, CompactRecord, DebugMapping,
    DebugRecord, ParseErrorKind, SymbolTable,
};

mod support;
use support::{COMPACT_MAPPING, DEBUG_MAPPING, TABLE};

#[test]
fn test_debug_mapping_records() {
    let mapping = DebugMapping::new(DEBUG_MAPPING);
    let records = mapping.iter().collect::<Result<Vec<_>, _>>().unwrap();

    assert_eq!(records[0], DebugRecord::Comment(r#"{"fileName":"client.txt","id":"sourceFile"}"#));
    assert_eq!(
        records[3],
        DebugRecord::Class {
            original: "net.minecraft.core.BlockPos",
            obfuscated: "hx",
        }
    );

    let inlined = records
        .iter()
        .find(|record| matches!(record, DebugRecord::Method { obfuscated: "b", .. }))
        .unwrap();
    assert!(matches!(
        inlined,
        DebugRecord::Method {
            original: "floor",
            original_class: Some("net.minecraft.util.Mth"),
            ..
        }
    ));
}

#[test]
fn test_compact_mapping_records() {
    let mapping = CompactMapping::new(COMPACT_MAPPING);
    let records = mapping.iter().collect::<Result<Vec<_>, _>>().unwrap();

    assert_eq!(records.len(), 5);
    assert_eq!(records[0], CompactRecord::Comment("spigot class mappings"));
    assert_eq!(
        records[3],
        CompactRecord::Class {
            obfuscated: "cmm",
            original: "net/minecraft/world/level/World",
        }
    );
}

#[test]
fn test_debug_tables() {
    let tables = parse_debug_mapping(DEBUG_MAPPING).unwrap();

    assert_eq!(tables.classes.len(), 8);
    assert_eq!(tables.fields.len(), 8);
    assert_eq!(tables.methods.len(), 8);
    assert_eq!(tables.classes["net/minecraft/world/level/Level$ExplosionInteraction"], "cmm$a");
    assert_eq!(
        tables.fields["net/minecraft/world/level/Level$ExplosionInteraction.$VALUES.[Lnet/minecraft/world/level/Level$ExplosionInteraction;"],
        "b"
    );
    assert_eq!(
        tables.methods["net/minecraft/world/level/Level.getBlockState(Lnet/minecraft/core/BlockPos;)Lnet/minecraft/world/level/block/state/BlockState;"],
        "a_"
    );
    assert_eq!(
        tables.methods["net/minecraft/world/level/Level.toString()Ljava/lang/String;"],
        "toString"
    );

    // constructors and inlined foreign methods never become entries
    assert!(tables.methods.keys().all(|key| !key.contains("<init>") && !key.contains("<clinit>")));
    assert!(tables.methods.keys().all(|key| !key.contains("floor")));
}

#[test]
fn test_merged_classes() {
    assert_eq!(
        TABLE.class("net/minecraft/world/level/Level"),
        Some("net/minecraft/world/level/World")
    );
    assert_eq!(
        TABLE.class("net/minecraft/server/level/ServerPlayer$Listener"),
        Some("net/minecraft/server/level/EntityPlayer$1")
    );
    assert_eq!(
        TABLE.class("net/minecraft/world/level/Level$ExplosionInteraction$Mode"),
        Some("net/minecraft/world/level/World$a$b")
    );
    // neither listed nor nested
    assert_eq!(TABLE.class("net/minecraft/world/level/dimension/DimensionType"), Some("dpx"));
    assert_eq!(TABLE.class("net/minecraft/util/Mth"), None);
}

#[test]
fn test_merge_is_repeatable() {
    let first = merge(
        parse_debug_mapping(DEBUG_MAPPING).unwrap(),
        &parse_compact_mapping(COMPACT_MAPPING).unwrap(),
    );
    let second = merge(
        parse_debug_mapping(DEBUG_MAPPING).unwrap(),
        &parse_compact_mapping(COMPACT_MAPPING).unwrap(),
    );

    assert_eq!(first.class_mappings(), second.class_mappings());
    assert_eq!(first.field_mappings(), second.field_mappings());
    assert_eq!(first.method_mappings(), second.method_mappings());
    assert_eq!(first, second);
    assert_eq!(first, *TABLE);
}

#[test]
fn test_merged_members_keep_readable_keys() {
    assert_eq!(TABLE.field("net/minecraft/world/level/Level.isClientSide.Z"), Some("y"));
    assert_eq!(
        TABLE.field("net/minecraft/world/level/dimension/DimensionType.fixedTime.J"),
        Some("k")
    );
    assert_eq!(TABLE.method("net/minecraft/world/level/Level.isDay()Z"), Some("N"));
    assert_eq!(TABLE.method("net/minecraft/core/BlockPos.getX()I"), Some("u"));

    assert_eq!(TABLE.field_by_owner("net/minecraft/world/level/Level", "players"), Some("E"));
    assert_eq!(TABLE.method_by_owner("net/minecraft/world/level/Level", "setBlock"), Some("a"));
    assert_eq!(TABLE.method_by_owner("net/minecraft/world/level/Level", "tick"), None);
}

#[test]
fn test_nested_fallback_through_outer() {
    let debug = parse_debug_mapping(b"a.B -> c$D:").unwrap();
    let compact = parse_compact_mapping(b"c e").unwrap();
    let table = merge(debug, &compact);

    assert_eq!(table.class("a/B"), Some("e$D"));
}

#[test]
fn test_direct_compact_entry_wins_over_outer() {
    let debug = parse_debug_mapping(b"a.B -> c$D:\na.C -> c:").unwrap();
    let compact = parse_compact_mapping(b"c e\nc$D f").unwrap();
    let table = merge(debug, &compact);

    assert_eq!(table.class("a/B"), Some("f"));
    assert_eq!(table.class("a/C"), Some("e"));
}

#[test]
fn test_malformed_debug_line() {
    let source = b"a.B -> c:\n    int x -> y\n\nthis line is broken\n";
    let err = parse_debug_mapping(source).unwrap_err();

    assert_eq!(err.line_number(), 4);
    assert_eq!(err.line(), b"this line is broken");
    assert!(matches!(err.kind(), ParseErrorKind::ParseError(_)));
    assert!(err.to_string().starts_with("line 4: "));
}

#[test]
fn test_malformed_compact_line() {
    let err = parse_compact_mapping(b"a b\nc d e\n").unwrap_err();
    assert_eq!(err.line_number(), 2);
    assert_eq!(err.line(), b"c d e");

    let err = parse_compact_mapping(b"a\n").unwrap_err();
    assert_eq!(err.line_number(), 1);
}

#[test]
fn test_serialized_form() {
    let json = TABLE.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(
        value["classMappings"]["net/minecraft/core/BlockPos"],
        "net/minecraft/core/BlockPosition"
    );
    assert_eq!(value["fieldMappings"]["net/minecraft/core/BlockPos.x.I"], "a");
    assert_eq!(value["methodMappings"]["net/minecraft/server/level/ServerPlayer.tick()V"], "l");
    assert_eq!(value.as_object().unwrap().len(), 3);
}

#[test]
fn test_roundtrip_empty() {
    let table = SymbolTable::default();
    let json = table.to_json().unwrap();
    let restored = SymbolTable::from_json(&json).unwrap();
    assert!(restored.is_empty());
    assert_eq!(restored, table);
    assert_eq!(TABLE.len(), 24);
}

#[test]
fn test_roundtrip_fixture() {
    let mut buf = Vec::new();
    TABLE.to_writer(&mut buf).unwrap();
    let restored = SymbolTable::from_reader(buf.as_slice()).unwrap();

    assert_eq!(restored, *TABLE);
    // the lazily built owner indexes work on a restored table
    assert_eq!(
        restored.field_by_owner("net/minecraft/world/level/Level", "isClientSide"),
        Some("y")
    );
}

#[test]
fn test_roundtrip_single_entry() {
    let table = SymbolTable::new(
        BTreeMap::from([("a/B".to_owned(), "c".to_owned())]),
        BTreeMap::new(),
        BTreeMap::new(),
    );
    let restored = SymbolTable::from_json(&table.to_json().unwrap()).unwrap();
    assert_eq!(restored, table);
    assert_eq!(restored.class("a/B"), Some("c"));
}

#[test]
fn test_roundtrip_large() {
    let mut classes = BTreeMap::new();
    let mut fields = BTreeMap::new();
    let mut methods = BTreeMap::new();
    for i in 0..10_000 {
        classes.insert(format!("net/example/Class{i}"), format!("a{i}"));
        fields.insert(format!("net/example/Class{i}.value.I"), format!("f{i}"));
        methods.insert(format!("net/example/Class{i}.run()V"), format!("m{i}"));
    }
    let table = SymbolTable::new(classes, fields, methods);

    let restored = SymbolTable::from_json(&table.to_json().unwrap()).unwrap();
    assert_eq!(restored.class_mappings().len(), 10_000);
    assert_eq!(restored, table);
    assert_eq!(restored.method_by_owner("net/example/Class9999", "run"), Some("m9999"));
}

#[test]
fn test_invalid_serialized_form() {
    assert!(SymbolTable::from_json("{").is_err());
    assert!(SymbolTable::from_json(r#"{"classMappings": []}"#).is_err());
}

#[cfg(feature = "uuid")]
#[test]
fn test_mapping_uuid() {
    let uuid = string_remapper::mapping_uuid(DEBUG_MAPPING, COMPACT_MAPPING);
    assert_eq!(uuid, string_remapper::mapping_uuid(DEBUG_MAPPING, COMPACT_MAPPING));
    assert_ne!(uuid, string_remapper::mapping_uuid(DEBUG_MAPPING, b""));
    assert_ne!(uuid, string_remapper::mapping_uuid(COMPACT_MAPPING, DEBUG_MAPPING));
}
