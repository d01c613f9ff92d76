//! This crate remaps symbol lookup strings baked into compiled JVM classes.
//!
//! Source code refers to classes and members of an obfuscated runtime
//! through small lookup instructions inside string literals, such as
//! `SRC(net.minecraft.world.Level)` or `SRM(net.minecraft.world.Level isClientSide)`.
//! At build time every such instruction is replaced by the name it resolves
//! to in either the readable (developer) or the obfuscated (production)
//! naming scheme.
//!
//! The names come from a [`SymbolTable`] that merges a proguard-style debug
//! mapping with a compact class mapping.
//!
//! # Examples
//!
//! ```
//! use string_remapper::{lookup, RemapGoal, SymbolTable};
//!
//! let debug = br#"net.minecraft.world.Level -> cmm:
//!     boolean isClientSide -> y
//!     12:14:boolean isDay() -> C"#;
//! let compact = b"cmm net/minecraft/world/level/World";
//! let table = SymbolTable::from_mappings(debug, compact).unwrap();
//!
//! // remapping a string
//! assert_eq!(
//!     lookup::process_string("SRC(net.minecraft.world.Level)", &table, RemapGoal::Production),
//!     Ok(Some("net.minecraft.world.level.World".to_owned())),
//! );
//! assert_eq!(
//!     lookup::process_string(
//!         "SRM(net.minecraft.world.Level isDay)",
//!         &table,
//!         RemapGoal::Production,
//!     ),
//!     Ok(Some("C".to_owned())),
//! );
//! assert_eq!(
//!     lookup::process_string(
//!         "SRF(net.minecraft.world.Level isClientSide)",
//!         &table,
//!         RemapGoal::DeveloperFacing,
//!     ),
//!     Ok(Some("isClientSide".to_owned())),
//! );
//! ```
//!
//! Whole class files go through a [`ClassRemapper`], directories of them
//! through a [`ProjectRemapper`].

#![warn(missing_docs)]

pub mod classfile;
pub mod descriptor;
pub mod lookup;
mod mapping;
pub mod project;
pub mod proxy;
pub mod remapper;
mod table;

pub use lookup::{LookupError, LookupInstruction};
pub use mapping::{
    CompactMapping, CompactRecord, CompactRecordIter, DebugMapping, DebugRecord, DebugRecordIter,
    ParseError, ParseErrorKind,
};
pub use project::{load_symbol_table, ProjectError, ProjectRemapper, RemapOptions, RemapSummary};
pub use remapper::{ChangeTracker, ClassRemapper, RemapError};
pub use table::{
    merge, parse_compact_mapping, parse_debug_mapping, resolve_nested_class, DebugTables,
    ParseRemapGoalError, RemapGoal, SymbolTable,
};

#[cfg(feature = "uuid")]
use uuid::Uuid;

#[cfg(feature = "uuid")]
lazy_static::lazy_static! {
    static ref NAMESPACE: Uuid = Uuid::new_v5(&Uuid::NAMESPACE_URL, b"string-remapper/mappings");
}

/// Calculates a stable UUID for a pair of mapping files.
///
/// Useful as a cache key for the merged [`SymbolTable`].
#[cfg(feature = "uuid")]
pub fn mapping_uuid(debug: &[u8], compact: &[u8]) -> Uuid {
    let debug = Uuid::new_v5(&NAMESPACE, debug);
    Uuid::new_v5(&debug, compact)
}
