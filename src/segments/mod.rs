//! Built-in ChatterLang sources and segments (spec §4.10), registered under
//! `registry::ensure_default_nodes`.

pub mod accum;
pub mod basic;
pub mod metadata;
pub mod snippet;
pub mod variable;
