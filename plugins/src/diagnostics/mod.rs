pub mod hub;
pub mod jsonl;

pub use hub::DiagnosticsHub;
pub use jsonl::{ingest_jsonl, DiagnosticsRecord};
