pub mod csv;
pub mod jsonl;
pub mod scenario;
