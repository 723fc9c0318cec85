pub mod errors;
pub mod urlcodec;
pub mod pool;
pub mod models;
pub mod expr;
pub mod substitution;
pub mod poc;
pub mod client;
pub mod engine;
pub mod verdict;
pub mod scanner;
pub mod loader;  // Rule stores and selection
pub mod targets;
pub mod config;
pub mod logging;
pub mod reporting;

#[cfg(test)]
pub(crate) mod mock;

// Re-export commonly used items
pub use errors::*;
pub use urlcodec::{decompose, normalize_target, recompose, UrlParts};
pub use pool::{MessagePool, Pool, Pooled, Recycle};
pub use models::*;
pub use expr::{CelLite, Environment, Evaluator, Value};
pub use poc::{decode, decode_with, Plugin, Poc, Step};
pub use client::{ClientConfig, HttpClient, Transport};
pub use engine::{run_poc, ScanContext};
pub use verdict::*;
pub use scanner::Scanner;
pub use loader::{load_plugins, DirectoryStore, MemoryStore, PluginRecord, PluginStore, Selection};
pub use config::ScanConfig;
