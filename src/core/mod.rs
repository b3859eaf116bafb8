//! Migration pipeline building blocks.
//!
//! Leaf-first: `sanitize` and `document` have no dependencies inside the
//! crate; `source`, `writer` and `compact` sit on top of them; `scheduler`
//! drives reader and writer; `orchestrator` ties a run together.

pub mod category;
pub mod compact;
pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod orchestrator;
pub mod pool;
pub mod sanitize;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod writer;
