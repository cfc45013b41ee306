//! Rill WASM code generator: compiles an analyzed AST to a `.wasm` binary.
//!
//! # Architecture
//!
//! The code generator takes a [`rill_types::ast::Program`] together with the
//! analyzer's [`rill_types::Analysis`] and produces a self-contained module
//! plus a [`ModuleMetadata`] description for the host.
//!
//! - [`resolve`] maps (operator, type) pairs and casts to single instructions
//! - [`expr`] compiles expressions, [`stmt`] statements, [`flow`] branches
//!   and loops, all into a depth-tracking [`writer::Writer`]
//! - [`imports`] is the host import catalog, [`layout`] plans function
//!   indices and output regions, [`module`] serializes the binary
//!
//! ## Imports
//! All host operations are imported from `env` on first use:
//! `channel_read_<T>`, `channel_write_<T>`, `state_load_<T>`,
//! `state_store_<T>`, the `series_*` and `string_*` families, `now` and
//! `math_pow_<T>`.
//!
//! ## Exports
//! - every function and task, under its source name
//! - `memory`, when the module has output regions or string data
//!
//! ## Output regions
//!
//! A function with named outputs writes them to linear memory instead of
//! returning them: `[dirty bitmap: u64][outputs at machine width]`. The
//! bitmap is cleared on entry and bit `n` is set when output `n` is written.

pub mod compiler;
pub mod error;
pub mod expr;
pub mod flow;
pub mod imports;
pub mod layout;
pub mod metadata;
pub mod module;
pub mod resolve;
pub mod stmt;
pub mod types;
pub mod writer;

pub use compiler::{compile, compile_with_options, CompileOptions, CompileOutput, FuncContext};
pub use error::{CodegenError, CodegenResult};
pub use metadata::ModuleMetadata;
