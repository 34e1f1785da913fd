//! Purpose: Interface broker library backing the `cordis` CLI and the C ABI.
//! Exports: `api` (broker facade and types), `abi` (C symbols), `paths`.
//! Role: Resolve manifest names to entry points in dynamically loaded libraries.
//! Invariants: Core modules stay private; `api` is the public Rust surface.
//! Invariants: Brokers are explicit instances; only `abi` keeps a process-global one.
pub mod abi;
pub mod api;
mod core;
pub mod paths;
