// Core modules: manifest model, capability matching, library lifecycle and the broker.
pub mod broker;
pub mod connection;
pub mod error;
pub mod flags;
pub mod loader;
pub mod manifest;
pub mod registry;
#[cfg(test)]
pub(crate) mod testing;
