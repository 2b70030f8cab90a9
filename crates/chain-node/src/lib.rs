//! Wires `chain-db`, `chain-trie`, `chain-blockstore`, `chain-manager` and
//! `chain-consensus` into a single start/stop sequence (spec.md §9 "model
//! global singletons as a context struct passed by reference, initialize in
//! start-up sequence, tear down in reverse order").

pub mod context;

pub use context::Context;
