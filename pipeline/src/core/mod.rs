//! Deterministic, pure logic shared by the pipeline stages.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod ledger;
pub mod locator;
pub mod manifest;
pub mod message;
pub mod naming;
pub mod parser;
pub mod types;
