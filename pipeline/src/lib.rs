//! Change-request-to-pull-request pipeline.
//!
//! A free-text change request is resolved to target files, turned into a
//! multi-file change by a completion service, gated file by file, committed
//! on a deterministic branch, and published as a draft pull request.
//!
//! - **[`core`]**: Pure, deterministic logic (response parsing, ledger,
//!   branch naming, manifest union, locators). No I/O.
//! - **[`io`]**: Side-effecting adapters (git, subprocesses, HTTP clients,
//!   configuration, prompts, working-copy helpers).
//!
//! Stage modules ([`resolver`], [`generator`], [`gate`], [`branch`],
//! [`commit`], [`diff`], [`describe`], [`publish`]) combine the two, and the
//! entry flows ([`interactive`], [`studio`], [`review`]) wire the stages
//! together through [`flow`].

pub mod branch;
pub mod commit;
pub mod core;
pub mod describe;
pub mod diff;
pub mod error;
pub mod exit_codes;
pub mod flow;
pub mod gate;
pub mod generator;
pub mod interactive;
pub mod io;
pub mod logging;
pub mod publish;
pub mod resolver;
pub mod review;
pub mod studio;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
