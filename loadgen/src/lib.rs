//! The loadgen storefront workload generator.
//!
//! This library supports the loadgen binary found elsewhere in this project. A
//! population of virtual users, each an independent task, repeatedly picks a
//! weighted random shopping action, performs it against the storefront
//! frontend and then pauses for a randomized think-time. A second, single-shot
//! mode probes the currency service over gRPC.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::multiple_crate_versions)]

pub mod action;
pub mod clock;
pub mod config;
pub mod encode;
pub mod fixtures;
pub mod probe;
pub mod runner;
pub mod target;
pub mod user;
pub mod weighted;
