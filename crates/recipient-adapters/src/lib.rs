//! Adapters for the recipient dashboard core.
//!
//! A deterministic in-memory [`DataService`](recipient_core::DataService)
//! with call log, failure injection and latency, plus file and memory
//! [`Exporter`](recipient_core::Exporter)s.

#![deny(unsafe_code)]

pub mod export;
pub mod memory;

pub use export::{FileExporter, MemoryExporter};
pub use memory::{
    Fixture, InMemoryDataService, ServiceCall, ServiceMethod, DEMO_BRANCH_RECIPIENT_ID,
    DEMO_RECIPIENT_ID, DEMO_SECOND_RECIPIENT_ID,
};
