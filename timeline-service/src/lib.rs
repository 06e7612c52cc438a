//! Timeline delivery pipeline: follower graph, fan-out decision and
//! publishing, asynchronous materialization, and three timeline read
//! strategies (push / pull / hybrid).

pub mod clients;
pub mod config;
pub mod domain;
pub mod error;
pub mod fanout;
pub mod metrics;
pub mod relationship;
pub mod retry;
pub mod timeline;
pub mod workers;
