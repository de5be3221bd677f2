//! Bridge from HAProxy's CSV statistics page to statsd gauges.
//!
//! Each poll cycle fetches the report ([`source`]), decodes its rows
//! ([`report`]), and sends one gauge per tracked column ([`dispatch`],
//! [`statsd`]). [`bridge`] repeats the cycle and keeps one failed cycle from
//! affecting the next.

pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod export;
pub mod report;
pub mod source;
pub mod statsd;
