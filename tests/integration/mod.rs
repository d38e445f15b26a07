//! Integration tests for components working together over real sockets

pub mod harness;

pub mod http_pipeline_test;
pub mod realtime_channel_test;
