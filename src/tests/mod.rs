//! Unit tests for the request pipeline, session and realtime lifecycle
//!
//! Each file drives the public types against fakes from `support`.

mod support;
