//! HTTP API: submit batches, inspect and steer tasks, stream progress.

pub mod app;
