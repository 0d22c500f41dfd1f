//! Infrastructure layer: event store, dispatch pipeline, projections,
//! notifications, and the order workflow that stitches them together.

pub mod command_dispatcher;
pub mod event_store;
pub mod notify;
pub mod projections;
pub mod read_model;
pub mod workflow;

#[cfg(test)]
mod integration_tests;
