//! Infrastructure layer: event storage, dispatch, projections, object storage
//! and the multi-aggregate fulfillment flows.

pub mod command_dispatcher;
pub mod event_store;
pub mod fulfillment;
pub mod projections;
pub mod read_model;
pub mod storage;
pub mod workers;

mod integration_tests;
