//! Background workers fed from the event bus.

pub mod projection_worker;

pub use projection_worker::{ProjectionWorker, WorkerHandle};
