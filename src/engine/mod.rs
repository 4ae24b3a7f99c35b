//! Job consumption: the worker loop, handler contracts, and event routing.

pub mod backoff;
pub mod dispatch;
pub mod exclusive;
pub mod handler;
pub mod hook;
pub mod worker;

pub use backoff::Backoff;
pub use dispatch::Dispatcher;
pub use exclusive::Exclusive;
pub use handler::{EventHandler, Handler};
pub use hook::HookHandler;
pub use worker::{Worker, WorkerConfig, failure_level};
