//! Worker messaging
//!
//! The scheduler lives behind a message loop: [`Worker`] maps each
//! [`Request`] to one [`Response`], [`WorkerHandle`] runs it on a dedicated
//! thread with caller-side timeouts, and [`protocol`] defines the JSON wire
//! format.

mod handle;
pub mod protocol;
mod worker;

pub use handle::{DEFAULT_TIMEOUT, WorkerHandle};
pub use protocol::{Request, RequestId, RequestKind, RequestType, Response, ResponseBody};
pub use worker::{EnhancerFactory, PrimitiveFactory, Worker};
