//! Service layer module

pub mod context;
pub mod dispatcher;
pub mod fer_service;
pub mod types;

pub use context::{Context, Signature, TensorSpec};
pub use dispatcher::{Dispatcher, ServiceState};
pub use fer_service::FerService;
pub use types::RequestItem;
