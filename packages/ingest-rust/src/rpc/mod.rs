//! Request/response correlation over the channel transport.

pub mod config;
pub mod router;

pub use config::RpcConfig;
pub use router::{CorrelationRouter, ResponseBody};
