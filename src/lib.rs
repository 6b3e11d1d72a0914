//! Terminal client for a remote fleet-ping service.
//!
//! The client creates and stops pinger runs on the server, lists them, and
//! follows their result and statistics streams either interactively or as a
//! single batch command.

pub mod cancel;
pub mod config;
pub mod consumer;
pub mod dispatcher;
pub mod error;
pub mod model;
pub mod output;
pub mod registry;
pub mod render;
pub mod rpc;
pub mod session;
pub mod statistics;
pub mod style;
pub mod target_list;
pub mod transport;

pub use config::ClientConfig;
pub use error::{ClientError, ClientResult, RpcError, RpcResult};
pub use rpc::{BoxPushStream, PingerRpc, PushStream};
pub use session::{Session, SessionSettings, Termination};
pub use transport::JsonLineClient;
