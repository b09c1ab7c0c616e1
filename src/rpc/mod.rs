//! JSON-RPC 2.0 gateway: wire types, typed method requests, dispatch and the
//! websocket transport.

pub mod dispatcher;
pub mod methods;
pub mod protocol;
pub mod server;

pub use dispatcher::Dispatcher;
pub use methods::{GatewayRequest, ProductInfoParams};
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use server::{router, run_connection, serve, serve_listener};
