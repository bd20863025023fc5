//! Transport-independent request and response types.

mod request;
mod response;

pub use request::{GatewayRequest, Method};
pub use response::{GatewayResponse, StatusCode};
