//! Tool executor backends
//!
//! - [`HttpToolExecutor`]: one templated HTTP request per call
//! - [`ReqwestToolBackends`]: hands HTTP executors and the MCP connector to
//!   the application's tool registry

mod backends;
mod http;

pub use backends::ReqwestToolBackends;
pub use http::HttpToolExecutor;
