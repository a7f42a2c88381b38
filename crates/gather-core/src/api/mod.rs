//! Remote API access: transport seam, session/token handling, and the
//! typed client with single-flight 401 refresh.

mod client;
mod session;
mod transport;

pub use client::{ApiClient, ApiError, ApiResult};
pub use session::{SessionIdentity, TokenPair, TokenStore, UserProfile};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};
