//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → request.rs (request ID)
//!     → cors.rs (preflight answered here; headers overlaid on the way out)
//!     → server.rs (dispatch: /ping, documents, or proxy)
//!         → documents.rs (reference page, OpenAPI document)
//!         → up-front destination check
//!         → forward.rs (per-hop send through the safe dialer)
//!             → redirect.rs (follow and re-validate 3xx hops)
//!     → Send to client (body streamed)
//! ```

pub mod cors;
pub mod documents;
pub mod forward;
pub mod redirect;
pub mod request;
pub mod server;

pub use forward::{ProxyRequest, RequestForwarder};
pub use redirect::RedirectValidator;
pub use request::X_REQUEST_ID;
pub use server::{HttpServer, ServerError};
