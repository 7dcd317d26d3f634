//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → headers.rs (drop Origin and framing, remap X-Scalar-Cookie)
//!     → forwarded upstream
//!
//! Upstream response:
//!     → headers.rs (drop Access-Control-* and hop-by-hop)
//!     → CORS layer overlays the proxy's own policy
//! ```
//!
//! # Design Decisions
//! - No trust in upstream CORS declarations
//! - Destination checks live in `policy`; this module only shapes headers

pub mod headers;
