//! Destination policy subsystem.
//!
//! # Data Flow
//! ```text
//! host / authority / IP
//!     → location.rs (strip port, literal or lookup)
//!     → resolver.rs (fresh lookup, no caching)
//!     → cidr.rs (DisallowedRanges membership)
//!     → blocked / allowed
//! ```
//!
//! # Design Decisions
//! - Fail closed: lookup errors and timeouts block
//! - Ranges are built once and shared read-only
//! - The same policy is consulted up front, at dial time and on every redirect

pub mod cidr;
pub mod location;
pub mod resolver;

pub use cidr::{parse_cidr, CidrParseError, DisallowedRanges, DEFAULT_BLOCKED_CIDRS};
pub use location::{strip_port, LookupError, NetworkPolicy};
pub use resolver::{Resolver, StaticResolver, SystemResolver};
