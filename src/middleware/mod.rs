//! The request gate chain.
//!
//! - **Recover**: panics become 500 with `Connection: close`
//! - **Admission**: per-client token bucket, 429 when exhausted
//! - **Authenticate-or-read-only**: bearer token for unsafe methods
//! - **Staff-or-read-only**: staff [`Identity`](crate::Identity) for unsafe methods
//!
//! # Architecture
//!
//! ```text
//! Request → Recover → Trace → CORS → Admission → Authenticate → Staff → Handler
//!              ↓                         ↓             ↓           ↓
//!          500 close                429 Too Many   400/401      401
//! ```
//!
//! Admission runs before authentication so floods of bad tokens are
//! throttled before any signature check. The order is fixed in
//! [`crate::routes::apply_middleware`].

pub mod access;
pub mod admission;
pub mod auth;
pub mod ip;
pub mod recover;
pub mod staff;

pub use access::{AccessPolicy, SAFE_METHODS};
pub use admission::{
    AdmissionError, AdmissionLayer, AdmissionLimiter, AdmissionSettings, Throttled,
};
pub use auth::AuthenticatedOrReadOnly;
pub use ip::{AddressParseError, client_ip, parse_client_address};
pub use recover::recover_layer;
pub use staff::{PERMISSION_DENIED, StaffOrReadOnly};
