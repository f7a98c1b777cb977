//! Wire Models
//!
//! Request and response shapes for the line-delimited JSON protocol.

pub mod requests;
pub mod responses;

pub use requests::WireRequest;
pub use responses::WireResponse;
