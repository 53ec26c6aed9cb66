//! Wire-level types shared between the session core and the backend gateway.

pub mod domain;
pub mod error;
pub mod protocol;
