//! Data models for the Print Power Purpose storefront backend.
//!
//! These models define the JSON wire format consumed by the storefront client.

mod cause;
mod donation;
mod notification;
mod order;
mod quote;

pub use cause::*;
pub use donation::*;
pub use notification::*;
pub use order::*;
pub use quote::*;
