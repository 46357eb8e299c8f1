//! Domain models for storefront.
//!
//! The storefront is almost stateless: the commerce backend owns the cart
//! aggregate and the optimistic engine in [`crate::cart`] holds only
//! in-memory reconciliation state. What remains here is the small set of
//! values persisted in the visitor's session.

pub mod session;
