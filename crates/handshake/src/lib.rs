//! Parsing of the NTRIP client handshake and the small set of wire
//! responses the caster can send back (greeting, sourcetable headers,
//! auth failure, capacity failure).
//!
//! This crate only knows about bytes on the wire; it holds no shared state
//! and takes no locks, so it is unit-testable in isolation from the rest of
//! the caster.

pub mod request;
pub mod response;

pub use request::{Credentials, HeaderMap, Method, ParseError, Request};
