//! Client address derivation for admission control.
//!
//! The raw client address is taken, in order, from:
//!
//! 1. `X-Forwarded-For` (first entry), as set by the fronting proxy
//! 2. `X-Real-IP`
//! 3. The TCP peer address (`ConnectInfo<SocketAddr>`)
//!
//! How the raw text is parsed depends on [`Mode`]:
//!
//! - **Development**: `ip:port` is accepted and the port stripped; a bare IP
//!   is accepted too
//! - **Production**: the text must already be a bare IP
//!
//! A production deployment that is not behind a proxy therefore sees
//! `ip:port` peer addresses and fails every request with 500. That is a
//! deployment mismatch, not a client error.
//!
//! # Security Warning: IP Spoofing Risk
//!
//! **Proxy headers are client-controlled.** Deploy behind a reverse proxy that
//! overwrites (not appends to) them, and block direct access to the service:
//!
//! ```nginx
//! proxy_set_header X-Real-IP $remote_addr;
//! proxy_set_header X-Forwarded-For $remote_addr;
//! ```

use std::borrow::Cow;
use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::Request;
use thiserror::Error;

use crate::config::Mode;

/// The client address could not be turned into an IP.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    #[error("couldn't parse client address {0:?}")]
    Invalid(String),

    #[error("no client address available on the request")]
    Missing,
}

/// Where the raw client address came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawAddress<'a> {
    /// First entry of X-Forwarded-For.
    FromXff(&'a str),
    /// X-Real-IP header.
    FromRealIp(&'a str),
    /// TCP peer address.
    FromPeer(SocketAddr),
    NotFound,
}

#[inline]
fn raw_client_address<B>(req: &Request<B>) -> RawAddress<'_> {
    // Format: "client, proxy1, proxy2" - we want the first (client) entry
    if let Some(forwarded) = req.headers().get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first) = value.split(',').next()
    {
        return RawAddress::FromXff(first.trim());
    }

    if let Some(real_ip) = req.headers().get("x-real-ip")
        && let Ok(value) = real_ip.to_str()
    {
        return RawAddress::FromRealIp(value.trim());
    }

    if let Some(ConnectInfo(peer)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return RawAddress::FromPeer(*peer);
    }

    RawAddress::NotFound
}

/// Raw client address text, before mode-dependent parsing.
///
/// Used for logging; returns `"unknown"` without allocating when nothing is
/// available.
pub fn raw_client_address_text<B>(req: &Request<B>) -> Cow<'static, str> {
    match raw_client_address(req) {
        RawAddress::FromXff(raw) | RawAddress::FromRealIp(raw) => Cow::Owned(raw.to_string()),
        RawAddress::FromPeer(peer) => Cow::Owned(peer.to_string()),
        RawAddress::NotFound => Cow::Borrowed("unknown"),
    }
}

/// Derive the client IP for a request.
///
/// # Errors
///
/// [`AddressParseError`] if no address is available or it does not parse
/// under `mode`.
pub fn client_ip<B>(req: &Request<B>, mode: Mode) -> Result<IpAddr, AddressParseError> {
    match raw_client_address(req) {
        RawAddress::FromXff(raw) | RawAddress::FromRealIp(raw) => parse_client_address(raw, mode),
        RawAddress::FromPeer(peer) => parse_client_address(&peer.to_string(), mode),
        RawAddress::NotFound => Err(AddressParseError::Missing),
    }
}

/// Parse raw address text into an IP according to `mode`.
pub fn parse_client_address(raw: &str, mode: Mode) -> Result<IpAddr, AddressParseError> {
    let parsed = match mode {
        Mode::Development => raw
            .parse::<SocketAddr>()
            .map(|addr| addr.ip())
            .or_else(|_| raw.parse::<IpAddr>()),
        Mode::Production => raw.parse::<IpAddr>(),
    };

    parsed.map_err(|_| AddressParseError::Invalid(raw.to_string()))
}
