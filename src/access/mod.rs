//! Access control for the HTTP surface: the persisted token store, the
//! source-network check, and per-IP rate limiting.

mod rate_limit;
mod store;

pub use rate_limit::RateLimiter;
pub use store::{INVITATION_TTL_HOURS, Invitation, TokenStore};

use crate::env;
use once_cell::sync::Lazy;
use std::net::IpAddr;
use std::time::Duration;

pub static TOKENS: Lazy<TokenStore> =
    Lazy::new(|| TokenStore::open(&env::HELL_DB_PATH).expect("Error opening token store"));

/// Invitation and token issuance allow at most 5 requests per minute per IP.
pub static INVITE_LIMITER: Lazy<RateLimiter> =
    Lazy::new(|| RateLimiter::new(5, Duration::from_secs(60)));

/// Credential endpoints only answer loopback and RFC1918 sources.
pub fn is_local_network(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private(),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6
                    .to_ipv4_mapped()
                    .map(|v4| v4.is_loopback() || v4.is_private())
                    .unwrap_or(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_network_check() {
        assert!(is_local_network("127.0.0.1".parse().unwrap()));
        assert!(is_local_network("10.1.2.3".parse().unwrap()));
        assert!(is_local_network("192.168.0.17".parse().unwrap()));
        assert!(is_local_network("172.16.5.5".parse().unwrap()));
        assert!(is_local_network("::1".parse().unwrap()));
        assert!(is_local_network("::ffff:192.168.1.1".parse().unwrap()));

        assert!(!is_local_network("8.8.8.8".parse().unwrap()));
        assert!(!is_local_network("172.32.0.1".parse().unwrap()));
        assert!(!is_local_network("2001:db8::1".parse().unwrap()));
    }
}
