use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;
use url::{Host, Url};

/// Reasons a URL is refused as a feed source.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum UrlValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
    #[error("Private address not allowed: {0}")]
    PrivateAddress(IpAddr),
    #[error("Localhost not allowed")]
    Localhost,
}

/// Validate a URL a user wants to register as a feed.
///
/// The scraper fetches every registered feed from inside the deployment, so
/// feeds must point at public http(s) hosts. Loopback, private, link-local
/// and unspecified addresses are refused, as is `localhost`. Hostnames are
/// not resolved.
///
/// # Examples
///
/// ```
/// use rssagg::util::validate_feed_url;
///
/// assert!(validate_feed_url("https://example.com/feed.xml").is_ok());
/// assert!(validate_feed_url("http://localhost/feed").is_err());
/// assert!(validate_feed_url("http://10.0.0.8/feed").is_err());
/// assert!(validate_feed_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_feed_url(input: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(input.trim())?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(UrlValidationError::UnsupportedScheme(url.scheme().to_owned()));
    }

    match url.host() {
        None => return Err(UrlValidationError::MissingHost),
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.');
            if domain.eq_ignore_ascii_case("localhost")
                || domain.to_ascii_lowercase().ends_with(".localhost")
            {
                return Err(UrlValidationError::Localhost);
            }
        }
        Some(Host::Ipv4(ip)) => check_ipv4(ip)?,
        Some(Host::Ipv6(ip)) => check_ipv6(ip)?,
    }

    Ok(url)
}

fn check_ipv4(ip: Ipv4Addr) -> Result<(), UrlValidationError> {
    if ip.is_loopback() {
        return Err(UrlValidationError::Localhost);
    }
    if ip.is_private() || ip.is_link_local() || ip.is_unspecified() {
        return Err(UrlValidationError::PrivateAddress(IpAddr::V4(ip)));
    }
    Ok(())
}

fn check_ipv6(ip: Ipv6Addr) -> Result<(), UrlValidationError> {
    if ip.is_loopback() {
        return Err(UrlValidationError::Localhost);
    }
    // IPv4-mapped addresses inherit the IPv4 rules
    if let Some(v4) = ip.to_ipv4_mapped() {
        return check_ipv4(v4);
    }
    let first = ip.segments()[0];
    let unique_local = (first & 0xfe00) == 0xfc00; // fc00::/7
    let link_local = (first & 0xffc0) == 0xfe80; // fe80::/10
    if ip.is_unspecified() || unique_local || link_local {
        return Err(UrlValidationError::PrivateAddress(IpAddr::V6(ip)));
    }
    Ok(())
}
