use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Reasons a configured URL is rejected.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    #[error("Localhost not allowed")]
    Localhost,
}

/// Validates a feed URL: http(s) only, and never a loopback or private
/// address, since relays would otherwise be asked to reach internal hosts.
///
/// ```
/// use newsdeck::util::validate_feed_url;
///
/// assert!(validate_feed_url("https://arxiv.org/rss/cs.AI").is_ok());
/// assert!(validate_feed_url("http://localhost/feed").is_err());
/// assert!(validate_feed_url("http://10.0.0.7/feed").is_err());
/// assert!(validate_feed_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_feed_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = parse_http(url_str)?;

    if let Some(host) = url.host_str() {
        if host.eq_ignore_ascii_case("localhost") {
            return Err(UrlValidationError::Localhost);
        }
        let bare = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare.parse::<IpAddr>() {
            if ip.is_loopback() {
                return Err(UrlValidationError::Localhost);
            }
            if is_internal(&ip) {
                return Err(UrlValidationError::PrivateIp(ip.to_string()));
            }
        }
    }

    Ok(url)
}

/// Validates a relay template such as `https://corsproxy.io/?`.
///
/// Relays may live anywhere, including a local proxy, so only the scheme
/// is checked.
pub fn validate_relay_template(template: &str) -> Result<Url, UrlValidationError> {
    parse_http(template)
}

fn parse_http(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(UrlValidationError::UnsupportedScheme(other.to_owned())),
    }
}

fn is_internal(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local() || v4.is_unspecified(),
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            // fc00::/7 unique local, fe80::/10 link local
            v6.is_unspecified() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_feed_urls_pass() {
        for url in [
            "https://www.technologyreview.com/topic/artificial-intelligence/feed",
            "http://arxiv.org/rss/cs.LG",
            "https://8.8.8.8/feed",
        ] {
            assert!(validate_feed_url(url).is_ok(), "{url} should be accepted");
        }
    }

    #[test]
    fn test_internal_feed_urls_rejected() {
        assert!(matches!(
            validate_feed_url("http://127.0.0.1:8080/rss"),
            Err(UrlValidationError::Localhost)
        ));
        assert!(matches!(
            validate_feed_url("http://[::1]/rss"),
            Err(UrlValidationError::Localhost)
        ));
        assert!(matches!(
            validate_feed_url("http://192.168.0.10/rss"),
            Err(UrlValidationError::PrivateIp(_))
        ));
        assert!(matches!(
            validate_feed_url("http://[fd00::1]/rss"),
            Err(UrlValidationError::PrivateIp(_))
        ));
    }

    #[test]
    fn test_bad_scheme_rejected() {
        assert!(matches!(
            validate_feed_url("ftp://example.com/feed"),
            Err(UrlValidationError::UnsupportedScheme(s)) if s == "ftp"
        ));
        assert!(matches!(
            validate_feed_url("not a url"),
            Err(UrlValidationError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_relay_templates_allow_local_proxies() {
        assert!(validate_relay_template("https://api.allorigins.win/get?url=").is_ok());
        assert!(validate_relay_template("http://127.0.0.1:8080/?").is_ok());
        assert!(validate_relay_template("gopher://relay/").is_err());
    }
}
