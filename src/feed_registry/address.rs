//! Feed URL normalization and validation

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Scheme prefixed to bare IPv4 addresses
pub const DEFAULT_SCHEME: &str = "http://";

/// Dotted quad at the start of the string
static IPV4_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[0-9]{1,3}\.){3}[0-9]{1,3}").expect("valid regex"));

/// Bare IP with optional port and path
static BARE_IP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[0-9]{1,3}\.){3}[0-9]{1,3}(:[0-9]+)?(/[\w.\-~:/?#\[\]@!$&'()*+,;=]*)?$")
        .expect("valid regex")
});

/// Prefix the default scheme onto a bare dotted-quad address
///
/// Anything already carrying http(s) or not starting with an IPv4 address is
/// returned trimmed but otherwise untouched.
pub fn normalize_feed_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("http://")
        && !trimmed.starts_with("https://")
        && IPV4_PREFIX.is_match(trimmed)
    {
        format!("{}{}", DEFAULT_SCHEME, trimmed)
    } else {
        trimmed.to_string()
    }
}

/// Absolute URL or bare IP[:port][/path]
pub fn is_valid_feed_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }
    Url::parse(url).is_ok() || BARE_IP.is_match(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_ip_gets_scheme() {
        assert_eq!(normalize_feed_url("192.168.1.20"), "http://192.168.1.20");
        assert_eq!(
            normalize_feed_url("192.168.1.20:8554/live"),
            "http://192.168.1.20:8554/live"
        );
        assert_eq!(normalize_feed_url(" 10.0.0.1 "), "http://10.0.0.1");
    }

    #[test]
    fn test_existing_scheme_untouched() {
        assert_eq!(normalize_feed_url("https://cam.local/stream"), "https://cam.local/stream");
        assert_eq!(normalize_feed_url("rtsp://10.0.0.5/live"), "rtsp://10.0.0.5/live");
        assert_eq!(normalize_feed_url("camera-host/stream"), "camera-host/stream");
    }

    #[test]
    fn test_validation() {
        assert!(is_valid_feed_url("http://cam1/stream"));
        assert!(is_valid_feed_url("rtsp://172.16.0.3:8554/live/mystream"));
        assert!(is_valid_feed_url("10.0.0.1:8080/video_feed"));
        assert!(!is_valid_feed_url(""));
        assert!(!is_valid_feed_url("not a url"));
        assert!(!is_valid_feed_url("camera-host/stream"));
    }
}
