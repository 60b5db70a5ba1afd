use axum::http::HeaderMap;
use std::net::IpAddr;

/// Client IP from proxy headers, falling back to the transport address.
///
/// Order: first entry of `X-Forwarded-For`, then `X-Real-IP`, then `fallback`,
/// then loopback.
pub fn extract_ip_from_headers(headers: &HeaderMap, fallback: Option<IpAddr>) -> IpAddr {
    if let Some(h) = headers.get("x-forwarded-for").and_then(|hv| hv.to_str().ok()) {
        if let Some(first) = h.split(',').next() {
            if let Ok(ip) = first.trim().parse::<IpAddr>() {
                return ip;
            }
        }
    }
    if let Some(h) = headers.get("x-real-ip").and_then(|hv| hv.to_str().ok()) {
        if let Ok(ip) = h.trim().parse::<IpAddr>() {
            return ip;
        }
    }
    fallback.unwrap_or(IpAddr::from([127, 0, 0, 1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_forwarded_for_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(extract_ip_from_headers(&headers, None), "203.0.113.7".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_fallbacks() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("garbage"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(extract_ip_from_headers(&headers, None), "198.51.100.2".parse::<IpAddr>().unwrap());

        let empty = HeaderMap::new();
        let remote: IpAddr = "192.0.2.9".parse().unwrap();
        assert_eq!(extract_ip_from_headers(&empty, Some(remote)), remote);
        assert_eq!(extract_ip_from_headers(&empty, None), IpAddr::from([127, 0, 0, 1]));
    }
}
