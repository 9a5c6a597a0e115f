//! Request preparation before hosting dispatch.
//!
//! # Responsibilities
//! - Map a public request path onto the application's mount point
//! - Reject paths outside the mount point

use axum::http::uri::{PathAndQuery, Uri};
use percent_encoding::percent_decode_str;

/// Remove the application mount point from `uri`.
///
/// Returns `None` when the path lies outside the mount point. A root mount
/// (`/`) accepts everything unchanged.
pub fn strip_application_path(uri: &Uri, application_path: &str) -> Option<Uri> {
    let mount = application_path.trim_end_matches('/');
    if mount.is_empty() {
        return Some(uri.clone());
    }

    let path = uri.path();
    let mount_len = mounted_prefix_len(path, mount)?;
    let rest = &path[mount_len..];
    let rest = if rest.is_empty() { "/" } else { rest };

    let path_and_query = match uri.query() {
        Some(query) => format!("{rest}?{query}"),
        None => rest.to_string(),
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(path_and_query).ok()?);
    Uri::from_parts(parts).ok()
}

/// Length of the raw (percent-encoded) prefix of `path` that spells out
/// `mount` segment by segment.
///
/// The mount is configured decoded while request paths arrive encoded, so
/// each raw segment is decoded before comparison. The remainder is left
/// encoded for the application.
fn mounted_prefix_len(path: &str, mount: &str) -> Option<usize> {
    let mut raw_segments = path.split('/');
    let mut len = 0;
    for (i, expected) in mount.split('/').enumerate() {
        let segment = raw_segments.next()?;
        if percent_decode_str(segment).decode_utf8().ok()? != expected {
            return None;
        }
        len += segment.len() + usize::from(i > 0);
    }
    Some(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(uri: &str, mount: &str) -> Option<String> {
        strip_application_path(&uri.parse().unwrap(), mount).map(|u| u.to_string())
    }

    #[test]
    fn root_mount_is_identity() {
        assert_eq!(strip("/a/b?c=d", "/").as_deref(), Some("/a/b?c=d"));
    }

    #[test]
    fn mount_prefix_is_removed() {
        assert_eq!(strip("/shop/cart?id=1", "/shop").as_deref(), Some("/cart?id=1"));
        assert_eq!(strip("/shop/cart", "/shop/").as_deref(), Some("/cart"));
        assert_eq!(strip("/shop", "/shop").as_deref(), Some("/"));
    }

    #[test]
    fn outside_mount_is_rejected() {
        assert!(strip("/shopping", "/shop").is_none());
        assert!(strip("/other", "/shop").is_none());
    }

    #[test]
    fn unicode_mount_matches_encoded_path() {
        let mount = "/МоёПриложение";
        let encoded = "/%D0%9C%D0%BE%D1%91%D0%9F%D1%80%D0%B8%D0%BB%D0%BE%D0%B6%D0%B5%D0%BD%D0%B8%D0%B5";

        assert_eq!(strip(&format!("{encoded}/ServerAddresses"), mount).as_deref(), Some("/ServerAddresses"));
        assert_eq!(strip(encoded, mount).as_deref(), Some("/"));
        // lowercase hex is the same segment
        assert_eq!(strip(&encoded.to_lowercase(), mount).as_deref(), Some("/"));
        assert!(strip(&format!("{encoded}x/a"), mount).is_none());
    }

    #[test]
    fn remainder_stays_encoded() {
        assert_eq!(strip("/shop/a%20b?q=%41", "/shop").as_deref(), Some("/a%20b?q=%41"));
        assert_eq!(strip("/sh%6Fp/cart", "/shop").as_deref(), Some("/cart"));
    }

    #[test]
    fn absolute_form_keeps_authority() {
        assert_eq!(
            strip("https://localhost:5001/shop/x", "/shop").as_deref(),
            Some("https://localhost:5001/x")
        );
    }
}
