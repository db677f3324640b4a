//! URL parsing utilities for page detection and identifier extraction
//!
//! These functions avoid allocations and work directly on string slices.

use crate::types::PageKind;

const SPACE_HOST: &str = "//space.bilibili.com/";
const VIDEO_PREFIX: &str = "//www.bilibili.com/video/";

const PROFILE_PAGE: &str = "https://space.bilibili.com/";
const HOME_PAGE: &str = "https://www.bilibili.com/";
const POPULAR_PAGE: &str = "https://www.bilibili.com/v/popular/all/";

// =============================================================================
// Page Detection
// =============================================================================

/// Select the page kind for the current page URL.
///
/// Returns `None` for pages the engine does not run on.
pub fn page_kind(url: &str) -> Option<PageKind> {
    if url.starts_with(PROFILE_PAGE) {
        return Some(PageKind::Profile);
    }

    if let Some(rest) = url.strip_prefix(HOME_PAGE) {
        if rest.starts_with("video/BV") || rest.starts_with("video/av") {
            return Some(PageKind::Video);
        }
        if url.starts_with(POPULAR_PAGE) {
            return Some(PageKind::Popular);
        }
        if rest.is_empty() || rest.starts_with('?') {
            return Some(PageKind::Home);
        }
    }

    None
}

/// Subject id of the profile page being viewed.
///
/// Takes the first path segment after the space host, stopping at `/` or `?`.
pub fn profile_subject(url: &str) -> Option<&str> {
    let rest = url.strip_prefix(PROFILE_PAGE)?;
    let end = rest
        .bytes()
        .position(|b| b == b'/' || b == b'?' || b == b'#')
        .unwrap_or(rest.len());
    let mid = &rest[..end];
    if mid.is_empty() {
        None
    } else {
        Some(mid)
    }
}

// =============================================================================
// Link Parsing
// =============================================================================

/// Extract the numeric user id from a space link such as
/// `//space.bilibili.com/123456/` or `https://space.bilibili.com/123456?from=x`.
pub fn space_mid(href: &str) -> Option<&str> {
    let start = href.find(SPACE_HOST)? + SPACE_HOST.len();
    let rest = &href[start..];
    let len = leading_len(rest.as_bytes(), |b| b.is_ascii_digit());
    if len == 0 {
        return None;
    }
    Some(&rest[..len])
}

/// Extract the `BV...` video id from a video link such as
/// `//www.bilibili.com/video/BV1xx411c7mD/`.
pub fn video_bv(href: &str) -> Option<&str> {
    let start = href.find(VIDEO_PREFIX)? + VIDEO_PREFIX.len();
    let rest = &href[start..];
    let tail = rest.strip_prefix("BV")?;
    let len = leading_len(tail.as_bytes(), |b| b.is_ascii_alphanumeric());
    if len == 0 {
        return None;
    }
    Some(&rest[..2 + len])
}

#[inline]
fn leading_len(bytes: &[u8], accept: impl Fn(u8) -> bool) -> usize {
    bytes.iter().take_while(|&&b| accept(b)).count()
}

// =============================================================================
// Service URLs
// =============================================================================

/// Join the service base URL and an endpoint path without doubling slashes.
pub fn join_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{}/{}", base, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_kind() {
        assert_eq!(page_kind("https://space.bilibili.com/123"), Some(PageKind::Profile));
        assert_eq!(page_kind("https://www.bilibili.com/video/BV1xx411c7mD"), Some(PageKind::Video));
        assert_eq!(page_kind("https://www.bilibili.com/video/av170001"), Some(PageKind::Video));
        assert_eq!(page_kind("https://www.bilibili.com/v/popular/all/?spm=1"), Some(PageKind::Popular));
        assert_eq!(page_kind("https://www.bilibili.com/"), Some(PageKind::Home));
        assert_eq!(page_kind("https://www.bilibili.com/?spm_id_from=333"), Some(PageKind::Home));
        assert_eq!(page_kind("https://www.bilibili.com/anime/"), None);
        assert_eq!(page_kind("https://www.bilibili.com/v/popular/rank/all"), None);
        assert_eq!(page_kind("https://example.com/"), None);
    }

    #[test]
    fn test_profile_subject() {
        assert_eq!(profile_subject("https://space.bilibili.com/4567"), Some("4567"));
        assert_eq!(profile_subject("https://space.bilibili.com/4567/video"), Some("4567"));
        assert_eq!(profile_subject("https://space.bilibili.com/4567?spm=x"), Some("4567"));
        assert_eq!(profile_subject("https://space.bilibili.com/"), None);
        assert_eq!(profile_subject("https://www.bilibili.com/"), None);
    }

    #[test]
    fn test_space_mid() {
        assert_eq!(space_mid("//space.bilibili.com/123456"), Some("123456"));
        assert_eq!(space_mid("//space.bilibili.com/123456/"), Some("123456"));
        assert_eq!(space_mid("https://space.bilibili.com/42?from=feed"), Some("42"));
        assert_eq!(space_mid("//space.bilibili.com/abc"), None);
        assert_eq!(space_mid("//www.bilibili.com/video/BV1"), None);
    }

    #[test]
    fn test_video_bv() {
        assert_eq!(video_bv("//www.bilibili.com/video/BV1xx411c7mD/"), Some("BV1xx411c7mD"));
        assert_eq!(video_bv("https://www.bilibili.com/video/BV123?p=2"), Some("BV123"));
        assert_eq!(video_bv("//www.bilibili.com/video/av170001"), None);
        assert_eq!(video_bv("//www.bilibili.com/video/BV"), None);
    }

    #[test]
    fn test_join_endpoint() {
        assert_eq!(join_endpoint("http://127.0.0.1:22332", "/block"), "http://127.0.0.1:22332/block");
        assert_eq!(join_endpoint("http://127.0.0.1:22332/", "block"), "http://127.0.0.1:22332/block");
    }
}
