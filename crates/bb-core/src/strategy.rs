//! Page strategies
//!
//! A strategy knows how entries look on one page layout: which selector
//! lists them, how to pull an identifier and author name out of an entry,
//! and which lookup call shape the service should get.

use crate::host::EntryView;
use crate::types::{EntryIdentity, IdKind, LookupShape, PageKind};
use crate::url::{page_kind, profile_subject, space_mid, video_bv};

pub trait PageStrategy: Send + Sync {
    fn kind(&self) -> PageKind;

    /// Selector listing the entries to filter. `None` on pages without a feed.
    fn entry_selector(&self) -> Option<&'static str>;

    fn id_kind(&self) -> IdKind;

    fn shape(&self) -> LookupShape;

    /// Resolve an entry's identifier and author name.
    fn extract(&self, entry: &dyn EntryView) -> Option<EntryIdentity>;

    /// Subject the page is about, for pages with a block toggle.
    fn current_subject(&self) -> Option<&str> {
        None
    }

    /// Page-level selector holding the current subject's display name.
    fn subject_name_selector(&self) -> Option<&'static str> {
        None
    }
}

/// Pick the strategy for a page URL.
pub fn for_url(url: &str) -> Option<Box<dyn PageStrategy>> {
    let strategy: Box<dyn PageStrategy> = match page_kind(url)? {
        PageKind::Profile => Box::new(ProfilePage {
            subject: profile_subject(url).map(str::to_string),
        }),
        PageKind::Video => Box::new(VideoSidebar),
        PageKind::Popular => Box::new(PopularFeed),
        PageKind::Home => Box::new(HomeFeed),
    };
    Some(strategy)
}

fn non_empty(text: Option<String>) -> Option<String> {
    let text = text?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// =============================================================================
// Home Feed
// =============================================================================

pub struct HomeFeed;

impl HomeFeed {
    pub const ENTRY: &'static str = ".bili-video-card";
    pub const OWNER_LINK: &'static str = ".bili-video-card__wrap>.bili-video-card__info>.bili-video-card__info--right>.bili-video-card__info--bottom>a";
    pub const AUTHOR: &'static str = ".bili-video-card__wrap>.bili-video-card__info>.bili-video-card__info--right>.bili-video-card__info--bottom>.bili-video-card__info--owner>.bili-video-card__info--author";
}

impl PageStrategy for HomeFeed {
    fn kind(&self) -> PageKind {
        PageKind::Home
    }

    fn entry_selector(&self) -> Option<&'static str> {
        Some(Self::ENTRY)
    }

    fn id_kind(&self) -> IdKind {
        IdKind::Subject
    }

    fn shape(&self) -> LookupShape {
        LookupShape::Batched
    }

    fn extract(&self, entry: &dyn EntryView) -> Option<EntryIdentity> {
        let href = entry.attr(Self::OWNER_LINK, "href")?;
        let mid = space_mid(&href)?;
        let name = non_empty(entry.text(Self::AUTHOR))?;
        Some(EntryIdentity::new(mid, name))
    }
}

// =============================================================================
// Popular Feed
// =============================================================================

/// Trending feed. Cards only link the video, so the content id is
/// verified and the owner is learned from the response.
pub struct PopularFeed;

impl PopularFeed {
    pub const ENTRY: &'static str = ".video-card";
    pub const VIDEO_LINK: &'static str = ".video-card__content>a";
    pub const AUTHOR: &'static str = ".video-card__info>div>.up-name>.up-name__text";
}

impl PageStrategy for PopularFeed {
    fn kind(&self) -> PageKind {
        PageKind::Popular
    }

    fn entry_selector(&self) -> Option<&'static str> {
        Some(Self::ENTRY)
    }

    fn id_kind(&self) -> IdKind {
        IdKind::Content
    }

    fn shape(&self) -> LookupShape {
        LookupShape::Batched
    }

    fn extract(&self, entry: &dyn EntryView) -> Option<EntryIdentity> {
        let href = entry.attr(Self::VIDEO_LINK, "href")?;
        let bv = video_bv(&href)?;
        let name = non_empty(entry.text(Self::AUTHOR))?;
        Some(EntryIdentity::new(bv, name))
    }
}

// =============================================================================
// Video Sidebar
// =============================================================================

pub struct VideoSidebar;

impl VideoSidebar {
    pub const ENTRY: &'static str = ".video-page-card-small,.video-page-operator-card-small";
    pub const OWNER_LINK: &'static str = ".card-box>.info>.upname>a";
    pub const AUTHOR: &'static str = ".card-box>.info>.upname>a>.name";
}

impl PageStrategy for VideoSidebar {
    fn kind(&self) -> PageKind {
        PageKind::Video
    }

    fn entry_selector(&self) -> Option<&'static str> {
        Some(Self::ENTRY)
    }

    fn id_kind(&self) -> IdKind {
        IdKind::Subject
    }

    fn shape(&self) -> LookupShape {
        LookupShape::Batched
    }

    fn extract(&self, entry: &dyn EntryView) -> Option<EntryIdentity> {
        let href = entry.attr(Self::OWNER_LINK, "href")?;
        let mid = space_mid(&href)?;
        let name = non_empty(entry.text(Self::AUTHOR))?;
        Some(EntryIdentity::new(mid, name))
    }
}

// =============================================================================
// Profile Page
// =============================================================================

/// A user's space page. There is no feed to filter; the page subject is
/// checked with a single lookup to drive the block toggle.
pub struct ProfilePage {
    subject: Option<String>,
}

impl ProfilePage {
    pub const NAME: &'static str = "#h-name";
    pub const TOGGLE_ANCHOR: &'static str = ".h>.wrapper>.h-inner>.h-action";
}

impl PageStrategy for ProfilePage {
    fn kind(&self) -> PageKind {
        PageKind::Profile
    }

    fn entry_selector(&self) -> Option<&'static str> {
        None
    }

    fn id_kind(&self) -> IdKind {
        IdKind::Subject
    }

    fn shape(&self) -> LookupShape {
        LookupShape::Single
    }

    fn extract(&self, _entry: &dyn EntryView) -> Option<EntryIdentity> {
        None
    }

    fn current_subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    fn subject_name_selector(&self) -> Option<&'static str> {
        Some(Self::NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{FixtureEntry, MemoryHost};
    use crate::host::PageHost;

    fn extract_first(strategy: &dyn PageStrategy, entry: FixtureEntry) -> Option<EntryIdentity> {
        let host = MemoryHost::from_entries(vec![entry]);
        let entries = host.entries("");
        strategy.extract(&entries[0])
    }

    #[test]
    fn test_for_url_selects_strategy() {
        assert_eq!(for_url("https://www.bilibili.com/").unwrap().kind(), PageKind::Home);
        assert_eq!(
            for_url("https://www.bilibili.com/v/popular/all/").unwrap().id_kind(),
            IdKind::Content
        );
        let profile = for_url("https://space.bilibili.com/99/dynamic").unwrap();
        assert_eq!(profile.current_subject(), Some("99"));
        assert_eq!(profile.shape(), LookupShape::Single);
        assert!(profile.entry_selector().is_none());
        assert!(for_url("https://live.bilibili.com/1").is_none());
    }

    #[test]
    fn test_home_feed_extract() {
        let entry = FixtureEntry::new("card")
            .with_attr(HomeFeed::OWNER_LINK, "href", "//space.bilibili.com/123")
            .with_text(HomeFeed::AUTHOR, " someone ");
        assert_eq!(
            extract_first(&HomeFeed, entry),
            Some(EntryIdentity::new("123", "someone"))
        );
    }

    #[test]
    fn test_home_feed_skips_ads() {
        // Promoted cards link elsewhere
        let entry = FixtureEntry::new("ad")
            .with_attr(HomeFeed::OWNER_LINK, "href", "https://cm.bilibili.com/x")
            .with_text(HomeFeed::AUTHOR, "ad");
        assert_eq!(extract_first(&HomeFeed, entry), None);

        let entry = FixtureEntry::new("no-name")
            .with_attr(HomeFeed::OWNER_LINK, "href", "//space.bilibili.com/1");
        assert_eq!(extract_first(&HomeFeed, entry), None);
    }

    #[test]
    fn test_popular_feed_extract() {
        let entry = FixtureEntry::new("card")
            .with_attr(PopularFeed::VIDEO_LINK, "href", "//www.bilibili.com/video/BV1xx411c7mD")
            .with_text(PopularFeed::AUTHOR, "uploader");
        assert_eq!(
            extract_first(&PopularFeed, entry),
            Some(EntryIdentity::new("BV1xx411c7mD", "uploader"))
        );
    }

    #[test]
    fn test_video_sidebar_extract() {
        let entry = FixtureEntry::new("card")
            .with_attr(VideoSidebar::OWNER_LINK, "href", "//space.bilibili.com/8047632/")
            .with_text(VideoSidebar::AUTHOR, "up");
        assert_eq!(
            extract_first(&VideoSidebar, entry),
            Some(EntryIdentity::new("8047632", "up"))
        );
    }
}
