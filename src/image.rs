use serde::Serialize;

/// Direct media URLs for one resolved item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImageInfo {
    /// Largest still image offered.
    pub full: Option<String>,
    /// Still image suitable for inline display.
    pub large: Option<String>,
    /// Thumbnail-sized still image.
    pub thumb: Option<String>,
    /// Highest quality video stream, only for video items.
    pub video_full: Option<String>,
    /// Standard quality video stream, only for video items.
    pub video_large: Option<String>,
    /// Video stream meant for mobile clients, only for video items.
    pub video_mobile: Option<String>,
}

impl ImageInfo {
    /// A still image offered in three sizes.
    #[must_use]
    pub fn still(
        full: impl Into<String>,
        large: impl Into<String>,
        thumb: impl Into<String>,
    ) -> Self {
        Self {
            full: Some(full.into()),
            large: Some(large.into()),
            thumb: Some(thumb.into()),
            ..Self::default()
        }
    }

    /// A still image offered in a single size, used for every tier.
    #[must_use]
    pub fn single(url: impl Into<String>) -> Self {
        let url = url.into();
        Self::still(url.clone(), url.clone(), url)
    }

    /// Attach video variants to this item.
    #[must_use]
    pub fn with_video(
        mut self,
        full: Option<String>,
        large: Option<String>,
        mobile: Option<String>,
    ) -> Self {
        self.video_full = full;
        self.video_large = large;
        self.video_mobile = mobile;
        self
    }

    #[must_use]
    pub fn is_video(&self) -> bool {
        self.video_full.is_some() || self.video_large.is_some() || self.video_mobile.is_some()
    }
}
