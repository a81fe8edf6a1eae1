//! Source descriptors read from persisted tags.
//!
//! A written blueprint carries its dimensions and exactly one payload source
//! in a persisted tag with fixed field names:
//!
//! | field   | type    | meaning                            |
//! |---------|---------|------------------------------------|
//! | `xSize` | integer | width                              |
//! | `ySize` | integer | height                             |
//! | `zSize` | integer | depth                              |
//! | `data`  | bytes   | embedded payload                   |
//! | `url`   | string  | remote or `file://` payload source |
//!
//! [`BlueprintTag`] mirrors that tag and (de)serializes with those names.
//! Objects holding a tag implement [`TagHolder`]; their identity is what the
//! embedded cache keys on.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Tag field holding the width.
pub const SIZE_X: &str = "xSize";
/// Tag field holding the height.
pub const SIZE_Y: &str = "ySize";
/// Tag field holding the depth.
pub const SIZE_Z: &str = "zSize";
/// Tag field holding embedded payload bytes.
pub const DATA: &str = "data";
/// Tag field holding the payload URL.
pub const URL: &str = "url";

/// Persisted blueprint tag.
///
/// ```
/// use blueprint_core::{BlueprintTag, Source};
///
/// let tag = BlueprintTag::remote((4, 2, 4), "https://example.com/house.bp");
/// assert!(tag.has_dimensions());
/// assert_eq!(tag.source(), Some(Source::Url("https://example.com/house.bp")));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlueprintTag {
    /// Width.
    #[serde(rename = "xSize", default, skip_serializing_if = "Option::is_none")]
    pub x_size: Option<i32>,
    /// Height.
    #[serde(rename = "ySize", default, skip_serializing_if = "Option::is_none")]
    pub y_size: Option<i32>,
    /// Depth.
    #[serde(rename = "zSize", default, skip_serializing_if = "Option::is_none")]
    pub z_size: Option<i32>,
    /// Embedded payload bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
    /// Payload URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl BlueprintTag {
    /// Tag with dimensions and embedded payload bytes.
    pub fn embedded(size: (i32, i32, i32), data: impl Into<Bytes>) -> Self {
        Self {
            data: Some(data.into()),
            ..Self::sized(size)
        }
    }

    /// Tag with dimensions and a payload URL.
    pub fn remote(size: (i32, i32, i32), url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::sized(size)
        }
    }

    fn sized((x, y, z): (i32, i32, i32)) -> Self {
        Self {
            x_size: Some(x),
            y_size: Some(y),
            z_size: Some(z),
            ..Self::default()
        }
    }

    /// `true` if all three size fields are present.
    pub fn has_dimensions(&self) -> bool {
        self.x_size.is_some() && self.y_size.is_some() && self.z_size.is_some()
    }

    /// Dimensions, with missing fields read as `0`.
    pub fn dimensions(&self) -> (i32, i32, i32) {
        (
            self.x_size.unwrap_or_default(),
            self.y_size.unwrap_or_default(),
            self.z_size.unwrap_or_default(),
        )
    }

    /// The payload source. Embedded data wins over a URL.
    pub fn source(&self) -> Option<Source<'_>> {
        if let Some(data) = &self.data {
            return Some(Source::Embedded(data));
        }
        self.url.as_deref().map(Source::Url)
    }
}

/// Where a payload comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source<'a> {
    /// Bytes stored inline in the tag.
    Embedded(&'a Bytes),
    /// URL to fetch, remote or `file://`.
    Url(&'a str),
}

/// An object that may carry a [`BlueprintTag`].
///
/// The object's identity (its `Arc` allocation) owns any record resolved from
/// embedded data, so two holders with identical bytes get two records.
pub trait TagHolder: Send + Sync + 'static {
    /// The persisted tag, if the object has one.
    fn tag(&self) -> Option<&BlueprintTag>;

    /// Placement size: the tag's dimensions, or `(1, 1, 1)` without a tag.
    fn dimensions(&self) -> (i32, i32, i32) {
        self.tag()
            .map(BlueprintTag::dimensions)
            .unwrap_or((1, 1, 1))
    }
}

impl TagHolder for BlueprintTag {
    fn tag(&self) -> Option<&BlueprintTag> {
        Some(self)
    }
}

impl TagHolder for Option<BlueprintTag> {
    fn tag(&self) -> Option<&BlueprintTag> {
        self.as_ref()
    }
}
