//! Screenshot family assignment.
//!
//! Uploads are turned into family identifiers as soon as the information
//! step is saved. Resizing and storage of the images happen elsewhere; this
//! module only names the family a set of images belongs to.

use twox_hash::XxHash64;

/// Turns an uploaded image into a screenshot family identifier.
pub trait ScreenshotProcessor {
    /// Family for `image`, or `None` if the upload is empty.
    fn family_for(&mut self, image: &[u8]) -> Option<String>;
}

/// Content-addressed families: identical images share a family.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentHashFamilies;

impl ScreenshotProcessor for ContentHashFamilies {
    fn family_for(&mut self, image: &[u8]) -> Option<String> {
        if image.is_empty() {
            return None;
        }
        Some(format!("{:016x}", XxHash64::oneshot(0, image)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn identical_images_share_a_family() {
        let mut families = ContentHashFamilies;
        let first = families.family_for(b"png bytes").expect("family");
        assert_eq!(first.len(), 16);
        assert_eq!(families.family_for(b"png bytes"), Some(first.clone()));
        assert_ne!(families.family_for(b"other bytes"), Some(first));
    }

    #[rstest]
    fn empty_uploads_are_skipped() {
        assert_eq!(ContentHashFamilies.family_for(&[]), None);
    }
}
