use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse reuse classification of an image's license text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum LicenseClass {
    #[serde(rename = "Public Domain / NCI")]
    PublicDomain,
    #[serde(rename = "Creative Commons")]
    CreativeCommons,
    #[default]
    #[serde(rename = "Restricted / Needs Review")]
    NeedsReview,
}

impl LicenseClass {
    /// Classify free-form metadata text (title, credit, license, ...).
    ///
    /// NCI-produced and public-domain material is checked first, so a page
    /// mentioning both the institute and a CC license counts as public domain.
    pub fn classify(text: &str) -> Self {
        let t = text.to_lowercase();
        // "nci" only as a whole word; it is a substring of e.g. "principle"
        let mentions_nci = t.split(|c: char| !c.is_alphanumeric()).any(|w| w == "nci");
        if mentions_nci
            || t.contains("national cancer institute")
            || t.contains("public domain")
        {
            LicenseClass::PublicDomain
        } else if t.contains("creative commons") || t.contains("cc by") {
            LicenseClass::CreativeCommons
        } else {
            LicenseClass::NeedsReview
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseClass::PublicDomain => "Public Domain / NCI",
            LicenseClass::CreativeCommons => "Creative Commons",
            LicenseClass::NeedsReview => "Restricted / Needs Review",
        }
    }
}

impl fmt::Display for LicenseClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_public_domain() {
        assert_eq!(
            LicenseClass::classify("Source: National Cancer Institute"),
            LicenseClass::PublicDomain
        );
        assert_eq!(LicenseClass::classify("This image is in the PUBLIC DOMAIN"), LicenseClass::PublicDomain);
        assert_eq!(LicenseClass::classify("Credit: NCI / Jane Doe"), LicenseClass::PublicDomain);
    }

    #[test]
    fn test_classify_nci_whole_word_only() {
        assert_eq!(
            LicenseClass::classify("Basic principles of staining"),
            LicenseClass::NeedsReview
        );
    }

    #[test]
    fn test_classify_creative_commons() {
        assert_eq!(
            LicenseClass::classify("Licensed under Creative Commons Attribution 4.0"),
            LicenseClass::CreativeCommons
        );
        assert_eq!(LicenseClass::classify("CC BY-SA"), LicenseClass::CreativeCommons);
    }

    #[test]
    fn test_classify_needs_review() {
        assert_eq!(LicenseClass::classify("All rights reserved"), LicenseClass::NeedsReview);
        assert_eq!(LicenseClass::classify(""), LicenseClass::NeedsReview);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&LicenseClass::PublicDomain).unwrap();
        assert_eq!(json, "\"Public Domain / NCI\"");
        let back: LicenseClass = serde_json::from_str("\"Creative Commons\"").unwrap();
        assert_eq!(back, LicenseClass::CreativeCommons);
    }
}
