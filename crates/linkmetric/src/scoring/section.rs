use serde::{Deserialize, Serialize};

/// Every section is scored out of this maximum.
pub const MAX_SECTION_SCORE: u8 = 10;

/// The twelve fixed profile-quality dimensions. `ordered()` is the canonical
/// output order everywhere a report or comparison lists sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Experience,
    About,
    Headline,
    ProfilePhoto,
    Education,
    Skills,
    Connections,
    Followers,
    CoverPhoto,
    Certifications,
    Verified,
    Premium,
}

impl Section {
    pub fn ordered() -> [Section; 12] {
        [
            Section::Experience,
            Section::About,
            Section::Headline,
            Section::ProfilePhoto,
            Section::Education,
            Section::Skills,
            Section::Connections,
            Section::Followers,
            Section::CoverPhoto,
            Section::Certifications,
            Section::Verified,
            Section::Premium,
        ]
    }

    /// Fixed weighting policy. The weights sum to exactly 100.
    pub fn weight(self) -> u8 {
        match self {
            Section::Experience => 20,
            Section::About => 15,
            Section::Headline => 10,
            Section::ProfilePhoto => 10,
            Section::Education => 10,
            Section::Skills => 10,
            Section::Connections => 5,
            Section::Followers => 5,
            Section::CoverPhoto => 5,
            Section::Certifications => 5,
            Section::Verified => 3,
            Section::Premium => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Section::Experience => "Experience",
            Section::About => "About",
            Section::Headline => "Headline",
            Section::ProfilePhoto => "Profile Photo",
            Section::Education => "Education",
            Section::Skills => "Skills",
            Section::Connections => "Connections",
            Section::Followers => "Followers",
            Section::CoverPhoto => "Cover Photo",
            Section::Certifications => "Certifications",
            Section::Verified => "Verified",
            Section::Premium => "Premium",
        }
    }
}

/// Qualitative banding of a section score, derived from its ratio to the
/// maximum: at least 0.7 is optimized, at least 0.4 needs improvement, the
/// rest is critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    Optimized,
    NeedsImprovement,
    Critical,
}

impl SectionStatus {
    pub fn from_score(score: u8) -> Self {
        let ratio = f64::from(score) / f64::from(MAX_SECTION_SCORE);
        if ratio >= 0.7 {
            SectionStatus::Optimized
        } else if ratio >= 0.4 {
            SectionStatus::NeedsImprovement
        } else {
            SectionStatus::Critical
        }
    }
}
