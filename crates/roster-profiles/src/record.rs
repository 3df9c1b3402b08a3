//! Profile record model.
//!
//! A [`ProfileRecord`] is one row of the roster: 19 optional text columns in a
//! fixed order. Null and the empty string are distinct values.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ProfileError, Result};

/// Column of the profile roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileField {
    /// Canonical profile URL.
    ProfileUrl,
    /// Contributor username.
    Username,
    /// Member classification.
    MemberType,
    /// GitHub identity.
    GithubUrl,
    /// LinkedIn identity.
    LinkedinUrl,
    /// Discord handles.
    DiscordUsernames,
    /// Opaque analysis output.
    AnalysisResult,
    /// GitHub crawl status.
    GithubCrawlStatus,
    /// Last GitHub crawl attempt.
    LastAttemptedAt,
    /// Last GitHub extraction error.
    GithubExtractionError,
    /// Last successful GitHub crawl.
    GithubCrawledAt,
    /// Opaque GitHub metadata.
    GithubMetadata,
    /// LinkedIn crawl status.
    LinkedinCrawlStatus,
    /// Last LinkedIn crawl.
    LastCrawledAt,
    /// Opaque LinkedIn metadata.
    LinkedinMetadata,
    /// Facebook identity.
    FacebookUrl,
    /// Mochi identity.
    Mochi,
    /// Mochi crawl status.
    MochiProfileCrawlStatus,
    /// Opaque Mochi metadata.
    MochiProfileMetadata,
}

impl ProfileField {
    /// Every column, in file order.
    pub const ALL: [Self; 19] = [
        Self::ProfileUrl,
        Self::Username,
        Self::MemberType,
        Self::GithubUrl,
        Self::LinkedinUrl,
        Self::DiscordUsernames,
        Self::AnalysisResult,
        Self::GithubCrawlStatus,
        Self::LastAttemptedAt,
        Self::GithubExtractionError,
        Self::GithubCrawledAt,
        Self::GithubMetadata,
        Self::LinkedinCrawlStatus,
        Self::LastCrawledAt,
        Self::LinkedinMetadata,
        Self::FacebookUrl,
        Self::Mochi,
        Self::MochiProfileCrawlStatus,
        Self::MochiProfileMetadata,
    ];

    /// Returns the column name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ProfileUrl => "profile_url",
            Self::Username => "username",
            Self::MemberType => "member_type",
            Self::GithubUrl => "github_url",
            Self::LinkedinUrl => "linkedin_url",
            Self::DiscordUsernames => "discord_usernames",
            Self::AnalysisResult => "analysis_result",
            Self::GithubCrawlStatus => "github_crawl_status",
            Self::LastAttemptedAt => "last_attempted_at",
            Self::GithubExtractionError => "github_extraction_error",
            Self::GithubCrawledAt => "github_crawled_at",
            Self::GithubMetadata => "github_metadata",
            Self::LinkedinCrawlStatus => "linkedin_crawl_status",
            Self::LastCrawledAt => "last_crawled_at",
            Self::LinkedinMetadata => "linkedin_metadata",
            Self::FacebookUrl => "facebook_url",
            Self::Mochi => "mochi",
            Self::MochiProfileCrawlStatus => "mochi_profile_crawl_status",
            Self::MochiProfileMetadata => "mochi_profile_metadata",
        }
    }
}

impl fmt::Display for ProfileField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProfileField {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|field| field.name() == s)
            .ok_or_else(|| ProfileError::schema(format!("unknown profile field '{s}'")))
    }
}

/// Opaque metadata text stored by crawlers.
///
/// The store never looks inside; consumers decode on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawMetadata(String);

impl RawMetadata {
    /// Wraps a metadata value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decodes the metadata as JSON into `T`.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::Decode` if the text is not valid JSON for `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.0)
            .map_err(|e| ProfileError::decode(format!("metadata is not valid for target type: {e}")))
    }
}

impl From<String> for RawMetadata {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Member classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberType {
    /// Current team member.
    Dwarves,
    /// Former team member.
    Alumni,
    /// Community contributor.
    Community,
}

impl MemberType {
    /// Returns the stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dwarves => "dwarves",
            Self::Alumni => "alumni",
            Self::Community => "community",
        }
    }
}

impl fmt::Display for MemberType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberType {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dwarves" => Ok(Self::Dwarves),
            "alumni" => Ok(Self::Alumni),
            "community" => Ok(Self::Community),
            other => Err(ProfileError::invalid_input(format!(
                "member type must be one of: dwarves, alumni, community (got {other})"
            ))),
        }
    }
}

/// External platform whose crawl state is tracked per profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// GitHub.
    #[serde(rename = "github")]
    GitHub,
    /// LinkedIn.
    #[serde(rename = "linkedin")]
    LinkedIn,
    /// Facebook.
    Facebook,
    /// Mochi.
    Mochi,
}

impl Platform {
    /// Every platform.
    pub const ALL: [Self; 4] = [Self::GitHub, Self::LinkedIn, Self::Facebook, Self::Mochi];

    /// Returns the field that identifies the contributor on this platform.
    #[must_use]
    pub const fn identity_field(self) -> ProfileField {
        match self {
            Self::GitHub => ProfileField::GithubUrl,
            Self::LinkedIn => ProfileField::LinkedinUrl,
            Self::Facebook => ProfileField::FacebookUrl,
            Self::Mochi => ProfileField::Mochi,
        }
    }

    /// Returns the crawl-state fields derived from the identity.
    #[must_use]
    pub const fn crawl_fields(self) -> &'static [ProfileField] {
        match self {
            Self::GitHub => &[
                ProfileField::GithubCrawlStatus,
                ProfileField::LastAttemptedAt,
                ProfileField::GithubExtractionError,
                ProfileField::GithubCrawledAt,
                ProfileField::GithubMetadata,
            ],
            Self::LinkedIn => &[
                ProfileField::LinkedinCrawlStatus,
                ProfileField::LastCrawledAt,
                ProfileField::LinkedinMetadata,
            ],
            Self::Facebook => &[],
            Self::Mochi => &[
                ProfileField::MochiProfileCrawlStatus,
                ProfileField::MochiProfileMetadata,
            ],
        }
    }

    /// Returns the platform identified by `field`, if it is an identity field.
    #[must_use]
    pub fn for_identity(field: ProfileField) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|platform| platform.identity_field() == field)
    }
}

impl FromStr for Platform {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "github" => Ok(Self::GitHub),
            "linkedin" => Ok(Self::LinkedIn),
            "facebook" => Ok(Self::Facebook),
            "mochi" => Ok(Self::Mochi),
            other => Err(ProfileError::invalid_input(format!(
                "platform must be one of: github, linkedin, facebook, mochi (got {other})"
            ))),
        }
    }
}

/// One contributor profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    /// Canonical profile URL.
    pub profile_url: Option<String>,
    /// Contributor username.
    pub username: Option<String>,
    /// Member classification as stored.
    pub member_type: Option<String>,
    /// GitHub profile URL.
    pub github_url: Option<String>,
    /// LinkedIn profile URL.
    pub linkedin_url: Option<String>,
    /// Discord handles.
    pub discord_usernames: Option<String>,
    /// Analysis output.
    pub analysis_result: Option<RawMetadata>,
    /// GitHub crawl status.
    pub github_crawl_status: Option<String>,
    /// Last GitHub crawl attempt.
    pub last_attempted_at: Option<String>,
    /// Last GitHub extraction error.
    pub github_extraction_error: Option<String>,
    /// Last successful GitHub crawl.
    pub github_crawled_at: Option<String>,
    /// GitHub metadata.
    pub github_metadata: Option<RawMetadata>,
    /// LinkedIn crawl status.
    pub linkedin_crawl_status: Option<String>,
    /// Last LinkedIn crawl.
    pub last_crawled_at: Option<String>,
    /// LinkedIn metadata.
    pub linkedin_metadata: Option<RawMetadata>,
    /// Facebook profile URL.
    pub facebook_url: Option<String>,
    /// Mochi identity.
    pub mochi: Option<String>,
    /// Mochi crawl status.
    pub mochi_profile_crawl_status: Option<String>,
    /// Mochi metadata.
    pub mochi_profile_metadata: Option<RawMetadata>,
}

impl ProfileRecord {
    /// Returns the value of `field`.
    #[must_use]
    pub fn get(&self, field: ProfileField) -> Option<&str> {
        match field {
            ProfileField::ProfileUrl => self.profile_url.as_deref(),
            ProfileField::Username => self.username.as_deref(),
            ProfileField::MemberType => self.member_type.as_deref(),
            ProfileField::GithubUrl => self.github_url.as_deref(),
            ProfileField::LinkedinUrl => self.linkedin_url.as_deref(),
            ProfileField::DiscordUsernames => self.discord_usernames.as_deref(),
            ProfileField::AnalysisResult => self.analysis_result.as_ref().map(RawMetadata::as_str),
            ProfileField::GithubCrawlStatus => self.github_crawl_status.as_deref(),
            ProfileField::LastAttemptedAt => self.last_attempted_at.as_deref(),
            ProfileField::GithubExtractionError => self.github_extraction_error.as_deref(),
            ProfileField::GithubCrawledAt => self.github_crawled_at.as_deref(),
            ProfileField::GithubMetadata => self.github_metadata.as_ref().map(RawMetadata::as_str),
            ProfileField::LinkedinCrawlStatus => self.linkedin_crawl_status.as_deref(),
            ProfileField::LastCrawledAt => self.last_crawled_at.as_deref(),
            ProfileField::LinkedinMetadata => {
                self.linkedin_metadata.as_ref().map(RawMetadata::as_str)
            }
            ProfileField::FacebookUrl => self.facebook_url.as_deref(),
            ProfileField::Mochi => self.mochi.as_deref(),
            ProfileField::MochiProfileCrawlStatus => self.mochi_profile_crawl_status.as_deref(),
            ProfileField::MochiProfileMetadata => {
                self.mochi_profile_metadata.as_ref().map(RawMetadata::as_str)
            }
        }
    }

    /// Sets `field` to `value` (`None` clears it).
    pub fn set(&mut self, field: ProfileField, value: Option<String>) {
        match field {
            ProfileField::ProfileUrl => self.profile_url = value,
            ProfileField::Username => self.username = value,
            ProfileField::MemberType => self.member_type = value,
            ProfileField::GithubUrl => self.github_url = value,
            ProfileField::LinkedinUrl => self.linkedin_url = value,
            ProfileField::DiscordUsernames => self.discord_usernames = value,
            ProfileField::AnalysisResult => self.analysis_result = value.map(RawMetadata),
            ProfileField::GithubCrawlStatus => self.github_crawl_status = value,
            ProfileField::LastAttemptedAt => self.last_attempted_at = value,
            ProfileField::GithubExtractionError => self.github_extraction_error = value,
            ProfileField::GithubCrawledAt => self.github_crawled_at = value,
            ProfileField::GithubMetadata => self.github_metadata = value.map(RawMetadata),
            ProfileField::LinkedinCrawlStatus => self.linkedin_crawl_status = value,
            ProfileField::LastCrawledAt => self.last_crawled_at = value,
            ProfileField::LinkedinMetadata => self.linkedin_metadata = value.map(RawMetadata),
            ProfileField::FacebookUrl => self.facebook_url = value,
            ProfileField::Mochi => self.mochi = value,
            ProfileField::MochiProfileCrawlStatus => self.mochi_profile_crawl_status = value,
            ProfileField::MochiProfileMetadata => {
                self.mochi_profile_metadata = value.map(RawMetadata);
            }
        }
    }

    /// Clears every crawl-state field of `platform`.
    pub fn reset_crawl_state(&mut self, platform: Platform) {
        for field in platform.crawl_fields() {
            self.set(*field, None);
        }
    }

    /// Returns whether any crawl-state field of `platform` holds a value.
    #[must_use]
    pub fn has_crawl_state(&self, platform: Platform) -> bool {
        platform
            .crawl_fields()
            .iter()
            .any(|field| self.get(*field).is_some())
    }
}
