//! In-memory transformations of the profile collection.
//!
//! Each function edits the decoded collection and reports what it did; the
//! store decides from the outcome whether anything needs to be written.

use serde::{Deserialize, Serialize};

use crate::error::{ProfileError, Result};
use crate::record::{MemberType, Platform, ProfileField, ProfileRecord};

/// Input of [`add_profile`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProfile {
    /// GitHub profile URL.
    #[serde(default)]
    pub github_url: Option<String>,
    /// LinkedIn profile URL.
    #[serde(default)]
    pub linkedin_url: Option<String>,
    /// Facebook profile URL.
    #[serde(default)]
    pub facebook_url: Option<String>,
    /// Member classification.
    #[serde(rename = "type", alias = "member_type")]
    pub member_type: MemberType,
}

/// Result of [`add_profile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// The profile was appended.
    Added(ProfileRecord),
    /// An existing profile shares an identity URL; nothing changed.
    Conflict {
        /// The first matching record.
        existing: ProfileRecord,
    },
}

/// Appends a profile unless one of its identity URLs is already taken.
///
/// Blank URLs count as absent. An absent URL never matches.
///
/// # Errors
///
/// Returns `ProfileError::InvalidInput` when no identity URL is provided.
pub fn add_profile(profiles: &mut Vec<ProfileRecord>, new: NewProfile) -> Result<AddOutcome> {
    let github_url = non_blank(new.github_url);
    let linkedin_url = non_blank(new.linkedin_url);
    let facebook_url = non_blank(new.facebook_url);

    if github_url.is_none() && linkedin_url.is_none() && facebook_url.is_none() {
        return Err(ProfileError::invalid_input(
            "at least one of github_url, linkedin_url, facebook_url is required",
        ));
    }

    let candidate = ProfileRecord {
        profile_url: github_url.clone(),
        username: github_url.as_deref().and_then(username_from_github_url),
        member_type: Some(new.member_type.as_str().to_string()),
        github_url,
        linkedin_url,
        facebook_url,
        ..ProfileRecord::default()
    };

    let identities = [
        ProfileField::GithubUrl,
        ProfileField::LinkedinUrl,
        ProfileField::FacebookUrl,
    ];
    let existing = profiles.iter().find(|profile| {
        identities.iter().any(|field| {
            candidate
                .get(*field)
                .is_some_and(|url| profile.get(*field) == Some(url))
        })
    });
    if let Some(existing) = existing {
        return Ok(AddOutcome::Conflict {
            existing: existing.clone(),
        });
    }

    profiles.push(candidate.clone());
    Ok(AddOutcome::Added(candidate))
}

/// Derives a username from the last non-empty path segment of a GitHub URL.
#[must_use]
pub fn username_from_github_url(url: &str) -> Option<String> {
    url.trim()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty() && !segment.ends_with(':'))
        .map(str::to_string)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Result of [`reclassify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReclassifyOutcome {
    /// Records whose username was in the target set.
    pub matched: usize,
}

/// Sets `member_type` on every record whose username is in `usernames`.
pub fn reclassify(
    profiles: &mut [ProfileRecord],
    usernames: &[String],
    member_type: MemberType,
) -> ReclassifyOutcome {
    let mut matched = 0;
    for profile in profiles.iter_mut().filter(|p| has_username(p, usernames)) {
        profile.member_type = Some(member_type.as_str().to_string());
        matched += 1;
    }
    ReclassifyOutcome { matched }
}

/// Field assignments for [`update_profile`].
///
/// `Some(value)` sets a field, `None` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "serde_json::Map<String, serde_json::Value>")]
pub struct ProfileUpdate {
    assignments: Vec<(ProfileField, Option<String>)>,
}

impl ProfileUpdate {
    /// Creates an empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an assignment, replacing any earlier one for the same field.
    #[must_use]
    pub fn set(mut self, field: ProfileField, value: Option<String>) -> Self {
        self.assignments.retain(|(f, _)| *f != field);
        self.assignments.push((field, value));
        self
    }

    /// Returns the assignments in the order given.
    #[must_use]
    pub fn assignments(&self) -> &[(ProfileField, Option<String>)] {
        &self.assignments
    }

    /// Returns whether the update assigns nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

impl TryFrom<serde_json::Map<String, serde_json::Value>> for ProfileUpdate {
    type Error = ProfileError;

    fn try_from(map: serde_json::Map<String, serde_json::Value>) -> Result<Self> {
        let mut update = Self::new();
        for (name, value) in map {
            let field: ProfileField = name.parse()?;
            let value = match value {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some(s),
                other => {
                    return Err(ProfileError::invalid_input(format!(
                        "field '{name}' must be a string or null, got {other}"
                    )));
                }
            };
            update = update.set(field, value);
        }
        Ok(update)
    }
}

/// Result of [`update_profile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The record after the update.
    Updated(ProfileRecord),
    /// No record has the username; nothing changed.
    NotFound,
}

/// Applies `update` to the first record with `username`.
///
/// When an identity field changes value (including gaining or losing one),
/// the crawl state of that platform is cleared before the assignments are
/// applied, so an update may set fresh crawl fields in the same call.
pub fn update_profile(
    profiles: &mut [ProfileRecord],
    username: &str,
    update: &ProfileUpdate,
) -> UpdateOutcome {
    let Some(profile) = profiles
        .iter_mut()
        .find(|p| p.username.as_deref() == Some(username))
    else {
        return UpdateOutcome::NotFound;
    };

    for (field, value) in update.assignments() {
        if let Some(platform) = Platform::for_identity(*field) {
            if profile.get(*field) != value.as_deref() {
                tracing::debug!(username, platform = ?platform, "identity changed, resetting crawl state");
                profile.reset_crawl_state(platform);
            }
        }
    }
    for (field, value) in update.assignments() {
        profile.set(*field, value.clone());
    }

    UpdateOutcome::Updated(profile.clone())
}

/// Result of [`clean_platform_metadata`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanOutcome {
    /// Records whose username was in the target set.
    pub matched: usize,
}

/// Clears the crawl state of `platforms` (every platform when empty) on each
/// record whose username is in `usernames`.
pub fn clean_platform_metadata(
    profiles: &mut [ProfileRecord],
    usernames: &[String],
    platforms: &[Platform],
) -> CleanOutcome {
    let platforms = if platforms.is_empty() {
        &Platform::ALL[..]
    } else {
        platforms
    };

    let mut matched = 0;
    for profile in profiles.iter_mut().filter(|p| has_username(p, usernames)) {
        for platform in platforms {
            profile.reset_crawl_state(*platform);
        }
        matched += 1;
    }
    CleanOutcome { matched }
}

fn has_username(profile: &ProfileRecord, usernames: &[String]) -> bool {
    profile
        .username
        .as_deref()
        .is_some_and(|u| usernames.iter().any(|target| target == u))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RawMetadata;

    fn alice() -> ProfileRecord {
        ProfileRecord {
            username: Some("alice".into()),
            github_url: Some("https://github.com/alice".into()),
            github_crawl_status: Some("done".into()),
            last_attempted_at: Some("2024-05-01T00:00:00Z".into()),
            github_extraction_error: Some("rate limited".into()),
            github_crawled_at: Some("2024-05-01T00:00:00Z".into()),
            github_metadata: Some(RawMetadata::new("{}")),
            linkedin_url: Some("https://linkedin.com/in/alice".into()),
            linkedin_crawl_status: Some("done".into()),
            ..ProfileRecord::default()
        }
    }

    fn new_profile(github: Option<&str>) -> NewProfile {
        NewProfile {
            github_url: github.map(str::to_string),
            linkedin_url: None,
            facebook_url: None,
            member_type: MemberType::Community,
        }
    }

    #[test]
    fn add_profile_builds_record_from_github_url() {
        let mut profiles = vec![alice()];
        let outcome =
            add_profile(&mut profiles, new_profile(Some("https://github.com/bob"))).expect("add");

        let expected = ProfileRecord {
            profile_url: Some("https://github.com/bob".into()),
            username: Some("bob".into()),
            member_type: Some("community".into()),
            github_url: Some("https://github.com/bob".into()),
            ..ProfileRecord::default()
        };
        assert_eq!(outcome, AddOutcome::Added(expected.clone()));
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[1], expected);
    }

    #[test]
    fn add_profile_rejects_duplicate_identity() {
        let mut profiles = vec![alice()];
        let new = NewProfile {
            github_url: Some("https://github.com/someone-else".into()),
            linkedin_url: Some("https://linkedin.com/in/alice".into()),
            facebook_url: None,
            member_type: MemberType::Alumni,
        };

        let outcome = add_profile(&mut profiles, new).expect("add");
        assert_eq!(outcome, AddOutcome::Conflict { existing: alice() });
        assert_eq!(profiles.len(), 1);
    }

    #[test]
    fn add_profile_missing_fields_never_match() {
        let mut profiles = vec![ProfileRecord {
            username: Some("nobody".into()),
            ..ProfileRecord::default()
        }];
        let outcome = add_profile(
            &mut profiles,
            NewProfile {
                github_url: None,
                linkedin_url: None,
                facebook_url: Some("https://facebook.com/dan".into()),
                member_type: MemberType::Dwarves,
            },
        )
        .expect("add");

        let AddOutcome::Added(record) = outcome else {
            panic!("expected add");
        };
        assert_eq!(record.username, None);
        assert_eq!(record.profile_url, None);
    }

    #[test]
    fn add_profile_requires_an_identity() {
        let mut profiles = Vec::new();
        let err = add_profile(&mut profiles, new_profile(Some("  "))).expect_err("blank");
        assert!(matches!(err, ProfileError::InvalidInput { .. }));
        assert!(profiles.is_empty());
    }

    #[test]
    fn username_ignores_trailing_slashes() {
        assert_eq!(
            username_from_github_url("https://github.com/carol/").as_deref(),
            Some("carol")
        );
        assert_eq!(username_from_github_url("carol").as_deref(), Some("carol"));
        assert_eq!(username_from_github_url("https://"), None);
        assert_eq!(username_from_github_url(""), None);
    }

    #[test]
    fn reclassify_counts_matches_and_is_idempotent() {
        let mut profiles = vec![alice(), ProfileRecord::default()];
        let targets = vec!["alice".to_string(), "ghost".to_string()];

        let first = reclassify(&mut profiles, &targets, MemberType::Dwarves);
        let snapshot = profiles.clone();
        let second = reclassify(&mut profiles, &targets, MemberType::Dwarves);

        assert_eq!(first.matched, 1);
        assert_eq!(second.matched, 1);
        assert_eq!(profiles, snapshot);
        assert_eq!(profiles[0].member_type.as_deref(), Some("dwarves"));
        assert_eq!(profiles[1].member_type, None);
    }

    #[test]
    fn reclassify_without_matches_changes_nothing() {
        let mut profiles = vec![alice()];
        let outcome = reclassify(&mut profiles, &["ghost".to_string()], MemberType::Alumni);
        assert_eq!(outcome.matched, 0);
        assert_eq!(profiles, vec![alice()]);
    }

    #[test]
    fn changing_github_url_resets_github_crawl_state_only() {
        let mut profiles = vec![alice()];
        let update = ProfileUpdate::new().set(
            ProfileField::GithubUrl,
            Some("https://github.com/alice-new".into()),
        );

        let UpdateOutcome::Updated(record) = update_profile(&mut profiles, "alice", &update) else {
            panic!("expected update");
        };

        assert_eq!(record.github_url.as_deref(), Some("https://github.com/alice-new"));
        assert!(!record.has_crawl_state(Platform::GitHub));
        assert_eq!(record.linkedin_crawl_status.as_deref(), Some("done"));
        assert_eq!(profiles[0], record);
    }

    #[test]
    fn unchanged_identity_keeps_crawl_state() {
        let mut profiles = vec![alice()];
        let update = ProfileUpdate::new()
            .set(ProfileField::GithubUrl, Some("https://github.com/alice".into()))
            .set(ProfileField::DiscordUsernames, Some("alice#1".into()));

        let UpdateOutcome::Updated(record) = update_profile(&mut profiles, "alice", &update) else {
            panic!("expected update");
        };
        assert!(record.has_crawl_state(Platform::GitHub));
        assert_eq!(record.discord_usernames.as_deref(), Some("alice#1"));
    }

    #[test]
    fn adding_first_identity_resets_that_platform() {
        let mut profiles = vec![ProfileRecord {
            username: Some("erin".into()),
            mochi_profile_crawl_status: Some("stale".into()),
            ..ProfileRecord::default()
        }];
        let update = ProfileUpdate::new().set(ProfileField::Mochi, Some("erin".into()));

        let UpdateOutcome::Updated(record) = update_profile(&mut profiles, "erin", &update) else {
            panic!("expected update");
        };
        assert_eq!(record.mochi_profile_crawl_status, None);
    }

    #[test]
    fn explicit_crawl_assignments_apply_after_reset() {
        let mut profiles = vec![alice()];
        let update = ProfileUpdate::new()
            .set(ProfileField::GithubUrl, Some("https://github.com/a2".into()))
            .set(ProfileField::GithubCrawlStatus, Some("pending".into()));

        let UpdateOutcome::Updated(record) = update_profile(&mut profiles, "alice", &update) else {
            panic!("expected update");
        };
        assert_eq!(record.github_crawl_status.as_deref(), Some("pending"));
        assert_eq!(record.github_metadata, None);
    }

    #[test]
    fn update_unknown_username_is_not_found() {
        let mut profiles = vec![alice()];
        let update = ProfileUpdate::new().set(ProfileField::FacebookUrl, None);
        assert_eq!(
            update_profile(&mut profiles, "ghost", &update),
            UpdateOutcome::NotFound
        );
        assert_eq!(profiles, vec![alice()]);
    }

    #[test]
    fn profile_update_parses_from_json_object() {
        let update: ProfileUpdate = serde_json::from_value(serde_json::json!({
            "github_url": "https://github.com/x",
            "facebook_url": null,
        }))
        .expect("parse");
        assert_eq!(update.assignments().len(), 2);

        let err = serde_json::from_value::<ProfileUpdate>(serde_json::json!({"nickname": "x"}))
            .expect_err("unknown field");
        assert!(err.to_string().contains("unknown profile field"));

        assert!(serde_json::from_value::<ProfileUpdate>(serde_json::json!({"mochi": 3})).is_err());
    }

    #[test]
    fn clean_clears_selected_platforms() {
        let mut profiles = vec![alice()];
        let outcome =
            clean_platform_metadata(&mut profiles, &["alice".to_string()], &[Platform::LinkedIn]);

        assert_eq!(outcome.matched, 1);
        assert!(!profiles[0].has_crawl_state(Platform::LinkedIn));
        assert!(profiles[0].has_crawl_state(Platform::GitHub));
        assert_eq!(
            profiles[0].linkedin_url.as_deref(),
            Some("https://linkedin.com/in/alice")
        );
    }

    #[test]
    fn clean_with_no_platforms_clears_all() {
        let mut profiles = vec![alice()];
        let outcome = clean_platform_metadata(&mut profiles, &["alice".to_string()], &[]);
        assert_eq!(outcome.matched, 1);
        for platform in Platform::ALL {
            assert!(!profiles[0].has_crawl_state(platform));
        }
    }
}
