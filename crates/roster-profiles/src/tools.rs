//! Tool surface.
//!
//! Tool requests arrive as JSON (`{"tool": ..., "arguments": {...}}`) and
//! every result, success or failure, is a human-readable string. Structured
//! errors are only flattened to text here.

use serde::{Deserialize, Serialize};

use crate::mutations::{AddOutcome, NewProfile, ProfileUpdate, UpdateOutcome};
use crate::record::{MemberType, Platform};
use crate::store::ProfileStore;

/// Arguments of the `reclassify` tool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReclassifyArgs {
    /// Usernames to reclassify.
    #[serde(alias = "member_usernames")]
    pub usernames: Vec<String>,
    /// New member type.
    #[serde(rename = "type", alias = "member_type")]
    pub member_type: MemberType,
}

/// Arguments of the `update_profile` tool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpdateProfileArgs {
    /// Username of the profile to update.
    pub username: String,
    /// Field assignments; `null` clears a field.
    pub fields: ProfileUpdate,
}

/// Arguments of the `clean_platform_metadata` tool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CleanArgs {
    /// Usernames whose crawl state is cleared.
    pub usernames: Vec<String>,
    /// Platforms to clear; all when omitted or empty.
    #[serde(default)]
    pub platforms: Vec<Platform>,
}

/// A tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "tool", content = "arguments", rename_all = "snake_case")]
pub enum ToolRequest {
    /// List every username.
    #[serde(
        alias = "list_usernames_from_profiles",
        alias = "list_usernames_from_contributors"
    )]
    ListUsernames,
    /// Add a profile.
    #[serde(alias = "add_new_profile")]
    AddProfile(NewProfile),
    /// Set the member type of several profiles.
    #[serde(
        alias = "add_member_type_for_profiles",
        alias = "add_member_type_for_contributors"
    )]
    Reclassify(ReclassifyArgs),
    /// Update fields of one profile.
    UpdateProfile(UpdateProfileArgs),
    /// Clear crawl state of several profiles.
    CleanPlatformMetadata(CleanArgs),
}

impl ToolRequest {
    /// Returns the canonical tool name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ListUsernames => "list_usernames",
            Self::AddProfile(_) => "add_profile",
            Self::Reclassify(_) => "reclassify",
            Self::UpdateProfile(_) => "update_profile",
            Self::CleanPlatformMetadata(_) => "clean_platform_metadata",
        }
    }

    const fn action(&self) -> &'static str {
        match self {
            Self::ListUsernames => "list usernames",
            Self::AddProfile(_) => "add profile",
            Self::Reclassify(_) => "update member types",
            Self::UpdateProfile(_) => "update profile",
            Self::CleanPlatformMetadata(_) => "clean platform metadata",
        }
    }
}

/// Runs a tool and formats its result.
pub async fn dispatch(store: &ProfileStore, request: ToolRequest) -> String {
    let action = request.action();
    let tool = request.name();
    let result = match request {
        ToolRequest::ListUsernames => store.list_usernames().await.map(|names| names.join(", ")),
        ToolRequest::AddProfile(new) => {
            store.add_profile(new).await.map(|outcome| match outcome {
                AddOutcome::Added(record) => {
                    format!("Successfully added profile: {}", to_json(&record))
                }
                AddOutcome::Conflict { existing } => {
                    format!("Profile already exists: {}", to_json(&existing))
                }
            })
        }
        ToolRequest::Reclassify(args) => store
            .reclassify(&args.usernames, args.member_type)
            .await
            .map(|outcome| {
                if outcome.matched == 0 {
                    no_profiles_found(&args.usernames)
                } else {
                    format!(
                        "Successfully updated member type to {} for {} profile(s).",
                        args.member_type, outcome.matched
                    )
                }
            }),
        ToolRequest::UpdateProfile(args) => store
            .update_profile(&args.username, &args.fields)
            .await
            .map(|outcome| match outcome {
                UpdateOutcome::Updated(record) => format!(
                    "Successfully updated profile {}: {}",
                    args.username,
                    to_json(&record)
                ),
                UpdateOutcome::NotFound => {
                    format!("No profile found for username: {}", args.username)
                }
            }),
        ToolRequest::CleanPlatformMetadata(args) => store
            .clean_platform_metadata(&args.usernames, &args.platforms)
            .await
            .map(|outcome| {
                if outcome.matched == 0 {
                    no_profiles_found(&args.usernames)
                } else {
                    format!(
                        "Cleared platform metadata for {} profile(s).",
                        outcome.matched
                    )
                }
            }),
    };

    result.unwrap_or_else(|err| {
        tracing::error!(tool, error = %err, "tool failed");
        format!("Failed to {action}: {err}")
    })
}

fn no_profiles_found(usernames: &[String]) -> String {
    format!(
        "No profiles found for the provided usernames: {}",
        to_json(&usernames)
    )
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("<unserializable: {e}>"))
}
