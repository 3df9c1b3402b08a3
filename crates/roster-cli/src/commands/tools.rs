//! One-shot tool subcommands.

use std::io::Write;

use anyhow::Result;
use clap::Args;
use roster_core::observability::tool_span;
use roster_profiles::tools::{
    CleanArgs, ReclassifyArgs as ReclassifyRequest, UpdateProfileArgs as UpdateRequest,
};
use roster_profiles::{
    MemberType, NewProfile, Platform, ProfileField, ProfileStore, ProfileUpdate, ToolRequest,
    dispatch,
};
use tracing::Instrument;
use ulid::Ulid;

/// Arguments for the add-profile command.
#[derive(Debug, Args)]
pub struct AddProfileArgs {
    /// GitHub profile URL; the username is derived from it.
    #[arg(long)]
    pub github_url: Option<String>,

    /// LinkedIn profile URL.
    #[arg(long)]
    pub linkedin_url: Option<String>,

    /// Facebook profile URL.
    #[arg(long)]
    pub facebook_url: Option<String>,

    /// Member type (dwarves, alumni, community).
    #[arg(long = "type")]
    pub member_type: MemberType,
}

impl From<AddProfileArgs> for ToolRequest {
    fn from(args: AddProfileArgs) -> Self {
        Self::AddProfile(NewProfile {
            github_url: args.github_url,
            linkedin_url: args.linkedin_url,
            facebook_url: args.facebook_url,
            member_type: args.member_type,
        })
    }
}

/// Arguments for the reclassify command.
#[derive(Debug, Args)]
pub struct ReclassifyArgs {
    /// Usernames to reclassify.
    #[arg(required = true)]
    pub usernames: Vec<String>,

    /// New member type (dwarves, alumni, community).
    #[arg(long = "type")]
    pub member_type: MemberType,
}

impl From<ReclassifyArgs> for ToolRequest {
    fn from(args: ReclassifyArgs) -> Self {
        Self::Reclassify(ReclassifyRequest {
            usernames: args.usernames,
            member_type: args.member_type,
        })
    }
}

/// Arguments for the update-profile command.
#[derive(Debug, Args)]
pub struct UpdateProfileArgs {
    /// Username of the profile to update.
    pub username: String,

    /// Field assignment as `field=value`. Repeatable.
    #[arg(long = "set", value_parser = parse_assignment)]
    pub set: Vec<(ProfileField, String)>,

    /// Field to clear. Repeatable.
    #[arg(long = "clear")]
    pub clear: Vec<ProfileField>,
}

impl From<UpdateProfileArgs> for ToolRequest {
    fn from(args: UpdateProfileArgs) -> Self {
        let sets = args.set.into_iter().map(|(field, value)| (field, Some(value)));
        let clears = args.clear.into_iter().map(|field| (field, None));
        let fields = sets
            .chain(clears)
            .fold(ProfileUpdate::new(), |update, (field, value)| {
                update.set(field, value)
            });
        Self::UpdateProfile(UpdateRequest {
            username: args.username,
            fields,
        })
    }
}

/// Arguments for the clean-metadata command.
#[derive(Debug, Args)]
pub struct CleanMetadataArgs {
    /// Usernames whose crawl state is cleared.
    #[arg(required = true)]
    pub usernames: Vec<String>,

    /// Platform to clear. Repeatable; all platforms when omitted.
    #[arg(long = "platform")]
    pub platforms: Vec<Platform>,
}

impl From<CleanMetadataArgs> for ToolRequest {
    fn from(args: CleanMetadataArgs) -> Self {
        Self::CleanPlatformMetadata(CleanArgs {
            usernames: args.usernames,
            platforms: args.platforms,
        })
    }
}

/// Execute one tool and print its result.
///
/// Tool failures are part of the printed text, as on the serve transport.
///
/// # Errors
///
/// Returns an error if stdout cannot be written.
pub async fn execute(store: &ProfileStore, request: ToolRequest) -> Result<()> {
    let span = tool_span(request.name(), &Ulid::new().to_string());
    let output = dispatch(store, request).instrument(span).await;
    writeln!(std::io::stdout().lock(), "{output}")?;
    Ok(())
}

fn parse_assignment(raw: &str) -> std::result::Result<(ProfileField, String), String> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected field=value, got '{raw}'"))?;
    let field = field.trim().parse::<ProfileField>().map_err(|e| e.to_string())?;
    Ok((field, value.to_string()))
}
