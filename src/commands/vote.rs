use evlog::meta;
use serenity::client::Context;
use serenity::model::interactions::application_command::ApplicationCommandInteraction;

use crate::app::App;
use crate::election::Election;
use crate::error::VoteError;
use crate::handler::bot_app;
use crate::helpers::{command_opt, command_resp};
use crate::runtime::get_logger;
use crate::support::parse::discord_time;

/// Accepts a candidate ID (what the registered choices send) or a name typed by hand.
fn resolve_candidate(election: &Election, value: &str) -> Option<String> {
    election.candidate(value)
        .or_else(|| election.candidate_by_name(value))
        .map(|c| c.id.clone())
}

/// Shows a refused vote to the voter. Storage failures are also returned for the dispatcher to log.
async fn reply_vote_error(ctx: &Context, interaction: &ApplicationCommandInteraction, action: &str, e: VoteError) -> anyhow::Result<()> {
    match e {
        VoteError::Storage(e) => {
            command_resp::reply_deferred_result(ctx, interaction, format!("Failed to {} vote. Please try again.", action)).await?;
            Err(e)
        }
        e => {
            get_logger().info("Vote refused.", meta! {
                "InteractionID" => interaction.id,
                "UserID" => interaction.user.id,
                "Action" => action,
                "Reason" => e,
            });
            command_resp::reply_deferred_result(ctx, interaction, e.to_string()).await?;
            Ok(())
        }
    }
}

/// Reads the election sub-command and its candidate, replying when either is unknown.
async fn election_and_candidate(
    ctx: &Context,
    interaction: &ApplicationCommandInteraction,
    app: &App,
) -> anyhow::Result<Option<(Election, String)>> {
    let sub = match interaction.data.options.first() {
        None => return Ok(None),
        Some(v) => v,
    };

    let election = match app.store.get(&sub.name).await {
        None => {
            get_logger().info("Failed to find an election with the name of the vote sub-command.", meta! {
                "InteractionID" => interaction.id,
                "ElectionID" => sub.name,
            });
            command_resp::reply_deferred_result(ctx, interaction, format!("Failed to find election **'{}'**.", sub.name)).await?;
            return Ok(None);
        }
        Some(v) => v,
    };

    let value = command_opt::find_required(ctx, interaction, &sub.options, command_opt::find_string_opt, "candidate").await?;
    match resolve_candidate(&election, &value) {
        Some(candidate_id) => Ok(Some((election, candidate_id))),
        None => {
            command_resp::reply_deferred_result(ctx, interaction, format!(
                "**{}** has no candidate '{}'.", election.title, value
            )).await?;
            Ok(None)
        }
    }
}

pub async fn commit(ctx: Context, interaction: ApplicationCommandInteraction) -> anyhow::Result<()> {
    command_resp::reply_deferred_ephemeral_ack(&ctx, &interaction).await?;

    let app = bot_app(&ctx).await?;
    let voter_id = interaction.user.id.as_u64().to_string();

    let (election, candidate_id) = match election_and_candidate(&ctx, &interaction, &app).await? {
        None => return Ok(()),
        Some(v) => v,
    };

    let replacing = app.has_committed(&voter_id, &election.id);

    let receipt = match app.commit_vote(&voter_id, &election.id, &candidate_id).await {
        Ok(v) => v,
        Err(e) => return reply_vote_error(&ctx, &interaction, "commit", e).await,
    };

    let mut reply = format!(
        "Vote committed in **{}**.\n\
        Your salt: `{}`\n\
        Commitment: `{}`\n\
        Keep the salt. To make your vote count, run `/reveal {}` with the same candidate and this salt \
        between {} and {}.",
        election.title,
        receipt.salt,
        receipt.commitment,
        election.id,
        discord_time(&election.phases.reveal_start),
        discord_time(&election.phases.reveal_end),
    );
    if replacing {
        reply.push_str("\nThis replaces your earlier commitment; its salt no longer works.");
    }

    command_resp::reply_deferred_result(&ctx, &interaction, reply).await?;

    Ok(())
}

pub async fn reveal(ctx: Context, interaction: ApplicationCommandInteraction) -> anyhow::Result<()> {
    command_resp::reply_deferred_ephemeral_ack(&ctx, &interaction).await?;

    let app = bot_app(&ctx).await?;
    let voter_id = interaction.user.id.as_u64().to_string();

    let (election, candidate_id) = match election_and_candidate(&ctx, &interaction, &app).await? {
        None => return Ok(()),
        Some(v) => v,
    };

    let salt = match interaction.data.options.first() {
        None => return Ok(()),
        Some(sub) => command_opt::find_required(&ctx, &interaction, &sub.options, command_opt::find_string_opt, "salt").await?,
    };

    let updated = match app.reveal_vote(&voter_id, &election.id, &candidate_id, &salt).await {
        Ok(v) => v,
        Err(e) => return reply_vote_error(&ctx, &interaction, "reveal", e).await,
    };

    command_resp::reply_deferred_result(&ctx, &interaction, format!(
        "Vote revealed in **{}**. Thank you for participating! {} votes have been counted so far.",
        updated.title, updated.total_votes
    )).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::election::tests::draft;

    use super::*;

    #[test]
    fn candidates_resolve_by_id_or_name() {
        let now = Utc::now();
        let e = draft(now).into_election("election-1".to_owned(), now);

        assert_eq!(resolve_candidate(&e, "candidate-2").as_deref(), Some("candidate-2"));
        assert_eq!(resolve_candidate(&e, " bilal ").as_deref(), Some("candidate-2"));
        assert_eq!(resolve_candidate(&e, "Nobody"), None);
    }
}
