use chrono::Utc;
use evlog::meta;
use serenity::builder::CreateApplicationCommand;
use std::sync::Arc;

use serenity::cache::Cache;
use serenity::http::Http;
use serenity::model::id::GuildId;
use serenity::model::interactions::application_command::ApplicationCommandOptionType;

use crate::election::phase::Phase;
use crate::election::Election;
use crate::runtime::get_logger;
use crate::support::text::truncate;

pub const COMMIT: &str = "commit";
pub const REVEAL: &str = "reveal";

/// Discord allows at most this many sub-commands and choices per option.
const MAX_ENTRIES: usize = 25;

fn votable(elections: &[Election]) -> Vec<&Election> {
    let now = Utc::now();
    elections.iter()
        .filter(|e| e.status_at(now) != Phase::Closed)
        .rev()
        .take(MAX_ENTRIES)
        .collect()
}

fn add_election_subcommands<'a>(
    c: &'a mut CreateApplicationCommand,
    elections: &[&Election],
    with_salt: bool,
) -> &'a mut CreateApplicationCommand {
    for election in elections {
        c.create_option(|opt| {
            opt.name(&election.id)
                .description(truncate(&election.title, 100))
                .kind(ApplicationCommandOptionType::SubCommand);

            opt.create_sub_option(|opt_sub| {
                opt_sub.name("candidate")
                    .description("The candidate you are voting for")
                    .required(true)
                    .kind(ApplicationCommandOptionType::String);

                for candidate in election.candidates.iter().take(MAX_ENTRIES) {
                    opt_sub.add_string_choice(truncate(&candidate.name, 100), candidate.id.clone());
                }

                opt_sub
            });

            if with_salt {
                opt.create_sub_option(|opt_sub| opt_sub
                    .name("salt")
                    .description("The salt you were given when committing")
                    .required(true)
                    .kind(ApplicationCommandOptionType::String));
            }

            opt
        });
    }

    c
}

/// Rebuilds the guild's `/commit` and `/reveal` commands with one sub-command per open election.
pub async fn register_elections(http: &Arc<Http>, guild_id: GuildId, elections: &[Election]) -> anyhow::Result<()> {
    let existing_cmds = guild_id.get_application_commands(http).await?;

    for cmd in existing_cmds.iter().filter(|v| v.name == COMMIT || v.name == REVEAL) {
        guild_id.delete_application_command(http, cmd.id).await?;
    }

    let open = votable(elections);
    if open.is_empty() {
        get_logger().debug("No open elections; vote commands not registered.", meta! {
            "GuildID" => guild_id,
        });
        return Ok(());
    }

    guild_id.create_application_command(http, |c| {
        c.name(COMMIT)
            .description("Commit a hidden vote in an election");
        add_election_subcommands(c, &open, false)
    }).await?;

    guild_id.create_application_command(http, |c| {
        c.name(REVEAL)
            .description("Reveal the vote you committed earlier");
        add_election_subcommands(c, &open, true)
    }).await?;

    get_logger().debug("Registered vote commands in server.", meta! {
        "GuildID" => guild_id,
        "Elections" => open.len(),
    });

    Ok(())
}

/// Re-registers vote commands in every cached guild. Failures are logged per guild.
pub async fn register_elections_everywhere(cache: &Cache, http: &Arc<Http>, elections: &[Election]) {
    for guild_id in cache.guilds() {
        if let Err(e) = register_elections(http, guild_id, elections).await {
            get_logger().error("Failed to register vote commands.", meta! {
                "GuildID" => guild_id,
                "Error" => e,
            });
        }
    }
}
