use std::borrow::Cow;

use chrono::Utc;
use evlog::meta;
use itertools::Itertools;
use serenity::builder::{CreateApplicationCommand, CreateApplicationCommandOption};
use serenity::client::Context;
use serenity::model::channel::AttachmentType;
use serenity::model::interactions::application_command::{ApplicationCommandInteraction, ApplicationCommandInteractionDataOption, ApplicationCommandOptionType};

use crate::app::App;
use crate::election::phase::{Phase, Phases};
use crate::election::tally::{self, overview};
use crate::election::{Election, ElectionDraft};
use crate::error::ElectionError;
use crate::handler::bot_app;
use crate::helpers::{command_opt, command_resp, permissions};
use crate::runtime::get_logger;
use crate::support::numbers::{num_word, percent};
use crate::support::parse::{discord_time, format_time, parse_candidate, parse_time, parse_voter_list, ELECTION_ID};
use crate::support::register_elections::register_elections_everywhere;
use crate::support::text::truncate;

pub const ELECTION: &str = "election";

const MAX_CANDIDATES: usize = 10;
const THUMBNAIL: &str = "https://i.imgur.com/fWgQ8b6.png";

fn election_id_opt(opt: &mut CreateApplicationCommandOption, required: bool) -> &mut CreateApplicationCommandOption {
    opt.name("id")
        .description("Election ID, e.g. election-1760000000000")
        .required(required)
        .kind(ApplicationCommandOptionType::String)
}

pub fn election_builder(cmd: &mut CreateApplicationCommand) -> &mut CreateApplicationCommand {
    cmd.name(ELECTION)
        .description("Browse and manage elections")
        .create_option(|opt| {
            opt
                .name("create")
                .description("Create a new election (administrators only)")
                .kind(ApplicationCommandOptionType::SubCommand)

                .create_sub_option(|opt| opt
                    .name("title")
                    .description("Election title")
                    .required(true)
                    .kind(ApplicationCommandOptionType::String))
                .create_sub_option(|opt| opt
                    .name("description")
                    .description("What the election is for")
                    .required(true)
                    .kind(ApplicationCommandOptionType::String))
                .create_sub_option(|opt| opt
                    .name("commit-start")
                    .description("Commit phase start, YYYY-MM-DD HH:MM (UTC)")
                    .required(true)
                    .kind(ApplicationCommandOptionType::String))
                .create_sub_option(|opt| opt
                    .name("commit-end")
                    .description("Commit phase end, YYYY-MM-DD HH:MM (UTC)")
                    .required(true)
                    .kind(ApplicationCommandOptionType::String))
                .create_sub_option(|opt| opt
                    .name("reveal-start")
                    .description("Reveal phase start, YYYY-MM-DD HH:MM (UTC)")
                    .required(true)
                    .kind(ApplicationCommandOptionType::String))
                .create_sub_option(|opt| opt
                    .name("reveal-end")
                    .description("Reveal phase end, YYYY-MM-DD HH:MM (UTC)")
                    .required(true)
                    .kind(ApplicationCommandOptionType::String))
                .create_sub_option(|opt| opt
                    .name("candidate-1")
                    .description("Name: manifesto | optional photo URL")
                    .required(true)
                    .kind(ApplicationCommandOptionType::String))
                .create_sub_option(|opt| opt
                    .name("candidate-2")
                    .description("Name: manifesto | optional photo URL")
                    .required(true)
                    .kind(ApplicationCommandOptionType::String));

            for i in 3..=MAX_CANDIDATES {
                opt.create_sub_option(|opt| opt
                    .name(format!("candidate-{}", i))
                    .description(format!("Candidate {}", i))
                    .required(false)
                    .kind(ApplicationCommandOptionType::String));
            }

            opt.create_sub_option(|opt| opt
                .name("voters")
                .description("Eligible voters as user IDs or mentions; everyone may vote if omitted")
                .required(false)
                .kind(ApplicationCommandOptionType::String))
        })
        .create_option(|opt| opt
            .name("list")
            .description("List all elections")
            .kind(ApplicationCommandOptionType::SubCommand))
        .create_option(|opt| opt
            .name("view")
            .description("Show an election's candidates and phases")
            .kind(ApplicationCommandOptionType::SubCommand)
            .create_sub_option(|opt| election_id_opt(opt, true)))
        .create_option(|opt| opt
            .name("results")
            .description("Show results once the election is closed or you have voted")
            .kind(ApplicationCommandOptionType::SubCommand)
            .create_sub_option(|opt| election_id_opt(opt, true)))
        .create_option(|opt| opt
            .name("monitor")
            .description("Live voting activity (administrators only)")
            .kind(ApplicationCommandOptionType::SubCommand)
            .create_sub_option(|opt| election_id_opt(opt, false)))
        .create_option(|opt| opt
            .name("stats")
            .description("Totals across all elections (administrators only)")
            .kind(ApplicationCommandOptionType::SubCommand))
        .create_option(|opt| opt
            .name("export")
            .description("Export results (administrators only)")
            .kind(ApplicationCommandOptionType::SubCommand)
            .create_sub_option(|opt| election_id_opt(opt, true))
            .create_sub_option(|opt| opt
                .name("format")
                .description("Export format")
                .required(true)
                .kind(ApplicationCommandOptionType::String)
                .add_string_choice("json", "json")
                .add_string_choice("csv", "csv")));

    cmd
}

fn phase_lines(phases: &Phases) -> String {
    format!(
        "Commit: {} → {}\nReveal: {} → {}",
        discord_time(&phases.commit_start),
        discord_time(&phases.commit_end),
        discord_time(&phases.reveal_start),
        discord_time(&phases.reveal_end),
    )
}

/// Looks up the election named by the `id` option, replying when it does not exist.
async fn find_election(
    ctx: &Context,
    interaction: &ApplicationCommandInteraction,
    opt: &ApplicationCommandInteractionDataOption,
    app: &App,
) -> anyhow::Result<Option<Election>> {
    let id = command_opt::find_required(ctx, interaction, &opt.options, command_opt::find_string_opt, "id").await?;
    let id = id.trim().to_lowercase();

    if !ELECTION_ID.is_match(&id) {
        command_resp::reply_deferred_result(ctx, interaction, format!(
            "'{}' is not an election ID; IDs look like `election-1760000000000`. Use /election list.", id
        )).await?;
        return Ok(None);
    }

    match app.store.get(&id).await {
        None => {
            command_resp::reply_deferred_result(ctx, interaction, format!("Failed to find election **'{}'**.", id)).await?;
            Ok(None)
        }
        Some(v) => Ok(Some(v)),
    }
}

async fn election_create(ctx: &Context, interaction: &ApplicationCommandInteraction, opt: &ApplicationCommandInteractionDataOption, app: &App) -> anyhow::Result<()> {
    if !permissions::require_admin(ctx, interaction, "/election create").await? {
        return Ok(());
    }

    let title = command_opt::find_required(ctx, interaction, &opt.options, command_opt::find_string_opt, "title").await?;
    let description = command_opt::find_required(ctx, interaction, &opt.options, command_opt::find_string_opt, "description").await?;

    //

    let mut bounds = Vec::with_capacity(4);
    for name in ["commit-start", "commit-end", "reveal-start", "reveal-end"] {
        let raw = command_opt::find_required(ctx, interaction, &opt.options, command_opt::find_string_opt, name).await?;

        match parse_time(&raw) {
            Some(v) => bounds.push(v),
            None => {
                get_logger().info("Invalid time passed to /election create.", meta! {
                    "InteractionID" => interaction.id,
                    "Option" => name,
                    "Value" => raw,
                });
                command_resp::reply_deferred_result(ctx, interaction, format!(
                    "`{}` must look like `2026-11-02 09:30` (UTC); got '{}'.", name, raw
                )).await?;
                return Ok(());
            }
        }
    }

    let phases = Phases {
        commit_start: bounds[0],
        commit_end: bounds[1],
        reveal_start: bounds[2],
        reveal_end: bounds[3],
    };

    //

    let mut candidates = Vec::new();

    for i in 1..=MAX_CANDIDATES {
        let raw = match command_opt::find_string_opt(&opt.options, &format!("candidate-{}", i)) {
            None => continue,
            Some(v) => v,
        };

        match parse_candidate(&raw) {
            Some(v) => candidates.push(v),
            None => {
                get_logger().info("Malformed candidate passed to /election create.", meta! {
                    "InteractionID" => interaction.id,
                    "CandidateNumber" => i,
                });
                command_resp::reply_deferred_result(ctx, interaction, format!(
                    "Candidate {} must look like `Name: manifesto` or `Name: manifesto | https://photo.url`.", i
                )).await?;
                return Ok(());
            }
        }
    }

    let eligible_voters = command_opt::find_string_opt(&opt.options, "voters")
        .map(|v| parse_voter_list(&v))
        .unwrap_or_default();

    let draft = ElectionDraft {
        title,
        description,
        phases,
        candidates,
        eligible_voters,
    };

    let election = match app.create_election(draft).await {
        Ok(v) => v,
        Err(ElectionError::Storage(e)) => {
            command_resp::reply_deferred_result(ctx, interaction, "Error occurred upon attempt to save the election.").await?;
            return Err(e);
        }
        Err(e) => {
            get_logger().info("Rejected /election create.", meta! {
                "InteractionID" => interaction.id,
                "Reason" => e,
            });
            command_resp::reply_deferred_result(ctx, interaction, format!("Failed to create election: {}", e)).await?;
            return Ok(());
        }
    };

    interaction.create_followup_message(&ctx.http, |r| r.embed(|e| {
        e.title("New election created");
        e.thumbnail(THUMBNAIL);

        e.field("Election", format!("{} (`{}`)", election.title, election.id), false);
        e.field("Phases", phase_lines(&election.phases), false);

        let mut opt_string = String::new();
        for (i, c) in election.candidates.iter().enumerate() {
            opt_string.push_str(&format!("**{}.** {}\n", i + 1, c.name));
        }
        e.field("Candidates", opt_string, false);

        let voters = match election.eligible_voters.len() {
            0 => "Open to all registered voters".to_owned(),
            n => format!("{} addresses", n),
        };
        e.field("Voter list", voters, false);

        e
    })).await?;

    register_elections_everywhere(&ctx.cache, &ctx.http, &app.store.list().await).await;

    Ok(())
}

async fn election_list(ctx: &Context, interaction: &ApplicationCommandInteraction, app: &App) -> anyhow::Result<()> {
    let now = Utc::now();
    let elections = app.store.list().await;

    if elections.is_empty() {
        command_resp::reply_deferred_result(ctx, interaction, "No elections have been created yet.").await?;
        return Ok(());
    }

    let mut res_string = String::new();
    for e in elections.iter().sorted_by_key(|e| e.status_at(now)) {
        res_string.push_str(&format!(
            "**{}** (`{}`): {}, {} votes\n",
            e.title, e.id, e.status_at(now), e.total_votes
        ));
    }

    command_resp::reply_deferred_result(ctx, interaction, res_string).await?;

    Ok(())
}

async fn election_view(ctx: &Context, interaction: &ApplicationCommandInteraction, opt: &ApplicationCommandInteractionDataOption, app: &App) -> anyhow::Result<()> {
    let election = match find_election(ctx, interaction, opt, app).await? {
        None => return Ok(()),
        Some(v) => v,
    };

    let voter_id = interaction.user.id.as_u64().to_string();
    let status = election.status_at(Utc::now());

    let your_vote = if app.has_voted(&voter_id, &election.id) {
        "Vote revealed. Thank you for participating!".to_owned()
    } else if app.has_committed(&voter_id, &election.id) {
        "Vote committed. Remember to reveal during the reveal phase.".to_owned()
    } else {
        match status {
            Phase::Upcoming => "Voting has not started yet.".to_owned(),
            Phase::Commit => format!("Commit phase active: use `/commit {}`.", election.id),
            Phase::Reveal => "Reveal phase active, but you did not commit a vote.".to_owned(),
            Phase::Closed => "Voting has ended.".to_owned(),
        }
    };

    interaction.create_followup_message(&ctx.http, |r| r.embed(|e| {
        e.title(&election.title);
        e.description(truncate(&election.description, 1000));
        e.thumbnail(THUMBNAIL);

        e.field("Status", status, true);
        e.field("Votes", election.total_votes, true);
        e.field("Phases", phase_lines(&election.phases), false);

        for c in election.candidates.iter().take(20) {
            e.field(
                &c.name,
                truncate(&format!("{}\nManifesto: `{}`", c.manifesto, c.manifesto_cid), 1024),
                false,
            );
        }

        e.field("Your vote", your_vote, false);

        e
    })).await?;

    Ok(())
}

async fn election_results(ctx: &Context, interaction: &ApplicationCommandInteraction, opt: &ApplicationCommandInteractionDataOption, app: &App) -> anyhow::Result<()> {
    let election = match find_election(ctx, interaction, opt, app).await? {
        None => return Ok(()),
        Some(v) => v,
    };

    let voter_id = interaction.user.id.as_u64().to_string();
    let closed = election.status_at(Utc::now()) == Phase::Closed;

    if !closed && !app.has_voted(&voter_id, &election.id) && !permissions::is_admin(interaction) {
        command_resp::reply_deferred_result(ctx, interaction, format!(
            "Results for **{}** are available once voting closes ({}) or after you reveal your vote.",
            election.title, discord_time(&election.phases.reveal_end)
        )).await?;
        return Ok(());
    }

    let results = tally::tally(&election);

    interaction.create_followup_message(&ctx.http, |r| r.embed(|e| {
        e.title("Election results");
        e.thumbnail(THUMBNAIL);

        e.field("Election", format!("{} (`{}`)", results.title, results.election_id), false);

        match results.leader() {
            None => {
                e.field("Winner", "No votes have been counted yet.", false);
            }
            Some(_) if results.is_tied() => {
                let names = results.standings.iter()
                    .filter(|s| s.rank == 1)
                    .map(|s| s.name.as_str())
                    .join(", ");
                e.field("Tie", format!("{} with {} votes each", names, results.standings[0].votes), false);
            }
            Some(leader) => {
                e.field("Winner", format!(
                    "**{}** with {} votes ({})",
                    leader.name, leader.votes, percent(leader.percentage)
                ), false);
            }
        }

        let mut res_string = String::new();
        for s in &results.standings {
            res_string.push_str(&format!(
                "**{}**. **{}**: {} votes ({})\n",
                num_word(s.rank), s.name, s.votes, percent(s.percentage)
            ));
        }
        e.field("Standings", truncate(&res_string, 1024), false);

        e.field("Total votes", results.total_votes, true);
        e.field("Turnout", format!("{}%", results.turnout), true);
        e.field("Margin", results.margin, true);
        e.field("Duration", format!("{} days", results.duration_days), true);

        e
    })).await?;

    Ok(())
}

async fn election_monitor(ctx: &Context, interaction: &ApplicationCommandInteraction, opt: &ApplicationCommandInteractionDataOption, app: &App) -> anyhow::Result<()> {
    if !permissions::require_admin(ctx, interaction, "/election monitor").await? {
        return Ok(());
    }

    let election = match command_opt::find_string_opt(&opt.options, "id") {
        None => None,
        Some(_) => match find_election(ctx, interaction, opt, app).await? {
            None => return Ok(()),
            Some(v) => Some(v),
        },
    };
    let election_id = election.as_ref().map(|e| e.id.as_str());

    let now = Utc::now();
    let active = app.store.list_active(now).await;
    let counts = app.activity.counts(election_id).await;
    let events = app.activity.recent(election_id, 10).await;

    interaction.create_followup_message(&ctx.http, |r| r.embed(|e| {
        e.title("Live monitoring");
        e.thumbnail(THUMBNAIL);

        match &election {
            None => {
                let names = match active.len() {
                    0 => "None".to_owned(),
                    _ => active.iter().map(|a| format!("{} (`{}`, {})", a.title, a.id, a.status_at(now))).join("\n"),
                };
                e.field("Active elections", truncate(&names, 1024), false);
            }
            Some(election) => {
                let (committed, revealed) = app.ledger.counts(&election.id);
                e.field("Election", format!("{} (`{}`, {})", election.title, election.id, election.status_at(now)), false);
                e.field("Committed voters", committed, true);
                e.field("Revealed voters", revealed, true);
                e.field("Turnout", format!("{}%", election.turnout), true);
            }
        }

        e.field("Commits", counts.commits, true);
        e.field("Reveals", counts.reveals, true);
        e.field("Voter IDs minted", counts.mints, true);

        let log = match events.len() {
            0 => "Waiting for activity...".to_owned(),
            _ => events.iter()
                .map(|ev| {
                    let candidate = ev.candidate.as_ref().map(|c| format!(" for {}", c)).unwrap_or_default();
                    format!("`{}` {} by {}{}", format_time(&ev.at), ev.kind.describe(), ev.voter, candidate)
                })
                .join("\n"),
        };
        e.field("Recent activity", truncate(&log, 1024), false);

        e
    })).await?;

    Ok(())
}

async fn election_stats(ctx: &Context, interaction: &ApplicationCommandInteraction, app: &App) -> anyhow::Result<()> {
    if !permissions::require_admin(ctx, interaction, "/election stats").await? {
        return Ok(());
    }

    let o = overview(&app.store.list().await);

    interaction.create_followup_message(&ctx.http, |r| r.embed(|e| {
        e.title("Election statistics");
        e.thumbnail(THUMBNAIL);

        e.field("Elections", o.elections, true);
        e.field("Active", o.active, true);
        e.field("Closed", o.closed, true);
        e.field("Total votes", o.total_votes, true);
        e.field("Average turnout", format!("{}%", o.average_turnout), true);

        e
    })).await?;

    Ok(())
}

async fn election_export(ctx: &Context, interaction: &ApplicationCommandInteraction, opt: &ApplicationCommandInteractionDataOption, app: &App) -> anyhow::Result<()> {
    if !permissions::require_admin(ctx, interaction, "/election export").await? {
        return Ok(());
    }

    let election = match find_election(ctx, interaction, opt, app).await? {
        None => return Ok(()),
        Some(v) => v,
    };
    let format = command_opt::find_required(ctx, interaction, &opt.options, command_opt::find_string_opt, "format").await?;

    let results = tally::tally(&election);
    let (lang, body) = match format.as_str() {
        "csv" => ("csv", tally::to_csv(&results)),
        _ => ("json", tally::to_json(&results)?),
    };

    if let Some(block) = export_block(lang, &body) {
        command_resp::reply_deferred_result(ctx, interaction, block).await?;
        return Ok(());
    }

    let filename = format!("{}.{}", election.id, lang);
    interaction.channel_id.send_files(&ctx.http, vec![AttachmentType::Bytes {
        data: Cow::Owned(body.into_bytes()),
        filename: filename.clone(),
    }], |m| m).await?;
    command_resp::reply_deferred_result(ctx, interaction, format!(
        "The export is too large for a message; it was attached as `{}`.", filename
    )).await?;

    Ok(())
}

/// The export as a code block, or `None` when it would not fit in one message.
fn export_block(lang: &str, body: &str) -> Option<String> {
    let block = format!("```{}\n{}\n```", lang, body);
    if block.chars().count() > command_resp::MAX_CONTENT {
        return None;
    }
    Some(block)
}

pub async fn election(ctx: Context, interaction: ApplicationCommandInteraction) -> anyhow::Result<()> {
    command_resp::reply_deferred_ack(&ctx, &interaction).await?;

    let app = bot_app(&ctx).await?;

    let sub = match interaction.data.options.first() {
        None => return Ok(()),
        Some(v) => v,
    };

    match sub.name.as_str() {
        "create" => election_create(&ctx, &interaction, sub, &app).await?,
        "list" => election_list(&ctx, &interaction, &app).await?,
        "view" => election_view(&ctx, &interaction, sub, &app).await?,
        "results" => election_results(&ctx, &interaction, sub, &app).await?,
        "monitor" => election_monitor(&ctx, &interaction, sub, &app).await?,
        "stats" => election_stats(&ctx, &interaction, &app).await?,
        "export" => election_export(&ctx, &interaction, sub, &app).await?,
        _ => {}
    }

    Ok(())
}
