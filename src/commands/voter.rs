use chrono::Utc;
use evlog::meta;
use serenity::builder::CreateApplicationCommand;
use serenity::client::Context;
use serenity::model::interactions::application_command::{ApplicationCommandInteraction, ApplicationCommandOptionType};

use crate::app::App;
use crate::error::VoteError;
use crate::handler::bot_app;
use crate::helpers::command_resp;
use crate::runtime::get_logger;
use crate::support::parse::format_time;

pub const VOTER: &str = "voter";

pub fn voter_builder(cmd: &mut CreateApplicationCommand) -> &mut CreateApplicationCommand {
    cmd.name(VOTER)
        .description("Manage your voter registration")
        .create_option(|opt| opt
            .name("register")
            .description("Register as a voter and receive a wallet address")
            .kind(ApplicationCommandOptionType::SubCommand))
        .create_option(|opt| opt
            .name("mint")
            .description("Mint your soulbound voter ID")
            .kind(ApplicationCommandOptionType::SubCommand))
        .create_option(|opt| opt
            .name("whoami")
            .description("Show your voter ID and voting status")
            .kind(ApplicationCommandOptionType::SubCommand));

    cmd
}

async fn voter_register(ctx: &Context, interaction: &ApplicationCommandInteraction, app: &App, voter_id: &str) -> anyhow::Result<()> {
    let (voter, created) = match app.register_voter(voter_id, &interaction.user.name).await {
        Ok(v) => v,
        Err(e) => {
            command_resp::reply_deferred_result(ctx, interaction, "Error occurred upon attempt to register you.").await?;
            return Err(e);
        }
    };

    let reply = if created {
        format!("Registered. Your wallet address is `{}`. Next, mint your voter ID with `/voter mint`.", voter.wallet)
    } else {
        format!("You are already registered with wallet `{}`.", voter.wallet)
    };
    command_resp::reply_deferred_result(ctx, interaction, reply).await?;

    Ok(())
}

async fn voter_mint(ctx: &Context, interaction: &ApplicationCommandInteraction, app: &App, voter_id: &str) -> anyhow::Result<()> {
    let voter = match app.mint_voter_id(voter_id).await {
        Ok(v) => v,
        Err(VoteError::Storage(e)) => {
            command_resp::reply_deferred_result(ctx, interaction, "Failed to mint your voter ID. Please try again.").await?;
            return Err(e);
        }
        Err(e) => {
            get_logger().info("Voter ID mint refused.", meta! {
                "InteractionID" => interaction.id,
                "UserID" => voter_id,
                "Reason" => e,
            });
            command_resp::reply_deferred_result(ctx, interaction, e.to_string()).await?;
            return Ok(());
        }
    };

    command_resp::reply_deferred_result(ctx, interaction, format!(
        "Your voter ID is bound to `{}`. It cannot be transferred. You can now vote in open elections.",
        voter.wallet
    )).await?;

    Ok(())
}

async fn voter_whoami(ctx: &Context, interaction: &ApplicationCommandInteraction, app: &App, voter_id: &str) -> anyhow::Result<()> {
    let voter = match app.voters.get(voter_id) {
        None => {
            command_resp::reply_deferred_result(ctx, interaction, VoteError::UnknownVoter.to_string()).await?;
            return Ok(());
        }
        Some(v) => v,
    };

    let mut reply = format!(
        "**{}**\nWallet: `{}`\nVoter ID: {}\nRegistered: {}\n",
        voter.name,
        voter.wallet,
        if voter.has_nft { "minted" } else { "not minted" },
        format_time(&voter.registered_at),
    );

    let now = Utc::now();
    for election in app.store.list().await {
        let record = match app.ledger.record(voter_id, &election.id) {
            None => continue,
            Some(v) => v,
        };
        let state = if record.revealed { "revealed" } else { "committed, not revealed" };
        reply.push_str(&format!(
            "\n**{}** (`{}`, {}): {} at {}",
            election.title, election.id, election.status_at(now), state, format_time(&record.committed_at)
        ));
    }

    command_resp::reply_deferred_result(ctx, interaction, reply).await?;

    Ok(())
}

pub async fn voter(ctx: Context, interaction: ApplicationCommandInteraction) -> anyhow::Result<()> {
    command_resp::reply_deferred_ephemeral_ack(&ctx, &interaction).await?;

    let app = bot_app(&ctx).await?;
    let voter_id = interaction.user.id.as_u64().to_string();

    let sub = match interaction.data.options.first() {
        None => return Ok(()),
        Some(v) => v,
    };

    match sub.name.as_str() {
        "register" => voter_register(&ctx, &interaction, &app, &voter_id).await?,
        "mint" => voter_mint(&ctx, &interaction, &app, &voter_id).await?,
        "whoami" => voter_whoami(&ctx, &interaction, &app, &voter_id).await?,
        _ => {}
    }

    Ok(())
}
