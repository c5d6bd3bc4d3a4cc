use serenity::builder::CreateApplicationCommand;
use serenity::client::Context;
use serenity::model::interactions::application_command::{ApplicationCommandInteraction, ApplicationCommandOptionType};

use crate::campusbot::SUGGESTED_QUESTIONS;
use crate::handler::bot_app;
use crate::helpers::{command_opt, command_resp};

pub const ASK: &str = "ask";

pub fn ask_builder(cmd: &mut CreateApplicationCommand) -> &mut CreateApplicationCommand {
    cmd.name(ASK)
        .description("Ask CampusBot about voting and student elections")
        .create_option(|opt| opt
            .name("prompt")
            .description("Your question; leave empty for suggestions")
            .required(false)
            .kind(ApplicationCommandOptionType::String));

    cmd
}

fn suggestions() -> String {
    let mut s = String::from("Try asking:\n");
    for q in SUGGESTED_QUESTIONS {
        s.push_str(&format!("- {}\n", q));
    }
    s
}

pub async fn ask(ctx: Context, interaction: ApplicationCommandInteraction) -> anyhow::Result<()> {
    command_resp::reply_deferred_ack(&ctx, &interaction).await?;

    let prompt = command_opt::find_string_opt(&interaction.data.options, "prompt")
        .filter(|p| !p.trim().is_empty());

    let prompt = match prompt {
        None => {
            command_resp::reply_deferred_result(&ctx, &interaction, suggestions()).await?;
            return Ok(());
        }
        Some(v) => v,
    };

    let app = bot_app(&ctx).await?;
    let answer = app.campusbot.ask(&prompt).await;

    command_resp::reply_deferred_result(&ctx, &interaction, format!("> {}\n\n{}", prompt.trim(), answer)).await?;

    Ok(())
}
