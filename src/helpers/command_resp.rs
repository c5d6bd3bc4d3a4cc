use serenity::client::Context;
use serenity::model::interactions::application_command::ApplicationCommandInteraction;
use serenity::model::interactions::{InteractionApplicationCommandCallbackDataFlags, InteractionResponseType};

use crate::support::text::truncate;

/// Discord rejects message content longer than this.
pub const MAX_CONTENT: usize = 2000;

pub async fn reply_deferred_ack(ctx: &Context, interaction: &ApplicationCommandInteraction) -> anyhow::Result<()> {
    interaction.create_interaction_response(&ctx.http, |r| {
        r.kind(InteractionResponseType::DeferredChannelMessageWithSource)
    }).await?;

    Ok(())
}

/// Like `reply_deferred_ack`, but the eventual reply is only visible to the invoker.
pub async fn reply_deferred_ephemeral_ack(ctx: &Context, interaction: &ApplicationCommandInteraction) -> anyhow::Result<()> {
    interaction.create_interaction_response(&ctx.http, |r| {
        r.kind(InteractionResponseType::DeferredChannelMessageWithSource)
            .interaction_response_data(|d| d.flags(InteractionApplicationCommandCallbackDataFlags::EPHEMERAL))
    }).await?;

    Ok(())
}

pub async fn reply_deferred_result<S: AsRef<str>>(ctx: &Context, interaction: &ApplicationCommandInteraction, content: S) -> anyhow::Result<()> {
    let content = truncate(content.as_ref(), MAX_CONTENT);

    interaction.edit_original_interaction_response(&ctx.http, |r| {
        r.content(content)
    }).await?;

    Ok(())
}
