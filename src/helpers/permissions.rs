use evlog::meta;
use serenity::client::Context;
use serenity::model::interactions::application_command::ApplicationCommandInteraction;
use serenity::model::Permissions;

use crate::helpers::command_resp;
use crate::runtime::get_logger;

pub fn is_admin(interaction: &ApplicationCommandInteraction) -> bool {
    interaction.member.as_ref()
        .and_then(|m| m.permissions)
        .map(|p| p.contains(Permissions::ADMINISTRATOR))
        .unwrap_or(false)
}

/// Replies with a refusal and returns `false` unless the invoker is a server administrator.
pub async fn require_admin(ctx: &Context, interaction: &ApplicationCommandInteraction, usage: &str) -> anyhow::Result<bool> {
    let permissions = match interaction.member.as_ref().and_then(|m| m.permissions) {
        None => {
            get_logger().info("Could not read interaction invoker's permissions.", meta! {
                "InteractionID" => interaction.id,
            });
            command_resp::reply_deferred_result(ctx, interaction, "Could not read interaction invoker's permissions.").await?;
            return Ok(false);
        }
        Some(v) => v,
    };

    if !permissions.contains(Permissions::ADMINISTRATOR) {
        get_logger().info("Non-administrator attempted an admin command.", meta! {
            "InteractionID" => interaction.id,
            "UserID" => interaction.user.id,
            "Usage" => usage,
        });
        command_resp::reply_deferred_result(ctx, interaction, format!(
            "Only members with the 'Administrator' permission may use {}.", usage
        )).await?;
        return Ok(false);
    }

    Ok(true)
}
