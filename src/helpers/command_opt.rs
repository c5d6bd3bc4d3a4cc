use evlog::meta;
use serenity::client::Context;
use serenity::model::interactions::application_command::{ApplicationCommandInteraction, ApplicationCommandInteractionDataOption, ApplicationCommandInteractionDataOptionValue};

use crate::helpers::command_resp;
use crate::runtime::get_logger;

pub fn find_string_opt(options: &[ApplicationCommandInteractionDataOption], name: &str) -> Option<String> {
    let opt = options.iter().find(|v| v.name == name)?;

    match opt.resolved.as_ref()? {
        ApplicationCommandInteractionDataOptionValue::String(v) => Some(v.clone()),
        _ => None,
    }
}

/// Looks up an option Discord should always send. When it is missing the user is told and an
/// error is returned for the dispatcher to log.
pub async fn find_required<T, F>(
    ctx: &Context,
    interaction: &ApplicationCommandInteraction,
    options: &[ApplicationCommandInteractionDataOption],
    finder: F,
    name: &str,
) -> anyhow::Result<T>
where
    F: Fn(&[ApplicationCommandInteractionDataOption], &str) -> Option<T>,
{
    match finder(options, name) {
        Some(v) => Ok(v),
        None => {
            get_logger().info("Required option missing from interaction.", meta! {
                "InteractionID" => interaction.id,
                "CommandName" => interaction.data.name,
                "Option" => name,
            });
            command_resp::reply_deferred_result(ctx, interaction, format!("Missing required option `{}`.", name)).await?;
            Err(anyhow::anyhow!("missing required option '{}'", name))
        }
    }
}
