use std::collections::HashMap;
use std::sync::Arc;

use evlog::meta;
use serenity::async_trait;
use serenity::client::{Context, EventHandler};
use serenity::model::guild::Guild;
use serenity::model::id::GuildId;
use serenity::model::interactions::{Interaction, InteractionResponseType, InteractionType};
use serenity::prelude::TypeMapKey;

use crate::app::App;
use crate::commands;
use crate::runtime::get_logger;
use crate::support::register_elections::register_elections;

pub struct BotData {
    pub app: Arc<App>,
}

impl BotData {
    pub fn new(app: Arc<App>) -> Self {
        Self {
            app,
        }
    }
}

impl TypeMapKey for BotData {
    type Value = BotData;
}

pub async fn bot_app(ctx: &Context) -> anyhow::Result<Arc<App>> {
    let data = ctx.data.read().await;
    match data.get::<BotData>() {
        None => Err(anyhow::anyhow!("bot data was not installed")),
        Some(v) => Ok(v.app.clone()),
    }
}

async fn register_guild(ctx: &Context, guild: &Guild) -> anyhow::Result<()> {
    let existing_cmds = guild.get_application_commands(&ctx.http).await?;

    let existing_map = existing_cmds.iter()
        .map(|v| (v.name.clone(), v))
        .collect::<HashMap<_, _>>();

    for cmd in commands::COMMANDS {
        if existing_map.contains_key(cmd.name) && !cmd.re_register {
            get_logger().debug("Command already registered in this server.", meta! {
                "GuildID" => guild.id,
                "GuildName" => guild.name,
                "Command" => cmd.name
            });
            continue;
        }

        let created = guild.create_application_command(&ctx.http, |c| {
            (cmd.builder)(c)
        }).await?;

        get_logger().debug("Registered command in server.", meta! {
            "GuildID" => guild.id,
            "GuildName" => guild.name,
            "Command" => cmd.name,
            "ID" => created.id
        });
    }

    let app = bot_app(ctx).await?;
    register_elections(&ctx.http, guild.id, &app.store.list().await).await?;

    Ok(())
}

pub struct BotHandler {}

#[async_trait]
impl EventHandler for BotHandler {
    async fn cache_ready(&self, _ctx: Context, _guilds: Vec<GuildId>) {}

    async fn guild_create(&self, ctx: Context, guild: Guild, _is_new: bool) {
        get_logger().info("Guild ready.", meta![
            "ID" => guild.id,
            "Name" => guild.name,
        ]);

        if let Err(e) = register_guild(&ctx, &guild).await {
            get_logger().error("Failed to register commands in server.", meta! {
                "GuildID" => guild.id,
                "GuildName" => guild.name,
                "Error" => e,
            });
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::ApplicationCommand(interaction) = interaction {
            let guild_id = interaction.guild_id.map(|v| v.to_string()).unwrap_or_default();

            if interaction.kind == InteractionType::Ping {
                get_logger().info("Interaction ping.", meta! {
                    "GuildID" => guild_id,
                    "InteractionID" => interaction.id
                });

                if let Err(e) = interaction.create_interaction_response(ctx.http.as_ref(), |r| {
                    r.kind(InteractionResponseType::Pong)
                }).await {
                    get_logger().error("Failed to answer interaction ping.", meta! {
                        "InteractionID" => interaction.id,
                        "Error" => e,
                    });
                }
            } else if interaction.kind == InteractionType::ApplicationCommand {
                get_logger().info("Application command.", meta! {
                    "GuildID" => guild_id,
                    "InteractionID" => interaction.id,
                    "CommandID" => interaction.data.id,
                    "CommandName" => interaction.data.name
                });

                let handler = match commands::get_handler(&interaction.data.name) {
                    None => return,
                    Some(v) => v,
                };

                let interaction_id = interaction.id;
                let command_id = interaction.data.id;
                let command_name = interaction.data.name.clone();

                let r: anyhow::Result<()> = handler(ctx, interaction).await;
                match r {
                    Ok(()) => {}
                    Err(e) => {
                        get_logger().error("Error occurred in interaction processor.", meta! {
                            "GuildID" => guild_id,
                            "InteractionID" => interaction_id,
                            "CommandID" => command_id,
                            "CommandName" => command_name,
                            "Error" => e,
                        });
                    }
                }
            }
        }
    }
}
