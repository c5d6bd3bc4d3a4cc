use futures::future::BoxFuture;
use serenity::builder::CreateApplicationCommand;
use serenity::client::Context;
use serenity::model::interactions::application_command::ApplicationCommandInteraction;

pub type InteractionHandler = fn(Context, ApplicationCommandInteraction) -> BoxFuture<'static, anyhow::Result<()>>;

pub type CommandBuilder = fn(&mut CreateApplicationCommand) -> &mut CreateApplicationCommand;

pub struct CommandDef {
    pub name: &'static str,
    pub builder: CommandBuilder,
    pub handler: InteractionHandler,
    /// Replace the guild's existing registration on startup.
    pub re_register: bool,
}
