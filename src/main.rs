use std::sync::Arc;

use evlog::{LogEventConsolePrinter, Logger, meta};
use serenity::Client;
use serenity::prelude::GatewayIntents;

use crate::app::App;
use crate::campusbot::CampusBot;
use crate::config::Config;
use crate::db::dbclient::DBClient;
use crate::handler::{BotData, BotHandler};
use crate::runtime::{get_logger, set_logger};
use crate::support::register_elections::register_elections_everywhere;

mod activity;
mod app;
mod campusbot;
mod commands;
mod config;
mod db;
mod election;
mod error;
mod handler;
mod helpers;
mod runtime;
mod support;
mod voter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let mut logger = Logger::default();
    logger.register(LogEventConsolePrinter::default());
    set_logger(logger);

    let config = Config::from_env()?;

    let db_client = DBClient::new(&config.database_url).await?;

    let campusbot = CampusBot::new(config.campusbot_url.clone(), config.campusbot_key.clone());
    let app = Arc::new(App::load(db_client.conn().clone(), config.vote_delay, campusbot).await?);

    get_logger().info("Loaded election state.", meta! {
        "Elections" => app.store.list().await.len(),
        "DatabaseURL" => config.database_url,
        "CampusBot" => app.campusbot.is_configured(),
    });

    let mut client = Client::builder(&config.token, GatewayIntents::non_privileged())
        .event_handler(BotHandler {})
        .application_id(config.application_id)
        .await?;

    let cache_and_http = client.cache_and_http.clone();
    app.clone().spawn_refresh(config.refresh_interval, move |elections| {
        let cache_and_http = cache_and_http.clone();
        async move {
            register_elections_everywhere(&cache_and_http.cache, &cache_and_http.http, &elections).await;
        }
    });
    client.data.write().await.insert::<BotData>(BotData::new(app));

    if let Err(e) = client.start_shards(config.shards).await {
        get_logger().error("Client error.", meta! {
            "Error" => e,
        });
        return Err(e.into());
    }

    Ok(())
}
