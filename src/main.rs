use std::sync::Arc;

use poise::{serenity_prelude as serenity, CreateReply, FrameworkError};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use directory::SerenityDirectory;
use lifecycle::TempVoiceManager;
use store::JsonStateStore;

pub mod commands;
pub mod directory;
pub mod lifecycle;
pub mod models;
pub mod store;
mod utils;

pub type Manager = TempVoiceManager<SerenityDirectory, Arc<JsonStateStore>>;

pub struct Data {
    pub manager: Arc<Manager>,
    pub store: Arc<JsonStateStore>,
}

type Error = anyhow::Error;
type Context<'a> = poise::Context<'a, Data, Error>;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let appender_layer = fmt::layer()
        .compact()
        // disable any ansi escape sequences, otherwise will be written to file
        .with_ansi(false)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(tracing_appender::rolling::daily("./logs", "roomkeeper-log"));

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_timer(ChronoLocal::rfc_3339()).pretty())
        .with(appender_layer)
        .init();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![commands::set::set(), commands::role_panel::role_panel()],
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some("!".into()),
                ..Default::default()
            },
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            on_error: |error| Box::pin(on_error(error)),
            pre_command: |ctx| {
                Box::pin(async move {
                    let _ = ctx.defer_or_broadcast().await;
                    tracing::info!(
                        "{}({}) executed command {}",
                        ctx.author().name,
                        ctx.author().id,
                        ctx.invoked_command_name()
                    );
                })
            },
            ..Default::default()
        })
        .setup(|ctx, ready, framework| {
            Box::pin(async move {
                tracing::info!("Ready! @{}", ready.user.name);
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                let state_path =
                    std::env::var("STATE_FILE").unwrap_or_else(|_| "state.json".to_string());
                let store = Arc::new(JsonStateStore::open(&state_path).await?);
                let manager = Arc::new(TempVoiceManager::new(
                    SerenityDirectory::new(ctx.clone()),
                    Arc::clone(&store),
                    store.hub_settings().await,
                ));

                // the first tick also reconciles whatever a previous process
                // left behind in the registry
                let sweeper = Arc::clone(&manager);
                tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(lifecycle::SWEEP_INTERVAL);
                    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                    loop {
                        ticker.tick().await;
                        sweeper.sweep().await;
                    }
                });

                Ok(Data { manager, store })
            })
        })
        .build();

    let token = std::env::var("DISCORD_TOKEN").expect("missing DISCORD_TOKEN");
    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_VOICE_STATES
        | serenity::GatewayIntents::GUILD_MESSAGE_REACTIONS;

    let client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await;

    client.unwrap().start().await.unwrap()
}

async fn on_error(error: FrameworkError<'_, Data, Error>) {
    if let Err(e) = match error {
        FrameworkError::Setup { error, .. } => {
            tracing::error!("Error in user data setup: {:?}", error);
            Ok(())
        }
        FrameworkError::Command { error, ctx, .. } => {
            tracing::error!(
                "Error in command `{}:` {:?}",
                ctx.command().qualified_name,
                error
            );
            ctx.send(
                CreateReply::default()
                    .embed(
                        serenity::CreateEmbed::default()
                            .title("Something went wrong")
                            .description(&error.to_string())
                            .color(serenity::Color::RED),
                    )
                    .reply(true)
                    .allowed_mentions(
                        serenity::CreateAllowedMentions::default().replied_user(false),
                    ),
            )
            .await
            .map(|_| ())
        }
        FrameworkError::EventHandler { error, event, .. } => {
            tracing::error!(
                "User event event handler encountered an error on {:?} event: {:?}",
                event,
                error
            );
            Ok(())
        }
        FrameworkError::ArgumentParse {
            ctx, input, error, ..
        } => {
            let usage = match &ctx.command().help_text {
                Some(help_text) => &**help_text,
                None => "No help available",
            };
            let response = if let Some(input) = input {
                format!("**Cannot parse `{}`: {}**\n{}", input, error, usage)
            } else {
                format!("**{}**\n{}", error, usage)
            };
            ctx.say(response).await.map(|_| ())
        }
        error => poise::builtins::on_error(error).await,
    } {
        tracing::error!("Error in framework: {:?}", e);
    }
}

async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::VoiceStateUpdate { old, new } => {
            let Some(guild_id) = new.guild_id else {
                return Ok(());
            };
            let old_channel = old.as_ref().and_then(|state| state.channel_id);
            if old_channel == new.channel_id {
                // mute/deafen toggles, nothing moved
                return Ok(());
            }

            if let Some(hub) = data.manager.hub_settings().await {
                if hub.guild_id == guild_id.get()
                    && new.channel_id.map(|id| id.get()) == Some(hub.hub_channel_id)
                {
                    let member = guild_id.member(&ctx, new.user_id).await?;
                    let display_name = member.display_name().to_string();
                    tracing::info!("{} joined the voice hub", display_name);
                    if let Err(e) = data
                        .manager
                        .member_entered_hub(new.user_id.get(), &display_name)
                        .await
                    {
                        tracing::error!(
                            "failed to provision temp voice for {}: {}",
                            display_name,
                            e
                        );
                    }
                }
            }

            if let Some(channel_id) = old_channel {
                Arc::clone(&data.manager)
                    .member_left_channel(channel_id.get())
                    .await;
            }
        }
        serenity::FullEvent::ReactionAdd { add_reaction } => {
            apply_reaction_role(ctx, data, add_reaction, RoleAction::Grant).await;
        }
        serenity::FullEvent::ReactionRemove { removed_reaction } => {
            apply_reaction_role(ctx, data, removed_reaction, RoleAction::Revoke).await;
        }
        _ => {}
    }
    Ok(())
}

enum RoleAction {
    Grant,
    Revoke,
}

async fn apply_reaction_role(
    ctx: &serenity::Context,
    data: &Data,
    reaction: &serenity::Reaction,
    action: RoleAction,
) {
    let Some(guild_id) = reaction.guild_id else {
        return;
    };
    let Some(user_id) = reaction.user_id else {
        return;
    };
    if user_id == ctx.cache.current_user().id {
        return;
    }

    let emoji = reaction.emoji.to_string();
    let Some(role_id) = data
        .store
        .reaction_role(reaction.message_id.get(), &emoji)
        .await
    else {
        return;
    };
    let role_id = serenity::RoleId::new(role_id);

    let result = match action {
        RoleAction::Grant => {
            ctx.http
                .add_member_role(guild_id, user_id, role_id, Some("Reaction role add"))
                .await
        }
        RoleAction::Revoke => {
            ctx.http
                .remove_member_role(guild_id, user_id, role_id, Some("Reaction role remove"))
                .await
        }
    };
    if let Err(e) = result {
        tracing::error!(
            "failed to update reaction role {} for {}: {:?}",
            role_id,
            user_id,
            e
        );
    }
}
