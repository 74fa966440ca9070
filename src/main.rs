use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{ChatMemberUpdated, MessageEntityKind};
use tracing::{error, info};
use tracing_subscriber::prelude::*;

use fridaybot::exam::ExamCountdown;
use fridaybot::scheduler::Scheduler;
use fridaybot::status::DEFAULT_PACING;
use fridaybot::telegram_log::TelegramLogLayer;
use fridaybot::{
    BotIdentity, CommandHandler, Config, IncomingMessage, Lifecycle, MembershipChange, Responder,
    StatusService, TelegramClient, Transport,
};

struct BotState {
    me: BotIdentity,
    commands: CommandHandler,
    lifecycle: Lifecycle,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let config = match Config::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            // The full subscriber needs LOG_DIR from the config, so report on stderr only
            let stderr = tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .finish();
            tracing::subscriber::with_default(stderr, || error!("Invalid configuration: {e}"));
            std::process::exit(1);
        }
    };

    let bot = Bot::new(&config.telegram_bot_token);
    let transport: Arc<dyn Transport> = Arc::new(TelegramClient::new(bot.clone()));

    // Setup logging
    std::fs::create_dir_all(&config.log_dir).ok();
    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "fridaybot.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let tg_layer = config
        .log_chat_id
        .map(|chat_id| TelegramLogLayer::new(transport.clone(), chat_id.0));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(tg_layer)
        .init();

    info!("🚀 Starting fridaybot...");
    info!("Exam date: {}", config.exam_date);
    info!("Admin IDs: {:?}", config.admin_ids);
    if let Some(ref time) = config.notification_time {
        info!("NOTIFICATION_TIME={time} is ignored, daily notification runs at 05:00");
    }

    let me = match transport.get_me().await {
        Ok(me) => me,
        Err(e) => {
            error!("Error starting bot: {e}");
            std::process::exit(1);
        }
    };

    let status = StatusService::new(DEFAULT_PACING);
    status.attach_transport(transport.clone()).await;

    let responder = Arc::new(Responder::new(
        config.chatgpt_api_url.clone(),
        config.persona.clone(),
        config.syllabus_link.clone(),
    ));
    let commands = CommandHandler::new(
        config.clone(),
        status.clone(),
        responder,
        transport.clone(),
        me.username.clone(),
    );
    let lifecycle = Lifecycle::new(config.admin_ids.clone(), status.clone(), transport.clone());
    let scheduler = Scheduler::spawn(
        status.clone(),
        ExamCountdown::new(config.exam_date),
        config.timezone,
    );

    lifecycle.on_startup(&me).await;

    let state = Arc::new(BotState { me, commands, lifecycle });

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_my_chat_member().endpoint(handle_my_chat_member));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    scheduler.shutdown();
    status.shutdown().await;
    info!("👋 Bye");
}

async fn handle_message(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    if let Some(incoming) = telegram_to_incoming(&msg, &state.me) {
        state.commands.handle_message(&incoming).await;
    }
    Ok(())
}

async fn handle_my_chat_member(update: ChatMemberUpdated, state: Arc<BotState>) -> ResponseResult<()> {
    let chat = &update.chat;
    let chat_type = if chat.is_supergroup() {
        "supergroup"
    } else if chat.is_group() {
        "group"
    } else if chat.is_channel() {
        "channel"
    } else {
        "private"
    };

    let change = MembershipChange {
        chat_id: chat.id.0,
        title: chat.title().unwrap_or("untitled").to_string(),
        chat_type: chat_type.to_string(),
        old_status: update.old_chat_member.status().into(),
        new_status: update.new_chat_member.status().into(),
    };
    state.lifecycle.on_membership_change(&change).await;
    Ok(())
}

fn telegram_to_incoming(msg: &Message, me: &BotIdentity) -> Option<IncomingMessage> {
    let text = msg.text()?;

    let handle = format!("@{}", me.username);
    let mentions_bot = msg
        .parse_entities()
        .map(|entities| {
            entities.iter().any(|e| {
                matches!(e.kind(), MessageEntityKind::Mention) && e.text().eq_ignore_ascii_case(&handle)
            })
        })
        .unwrap_or(false);

    let replies_to_bot = msg
        .reply_to_message()
        .and_then(|reply| reply.from.as_ref())
        .is_some_and(|user| user.id.0 == me.id);

    Some(IncomingMessage {
        chat_id: msg.chat.id.0,
        user_id: msg.from.as_ref().map(|u| u.id),
        text: text.to_string(),
        mentions_bot,
        replies_to_bot,
    })
}
