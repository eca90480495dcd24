//! Background tasks: notice delivery, the periodic leaderboard post and the
//! live status message.

use crate::app::{AppContext, NoticeReceiver};
use crate::remote;
use dropkeeper_core::leaderboard::leaderboard_text;
use dropkeeper_core::schedule::RunGuard;
use dropkeeper_core::status::{LIST_PLAYERS, ServerStatus, render_status};
use poise::serenity_prelude::{ChannelId, CreateMessage, EditMessage, Http, MessageId};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

pub fn spawn_all(http: Arc<Http>, app: Arc<AppContext>, notices: NoticeReceiver) {
    let discord = &app.config.discord;
    let leaderboard_channel = discord.leaderboard_channel_id.map(ChannelId::new);
    let status_channel = discord.status_channel_id.map(ChannelId::new);

    tokio::spawn(deliver_notices(Arc::clone(&http), leaderboard_channel, notices));

    match leaderboard_channel {
        Some(channel) if app.config.leaderboard.daily => {
            let period = Duration::from_secs(app.config.leaderboard.interval_hours.saturating_mul(3600));
            let last_post = Arc::new(Mutex::new(None));
            let http = Arc::clone(&http);
            let app = Arc::clone(&app);
            tokio::spawn(run_periodic("leaderboard", period, move || {
                post_leaderboard(Arc::clone(&http), Arc::clone(&app), channel, Arc::clone(&last_post))
            }));
        }
        None if app.config.leaderboard.daily => {
            tracing::warn!("No leaderboard channel configured, daily leaderboard is disabled");
        }
        _ => {}
    }

    if app.config.status.enabled {
        match status_channel {
            Some(channel) => {
                let period = Duration::from_secs(app.config.status.interval_secs);
                let status_message = Arc::new(Mutex::new(None));
                let http = Arc::clone(&http);
                let app = Arc::clone(&app);
                tokio::spawn(run_periodic("status", period, move || {
                    refresh_status(Arc::clone(&http), Arc::clone(&app), channel, Arc::clone(&status_message))
                }));
            }
            None => tracing::warn!("No status channel configured, live status is disabled"),
        }
    }
}

/// Fire `job` every `period`. A firing that finds the previous run still in
/// progress is skipped.
pub async fn run_periodic<F, Fut>(name: &'static str, period: Duration, job: F)
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let guard = RunGuard::new();
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        match guard.try_begin() {
            Some(permit) => {
                let run = job();
                tokio::spawn(async move {
                    let _permit = permit;
                    run.await;
                });
            }
            None => tracing::warn!(task = name, "Previous run still in progress, skipping"),
        }
    }
}

async fn deliver_notices(http: Arc<Http>, channel: Option<ChannelId>, mut notices: NoticeReceiver) {
    while let Some(notice) = notices.recv().await {
        let Some(channel) = channel else {
            tracing::warn!(notice = %notice, "No channel for notice");
            continue;
        };
        if let Err(e) = channel.send_message(&http, CreateMessage::new().content(&notice)).await {
            tracing::error!(error = %e, "Failed to post notice");
        }
    }
}

/// Post the leaderboard, then remove the previous post. A failed send keeps
/// the old post in place.
async fn post_leaderboard(
    http: Arc<Http>,
    app: Arc<AppContext>,
    channel: ChannelId,
    last_post: Arc<Mutex<Option<MessageId>>>,
) {
    let text = match app
        .blocking(|app| {
            let board = &app.config.leaderboard;
            leaderboard_text(&app.drops, &board.server_name, board.limit)
        })
        .await
    {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build leaderboard");
            return;
        }
    };

    let (http, text) = (&http, &text);
    let mut last_post = last_post.lock().await;
    replace_post(
        &mut *last_post,
        move || async move {
            channel
                .send_message(http, CreateMessage::new().content(text))
                .await
                .map(|msg| msg.id)
        },
        move |previous| async move { channel.delete_message(http, previous).await },
    )
    .await;
}

/// Send the new post first and only then delete `last`, so a failed send
/// leaves the previous post visible.
async fn replace_post<S, SF, D, DF, E>(last: &mut Option<MessageId>, send: S, delete: D)
where
    S: FnOnce() -> SF,
    SF: Future<Output = Result<MessageId, E>>,
    D: FnOnce(MessageId) -> DF,
    DF: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    let posted = match send().await {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(error = %e, "Failed to post leaderboard");
            return;
        }
    };
    tracing::info!(message_id = %posted, "Leaderboard posted");

    if let Some(previous) = last.replace(posted) {
        if let Err(e) = delete(previous).await {
            tracing::warn!(error = %e, "Failed to remove previous leaderboard post");
        }
    }
}

/// Edit the status message in place, posting a new one the first time or
/// when the old one is gone.
async fn refresh_status(
    http: Arc<Http>,
    app: Arc<AppContext>,
    channel: ChannelId,
    status_message: Arc<Mutex<Option<MessageId>>>,
) {
    let statuses = collect_statuses(&app).await;
    let text = render_status(&statuses, app.started_at, chrono::Utc::now());

    let mut status_message = status_message.lock().await;
    if let Some(msg_id) = *status_message {
        match channel.edit_message(&http, msg_id, EditMessage::new().content(&text)).await {
            Ok(_) => return,
            Err(e) => tracing::warn!(error = %e, "Failed to edit status message, posting a new one"),
        }
    }

    match channel.send_message(&http, CreateMessage::new().content(&text)).await {
        Ok(msg) => *status_message = Some(msg.id),
        Err(e) => tracing::error!(error = %e, "Failed to post status message"),
    }
}

/// Ask every server for its player list, concurrently. Unreachable servers
/// are reported offline.
pub async fn collect_statuses(app: &AppContext) -> Vec<ServerStatus> {
    let mut probes = JoinSet::new();
    for (index, client) in app.servers().into_iter().enumerate() {
        let policy = app.retry;
        probes.spawn(async move {
            let status = match remote::execute(&client, LIST_PLAYERS, &policy).await {
                Ok(response) => ServerStatus::from_response(client.name(), &response),
                Err(e) => {
                    tracing::warn!(server = client.name(), error = %e, "Server did not answer status probe");
                    ServerStatus::offline(client.name())
                }
            };
            (index, status)
        });
    }

    let mut statuses = Vec::with_capacity(probes.len());
    while let Some(joined) = probes.join_next().await {
        match joined {
            Ok(entry) => statuses.push(entry),
            Err(e) => tracing::error!(error = %e, "Status probe panicked"),
        }
    }
    statuses.sort_by_key(|(index, _)| *index);
    statuses.into_iter().map(|(_, status)| status).collect()
}
