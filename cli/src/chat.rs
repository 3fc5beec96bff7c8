use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail};
use beacon_core::{
    format_message_time, AppAction, AppConfig, AppState, Author, BeaconApp, Collaborators,
    FixedLocation, InMemoryRoomRelay, RoomStatus, StaticIncidents,
};
use chrono::Local;

use crate::cli::ChatArgs;

const POLL: Duration = Duration::from_millis(20);

fn wait_for(
    app: &BeaconApp,
    what: &str,
    timeout: Duration,
    mut done: impl FnMut(&AppState) -> bool,
) -> anyhow::Result<AppState> {
    let start = Instant::now();
    loop {
        let state = app.state();
        if done(&state) {
            return Ok(state);
        }
        if let Some(err) = &state.last_error {
            bail!("{what}: {} ({})", err.detail, err.kind.as_str());
        }
        if start.elapsed() >= timeout {
            bail!("{what}: timed out after {}s", timeout.as_secs());
        }
        std::thread::sleep(POLL);
    }
}

/// Runs one session against an in-process relay: joins the room, posts every
/// message, waits for each to come back through the subscription and prints
/// the resulting feed.
pub fn chat(data_dir: &str, config: &AppConfig, json: bool, args: ChatArgs) -> anyhow::Result<()> {
    let incidents = crate::load_incidents(config, &args.input)?;
    if !incidents.iter().any(|i| i.id == args.room) {
        return Err(anyhow!("no active incident with id {}", args.room));
    }
    let timeout = Duration::from_secs(args.timeout_secs.max(1));

    let relay = Arc::new(InMemoryRoomRelay::new());
    let collaborators = Collaborators::new(
        Arc::new(StaticIncidents(incidents)),
        Arc::new(FixedLocation(None)),
        relay,
    );
    let app = BeaconApp::new(data_dir.to_string(), collaborators)?;

    let me = Author::new(args.author.trim(), args.name.trim());
    app.dispatch(AppAction::SetIdentity { author: me.clone() });
    app.dispatch(AppAction::RefreshIncidents);
    wait_for(&app, "load incidents", timeout, |s| {
        !s.busy.fetching_incidents && s.incident(&args.room).is_some()
    })?;

    app.dispatch(AppAction::OpenRoom {
        incident_id: args.room.clone(),
    });
    wait_for(&app, "open room", timeout, |s| {
        s.room.status == RoomStatus::Open && s.room.incident_id.as_deref() == Some(args.room.as_str())
    })?;

    for (sent, text) in args.messages.iter().enumerate() {
        app.dispatch(AppAction::SendMessage {
            room_id: args.room.clone(),
            text: text.clone(),
        });
        let own = sent + 1;
        wait_for(&app, "deliver message", timeout, |s| {
            s.room.messages.iter().filter(|m| m.is_own).count() >= own
        })?;
    }

    let state = app.state();
    app.dispatch(AppAction::CloseRoom);

    if json {
        let body = serde_json::json!({
            "ok": true,
            "room": args.room,
            "messages": state.room.messages,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let title = state
        .incident(&args.room)
        .map(|i| i.title.as_str())
        .unwrap_or_default();
    println!("# {title} ({})", args.room);
    let now = Local::now();
    for view in &state.room.messages {
        println!(
            "[{}] {}: {}",
            format_message_time(view.message.timestamp, &now),
            view.author_label,
            view.message.text
        );
    }
    Ok(())
}
