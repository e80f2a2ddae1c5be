//! Delayed stop, restart and update with player warnings.
//!
//! Both loops count ticks (one minute each by default) down from the
//! configured budget. Instances without players are stopped at once; those
//! with players get a warning every five minutes and are stopped once five
//! minutes remain.

use crate::app::AppShared;
use crate::error::{Result, WardenError};
use crate::keys;
use crate::orchestrator::Orchestrator;
use crate::service::ServiceHandle;

/// Minutes left at which occupied instances are stopped regardless.
const FORCE_STOP_MINUTES: u32 = 5;

/// Warning cadence in minutes.
const WARNING_EVERY: u32 = 5;

/// Action performed after the warning window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayedAction {
    /// Stop.
    Stop,
    /// Stop, then start what was running.
    Restart,
    /// Stop, update, then start what was running.
    Update,
}

impl DelayedAction {
    /// Lowercase verb.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Update => "update",
        }
    }

    /// App option holding the warning template.
    #[must_use]
    pub fn option_key(&self) -> String {
        format!("{}_delayed", self.as_str())
    }

    /// Warning template used when the option is empty.
    #[must_use]
    pub fn default_message(&self) -> String {
        format!(
            "Server will {} in {{time}} minutes. Please prepare to log off safely.",
            self.as_str()
        )
    }

    fn template(&self, app: Option<&AppShared>) -> String {
        let fallback = self.default_message();
        app.map_or(fallback.clone(), |app| app.text_or(&self.option_key(), &fallback))
    }
}

fn is_warning_minute(minutes_left: u32) -> bool {
    minutes_left % WARNING_EVERY == 0 && minutes_left > FORCE_STOP_MINUTES
}

/// Runs `action` across every instance of the orchestrator.
pub async fn delayed_fleet(orchestrator: &Orchestrator, action: DelayedAction) -> Result<()> {
    let ctx = orchestrator.context();
    ctx.require_privileged(action.as_str())?;
    let timings = ctx.timings();
    let template = action.template(Some(orchestrator.shared()));
    tracing::info!(
        action = action.as_str(),
        "issuing delayed action for all instances, players have up to an hour to log off"
    );

    let mut previously_running: Vec<&ServiceHandle> = Vec::new();
    let mut tick = 0;
    loop {
        let minutes_left = timings.delayed_ticks.saturating_sub(tick);
        let message = template.replace(keys::TIME_PLACEHOLDER, &minutes_left.to_string());
        let mut still_running = false;

        for service in orchestrator.services() {
            if !service.is_running().await {
                continue;
            }
            still_running = true;
            if !previously_running.iter().any(|s| s.unit() == service.unit()) {
                previously_running.push(service);
            }
            match service.player_count().await {
                None | Some(0) => {
                    tracing::info!(unit = %service.unit(), "no players connected, stopping now");
                    service.stop().await?;
                }
                Some(_) if minutes_left <= FORCE_STOP_MINUTES => service.stop().await?,
                Some(_) if is_warning_minute(minutes_left) => service.send_message(&message).await?,
                Some(_) => {}
            }
        }

        if is_warning_minute(minutes_left) {
            tracing::info!(minutes_left, action = action.as_str(), "minutes remaining");
        }
        if !still_running || minutes_left == 0 {
            break;
        }
        tokio::time::sleep(timings.delayed_tick).await;
        tick += 1;
    }

    match action {
        DelayedAction::Stop => Ok(()),
        DelayedAction::Restart => orchestrator.start_all(previously_running).await,
        DelayedAction::Update => {
            orchestrator.wait_for_drain().await?;
            orchestrator.update().await?;
            orchestrator.start_all(previously_running).await
        }
    }
}

/// Runs `action` against a single instance.
///
/// The loop ends as soon as the instance has no players, then defers to a
/// plain stop or restart.
pub async fn delayed_single(service: &ServiceHandle, action: DelayedAction) -> Result<()> {
    if action == DelayedAction::Update {
        return Err(WardenError::conflict(
            "delayed update can only be used when managing all instances",
        ));
    }
    let ctx = service.context();
    ctx.require_privileged(action.as_str())?;
    let timings = ctx.timings();
    let template = action.template(service.app().as_deref());
    tracing::info!(
        unit = %service.unit(),
        action = action.as_str(),
        "issuing delayed action, players have up to an hour to log off"
    );

    let mut tick = 0;
    loop {
        let minutes_left = timings.delayed_ticks.saturating_sub(tick);
        match service.player_count().await {
            None | Some(0) => break,
            Some(_) => {}
        }
        if minutes_left <= FORCE_STOP_MINUTES {
            break;
        }
        if minutes_left % WARNING_EVERY == 0 {
            let message = template.replace(keys::TIME_PLACEHOLDER, &minutes_left.to_string());
            service.send_message(&message).await?;
            tracing::info!(unit = %service.unit(), minutes_left, "minutes remaining");
        }
        tokio::time::sleep(timings.delayed_tick).await;
        tick += 1;
    }

    match action {
        DelayedAction::Restart => service.restart().await.map(|_| ()),
        DelayedAction::Stop | DelayedAction::Update => service.stop().await,
    }
}
