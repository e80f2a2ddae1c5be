//! Well-known app-level option names and their built-in descriptors.

use std::time::Duration;

use warden_config::{OptionDescriptor, OptionKind};

/// Gate for chat notifications.
pub const NOTIFY_ENABLED: &str = "Discord Enabled";
/// Webhook target for chat notifiers.
///
/// Warden itself only logs notices ([`LogNotifier`](crate::LogNotifier));
/// the value is read by the [`Notifier`](crate::Notifier) an embedder
/// installs through [`AppShared::webhook`](crate::AppShared::webhook).
pub const NOTIFY_WEBHOOK: &str = "Discord Webhook URL";
/// Notice sent once an instance answers its query interface.
pub const INSTANCE_STARTED: &str = "Instance Started (Discord)";
/// Notice sent when an instance begins stopping.
pub const INSTANCE_STOPPING: &str = "Instance Stopping (Discord)";
/// Release branch passed to the update helper.
pub const GAME_BRANCH: &str = "Game Branch";

/// Placeholder replaced by the instance name in notices.
pub const INSTANCE_PLACEHOLDER: &str = "{instance}";
/// Placeholder replaced by minutes left in delayed-action warnings.
pub const TIME_PLACEHOLDER: &str = "{time}";

/// Shutdown warnings: option, fallback text and wait after sending.
pub const SHUTDOWN_WARNINGS: [(&str, &str, Duration); 7] = [
    ("Shutdown Warning 5 Minutes", "Server is shutting down in 5 minutes", Duration::from_secs(60)),
    ("Shutdown Warning 4 Minutes", "Server is shutting down in 4 minutes", Duration::from_secs(60)),
    ("Shutdown Warning 3 Minutes", "Server is shutting down in 3 minutes", Duration::from_secs(60)),
    ("Shutdown Warning 2 Minutes", "Server is shutting down in 2 minutes", Duration::from_secs(60)),
    ("Shutdown Warning 1 Minute", "Server is shutting down in 1 minute", Duration::from_secs(30)),
    ("Shutdown Warning 30 Seconds", "Server is shutting down in 30 seconds!", Duration::from_secs(30)),
    ("Shutdown Warning NOW", "Server is shutting down NOW!", Duration::ZERO),
];

/// Descriptors every app store carries unless the definition file overrides them.
#[must_use]
pub fn builtin_options() -> Vec<OptionDescriptor> {
    let mut options = vec![
        OptionDescriptor::new(NOTIFY_ENABLED, "enabled", OptionKind::Bool)
            .in_section("Discord")
            .with_help("Send lifecycle notices to the chat webhook"),
        OptionDescriptor::new(NOTIFY_WEBHOOK, "webhook", OptionKind::Str)
            .in_section("Discord")
            .with_help("Webhook URL read by an installed chat notifier"),
        OptionDescriptor::new(INSTANCE_STARTED, "instance_started", OptionKind::Str)
            .in_section("Discord")
            .with_default("{instance} has started! :rocket:"),
        OptionDescriptor::new(INSTANCE_STOPPING, "instance_stopping", OptionKind::Str)
            .in_section("Discord")
            .with_default(":small_red_triangle_down: {instance} is shutting down"),
        OptionDescriptor::new(GAME_BRANCH, "game_branch", OptionKind::Str)
            .in_section("Manager")
            .with_default("release"),
    ];
    for (name, text, _) in SHUTDOWN_WARNINGS {
        let key = name.to_lowercase().replace(' ', "_");
        options.push(
            OptionDescriptor::new(name, key, OptionKind::Str)
                .in_section("Messages")
                .with_default(text),
        );
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names_are_unique() {
        let options = builtin_options();
        let mut names: Vec<&str> = options.iter().map(OptionDescriptor::name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), options.len());
    }

    #[test]
    fn test_warning_schedule_totals_five_minutes() {
        let total: Duration = SHUTDOWN_WARNINGS.iter().map(|(_, _, wait)| *wait).sum();
        assert_eq!(total, Duration::from_secs(300));
    }
}
