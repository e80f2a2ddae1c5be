//! Application-level state shared by the orchestrator and its services.

use std::sync::Arc;

use parking_lot::RwLock;
use warden_config::{ConfigStore, OptionChange, OptionInfo, OptionValue};

use crate::error::Result;
use crate::hook::{NoopHook, OptionHook};
use crate::keys;
use crate::notify::{LogNotifier, Notifier};

/// App config store plus the notifier and option hook.
///
/// Services hold a `Weak` reference to this, so a service never keeps the
/// application alive on its own.
pub struct AppShared {
    name: String,
    description: String,
    store: RwLock<ConfigStore>,
    notifier: Arc<dyn Notifier>,
    hook: Arc<dyn OptionHook>,
}

impl std::fmt::Debug for AppShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppShared")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl AppShared {
    /// Creates shared state with a logging notifier and no option hook.
    #[must_use]
    pub fn new(name: impl Into<String>, store: ConfigStore) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            store: RwLock::new(store),
            notifier: Arc::new(LogNotifier),
            hook: Arc::new(NoopHook),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Replaces the notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Replaces the option hook.
    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn OptionHook>) -> Self {
        self.hook = hook;
        self
    }

    /// Application name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Side-effect hook for option changes.
    #[must_use]
    pub fn hook(&self) -> Arc<dyn OptionHook> {
        Arc::clone(&self.hook)
    }

    /// Read access to the app store.
    pub fn store(&self) -> parking_lot::RwLockReadGuard<'_, ConfigStore> {
        self.store.read()
    }

    /// Typed app option, `Empty` if unknown.
    #[must_use]
    pub fn get_option(&self, name: &str) -> OptionValue {
        self.store.read().get(name)
    }

    /// Text of an app option; unknown options read as empty.
    #[must_use]
    pub fn text(&self, name: &str) -> String {
        let store = self.store.read();
        if store.contains(name) {
            store.get(name).as_text()
        } else {
            String::new()
        }
    }

    /// Text of an app option, or `fallback` if it is empty.
    #[must_use]
    pub fn text_or(&self, name: &str, fallback: &str) -> String {
        let text = self.text(name);
        if text.is_empty() { fallback.to_string() } else { text }
    }

    /// Persists `value` and runs the hook if it changed.
    ///
    /// Returns true if a change was written.
    pub async fn set_option(&self, name: &str, value: &str) -> Result<bool> {
        let change = self.store.write().set_str(name, value)?;
        apply_change(&self.hook, change).await
    }

    /// Writes the default of `name` if it has no stored value.
    pub fn ensure_set(&self, name: &str) -> Result<bool> {
        Ok(self.store.write().ensure_set(name)?.is_some())
    }

    /// Lists every app option.
    #[must_use]
    pub fn describe(&self) -> Vec<OptionInfo> {
        self.store.read().describe()
    }

    /// Webhook URL configured for chat notifiers, `None` when unset.
    pub fn webhook(&self) -> Option<String> {
        let store = self.store.read();
        if !store.contains(keys::NOTIFY_WEBHOOK) {
            return None;
        }
        Some(store.get(keys::NOTIFY_WEBHOOK).as_text()).filter(|url| !url.is_empty())
    }

    /// Sends `message` through the notifier if notifications are enabled.
    ///
    /// Delivery failures are logged and never fail the caller.
    pub async fn notify(&self, message: &str) {
        if message.is_empty() {
            return;
        }
        let enabled = {
            let store = self.store.read();
            store.contains(keys::NOTIFY_ENABLED) && store.get(keys::NOTIFY_ENABLED).as_bool()
        };
        if !enabled {
            tracing::debug!("notifications are disabled");
            return;
        }
        tracing::debug!(webhook = ?self.webhook(), "delivering notification");
        if let Err(e) = self.notifier.notify(message).await {
            tracing::warn!(error = %e, "could not deliver notification");
        }
    }

    /// Sends the notice stored in `option` with `{instance}` replaced.
    pub async fn notify_instance(&self, option: &str, instance: &str) {
        let template = self.text(option);
        if template.is_empty() {
            return;
        }
        let message = template.replace(keys::INSTANCE_PLACEHOLDER, instance);
        self.notify(&message).await;
    }
}

/// Runs `hook` for a persisted change.
pub(crate) async fn apply_change(hook: &Arc<dyn OptionHook>, change: Option<OptionChange>) -> Result<bool> {
    match change {
        Some(change) => {
            hook.option_changed(&change).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}
