use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallOutcome {
    Accepted,
    Dismissed,
}

/// What the user chose when shown the install prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallChoice {
    pub outcome: InstallOutcome,
    pub platform: String,
}

/// An install prompt the host deferred so it can be shown later
#[async_trait]
pub trait DeferredInstallPrompt: Send + Sync {
    /// Show the prompt and wait for the user's choice
    async fn prompt(&self) -> InstallChoice;
}

#[derive(Default)]
struct InstallState {
    installed: bool,
    captured: Option<Arc<dyn DeferredInstallPrompt>>,
}

/// Tracks whether the app is installed and holds the captured install prompt
#[derive(Default)]
pub struct InstallController {
    state: Mutex<InstallState>,
}

impl InstallController {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InstallState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Keep the deferred prompt; a later capture replaces an earlier one
    pub fn capture_prompt(&self, prompt: Arc<dyn DeferredInstallPrompt>) {
        self.state().captured = Some(prompt);
        debug!("Install prompt captured");
    }

    /// The host reported that the app was installed
    pub fn mark_installed(&self) {
        self.state().installed = true;
        info!("App installed");
    }

    /// Display-mode detection result
    pub fn set_standalone(&self, standalone: bool) {
        self.state().installed = standalone;
    }

    pub fn is_installed(&self) -> bool {
        self.state().installed
    }

    pub fn can_install(&self) -> bool {
        self.state().captured.is_some()
    }

    /// Show the captured prompt. `None` when nothing was captured.
    ///
    /// The capture is consumed either way; browsers only allow a deferred
    /// prompt to be shown once.
    pub async fn prompt_install(&self) -> Option<InstallChoice> {
        let prompt = self.state().captured.take()?;
        let choice = prompt.prompt().await;
        info!("Install prompt answered: {:?} on {}", choice.outcome, choice.platform);
        Some(choice)
    }
}
