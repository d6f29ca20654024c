//! API key handling and the premium-tier credential gate.

use crate::error::Result;
use crate::image::{GenerationSettings, QualityTier};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};

/// Environment variables consulted for the API key, in order.
pub const API_KEY_ENV_VARS: [&str; 2] = ["GOOGLE_API_KEY", "API_KEY"];

/// Shared holder of the active API key.
///
/// The generation client reads it at call time and a [`CredentialSelector`]
/// may replace it, so clones all observe the same key.
#[derive(Debug, Clone, Default)]
pub struct CredentialSlot {
    key: Arc<RwLock<Option<String>>>,
}

impl CredentialSlot {
    /// Creates an empty slot.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a slot holding `key`.
    pub fn with_key(key: impl Into<String>) -> Self {
        let slot = Self::default();
        slot.set(key);
        slot
    }

    /// Creates a slot seeded from the first non-empty variable in [`API_KEY_ENV_VARS`].
    pub fn from_env() -> Self {
        API_KEY_ENV_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
            .map(Self::with_key)
            .unwrap_or_default()
    }

    /// Returns the active key, if any.
    pub fn get(&self) -> Option<String> {
        self.key
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replaces the active key. Blank keys clear the slot.
    pub fn set(&self, key: impl Into<String>) {
        let key = key.into();
        let mut guard = self
            .key
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = if key.trim().is_empty() {
            None
        } else {
            Some(key.trim().to_string())
        };
    }

    /// Returns true when a key is present.
    pub fn is_set(&self) -> bool {
        self.get().is_some()
    }
}

/// External credential selection flow.
#[async_trait]
pub trait CredentialSelector: Send + Sync {
    /// Reports whether a usable credential is already selected.
    async fn has_active_credential(&self) -> Result<bool>;

    /// Runs the interactive picker. Completes when the user finishes or cancels.
    async fn request_credential_selection(&self) -> Result<()>;
}

/// Selector backed only by a [`CredentialSlot`], with no interactive picker.
///
/// Selection is a no-op, so activation succeeds only if a key is already set.
#[derive(Debug, Clone, Default)]
pub struct SlotSelector {
    slot: CredentialSlot,
}

impl SlotSelector {
    /// Wraps `slot`.
    pub fn new(slot: CredentialSlot) -> Self {
        Self { slot }
    }
}

#[async_trait]
impl CredentialSelector for SlotSelector {
    async fn has_active_credential(&self) -> Result<bool> {
        Ok(self.slot.is_set())
    }

    async fn request_credential_selection(&self) -> Result<()> {
        tracing::debug!("no interactive credential picker available");
        Ok(())
    }
}

/// How the gate treats a completed picker flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivationPolicy {
    /// Re-check the credential after the picker; a negative answer aborts.
    #[default]
    Verified,
    /// Treat completion of the picker as success.
    Optimistic,
}

/// Outcome of a premium toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PremiumToggle {
    /// The tier is now premium.
    Enabled,
    /// The tier is now standard.
    Disabled,
    /// The picker finished without an active credential.
    Declined,
    /// The credential flow failed. The previous tier was kept.
    Failed,
}

/// Guards activation of the premium tier.
#[derive(Debug, Clone)]
pub struct CredentialGate<S> {
    selector: S,
    policy: ActivationPolicy,
}

impl<S: CredentialSelector> CredentialGate<S> {
    /// Creates a gate with the [`ActivationPolicy::Verified`] policy.
    pub fn new(selector: S) -> Self {
        Self {
            selector,
            policy: ActivationPolicy::default(),
        }
    }

    /// Sets the activation policy.
    pub fn with_policy(mut self, policy: ActivationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the wrapped selector.
    pub fn selector(&self) -> &S {
        &self.selector
    }

    /// Switches `settings` to premium once a credential is confirmed.
    ///
    /// Errors from the selector are logged and leave `settings` untouched.
    pub async fn enable_premium(&self, settings: &mut GenerationSettings) -> PremiumToggle {
        match self.try_enable().await {
            Ok(true) => {
                settings.quality_tier = QualityTier::Premium;
                PremiumToggle::Enabled
            }
            Ok(false) => {
                tracing::info!("credential selection finished without an active key");
                PremiumToggle::Declined
            }
            Err(e) => {
                tracing::warn!(error = %e, "key selection failed");
                PremiumToggle::Failed
            }
        }
    }

    /// Switches `settings` back to the standard tier.
    pub fn disable_premium(&self, settings: &mut GenerationSettings) -> PremiumToggle {
        settings.quality_tier = QualityTier::Standard;
        PremiumToggle::Disabled
    }

    /// Runs the picker without touching any settings.
    ///
    /// Used after a premium request was rejected. Errors are logged.
    pub async fn reselect(&self) {
        if let Err(e) = self.selector.request_credential_selection().await {
            tracing::warn!(error = %e, "key selection failed");
        }
    }

    async fn try_enable(&self) -> Result<bool> {
        if self.selector.has_active_credential().await? {
            return Ok(true);
        }

        self.selector.request_credential_selection().await?;

        match self.policy {
            ActivationPolicy::Optimistic => Ok(true),
            ActivationPolicy::Verified => self.selector.has_active_credential().await,
        }
    }
}
