//! Submission state machine and the async driver that runs it.
//!
//! [`Session`] holds everything a front-end renders: settings, gallery,
//! prompt buffer, phase and the last error. It changes only through
//! [`Session::update`], which never performs I/O. Work that needs the
//! outside world is returned as an [`Effect`] for [`Studio`] (or any other
//! driver) to carry out.

use crate::credential::{CredentialGate, CredentialSelector, PremiumToggle};
use crate::error::{DreamGenError, ErrorKind};
use crate::gallery::{Gallery, GalleryEntry};
use crate::image::{
    AspectRatio, GeneratedImage, GenerationRequest, GenerationSettings, ImageProvider,
    QualityTier, ResolutionTier,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Message shown when a premium request is rejected for lack of entitlement.
pub const PRO_KEY_REQUIRED_MESSAGE: &str = "PRO mode requires a paid API key. Please select one.";

/// Fallback message for errors that render as an empty string.
pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred during generation.";

/// Whether a generation is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Ready for a submission.
    #[default]
    Idle,
    /// Waiting on the remote service.
    Generating,
}

/// Inputs to the state machine.
#[derive(Debug)]
pub enum Event {
    /// The prompt field changed.
    PromptEdited(String),
    /// An aspect ratio was picked.
    AspectRatioSelected(AspectRatio),
    /// A resolution was picked.
    ResolutionSelected(ResolutionTier),
    /// The credential gate confirmed premium access.
    PremiumActivated,
    /// The user switched back to the standard tier.
    PremiumDeactivated,
    /// The user submitted the current prompt.
    Submit,
    /// The pending generation succeeded.
    Completed {
        /// Identifier for the new gallery entry.
        id: Uuid,
        /// Timestamp for the new gallery entry.
        created_at: DateTime<Utc>,
        /// Image returned by the provider.
        image: GeneratedImage,
    },
    /// The pending generation failed.
    Failed(DreamGenError),
}

/// Work requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Nothing to do.
    None,
    /// Call the generation client once with this request.
    Generate(GenerationRequest),
    /// Re-run the external credential picker.
    RequestCredentialSelection,
}

/// Session state. Lives from start-up until the front-end exits.
#[derive(Debug, Clone, Default)]
pub struct Session {
    settings: GenerationSettings,
    gallery: Gallery,
    prompt: String,
    phase: Phase,
    pending: Option<GenerationRequest>,
    error: Option<String>,
}

impl Session {
    /// Creates a session with default settings and an empty gallery.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a session with the given initial settings.
    pub fn with_settings(settings: GenerationSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Current settings.
    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Generated images, newest first.
    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    /// Contents of the prompt field.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns true while a generation is in flight.
    pub fn is_generating(&self) -> bool {
        self.phase == Phase::Generating
    }

    /// Returns true when the prompt can be submitted.
    pub fn can_submit(&self) -> bool {
        self.phase == Phase::Idle && !self.prompt.trim().is_empty()
    }

    /// Message from the last failed generation.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Applies `event` and returns the work it requires.
    pub fn update(&mut self, event: Event) -> Effect {
        match event {
            Event::PromptEdited(prompt) => {
                self.prompt = prompt;
                Effect::None
            }
            Event::AspectRatioSelected(ratio) => {
                self.settings.aspect_ratio = ratio;
                Effect::None
            }
            Event::ResolutionSelected(tier) => {
                self.settings.resolution_tier = tier;
                Effect::None
            }
            Event::PremiumActivated => {
                self.settings.quality_tier = QualityTier::Premium;
                Effect::None
            }
            Event::PremiumDeactivated => {
                self.settings.quality_tier = QualityTier::Standard;
                Effect::None
            }
            Event::Submit => self.submit(),
            Event::Completed {
                id,
                created_at,
                image,
            } => {
                let Some(request) = self.finish() else {
                    tracing::warn!("completion received with no generation pending");
                    return Effect::None;
                };
                self.gallery.push_front(GalleryEntry::new(
                    id,
                    created_at,
                    request.prompt,
                    request.settings,
                    &image,
                ));
                self.prompt.clear();
                Effect::None
            }
            Event::Failed(err) => {
                if self.finish().is_none() {
                    tracing::warn!(error = %err, "failure received with no generation pending");
                    return Effect::None;
                }
                if err.is_pro_key_required() {
                    self.error = Some(PRO_KEY_REQUIRED_MESSAGE.to_string());
                    self.settings.quality_tier = QualityTier::Standard;
                    return Effect::RequestCredentialSelection;
                }
                let message = err.to_string();
                self.error = Some(if message.is_empty() {
                    GENERIC_ERROR_MESSAGE.to_string()
                } else {
                    message
                });
                Effect::None
            }
        }
    }

    fn submit(&mut self) -> Effect {
        if self.phase == Phase::Generating {
            tracing::debug!("submission ignored, generation already in flight");
            return Effect::None;
        }
        if self.prompt.trim().is_empty() {
            return Effect::None;
        }

        let request = GenerationRequest::new(self.prompt.clone()).with_settings(self.settings);
        self.phase = Phase::Generating;
        self.error = None;
        self.pending = Some(request.clone());
        Effect::Generate(request)
    }

    fn finish(&mut self) -> Option<GenerationRequest> {
        if self.phase != Phase::Generating {
            return None;
        }
        self.phase = Phase::Idle;
        self.pending.take()
    }
}

/// Result of [`Studio::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Nothing was sent: blank prompt or a generation already running.
    Skipped,
    /// A new gallery entry with this id was added.
    Generated(Uuid),
    /// The call failed; the message is in [`Session::error`].
    Failed(ErrorKind),
}

/// Drives a [`Session`] against a provider and a credential gate.
pub struct Studio<P, S> {
    session: Session,
    provider: P,
    gate: CredentialGate<S>,
}

impl<P, S> Studio<P, S>
where
    P: ImageProvider,
    S: CredentialSelector,
{
    /// Creates a studio with a fresh session.
    pub fn new(provider: P, gate: CredentialGate<S>) -> Self {
        Self::with_session(Session::new(), provider, gate)
    }

    /// Creates a studio around an existing session.
    pub fn with_session(session: Session, provider: P, gate: CredentialGate<S>) -> Self {
        Self {
            session,
            provider,
            gate,
        }
    }

    /// Current session state.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The generation backend.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The credential gate.
    pub fn gate(&self) -> &CredentialGate<S> {
        &self.gate
    }

    /// Replaces the prompt field.
    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.session.update(Event::PromptEdited(prompt.into()));
    }

    /// Picks an aspect ratio.
    pub fn select_aspect_ratio(&mut self, ratio: AspectRatio) {
        self.session.update(Event::AspectRatioSelected(ratio));
    }

    /// Picks a resolution tier.
    pub fn select_resolution(&mut self, tier: ResolutionTier) {
        self.session.update(Event::ResolutionSelected(tier));
    }

    /// Flips the quality tier, going through the credential gate when enabling.
    pub async fn toggle_premium(&mut self) -> PremiumToggle {
        if self.session.settings().quality_tier.is_premium() {
            return self.set_premium(false).await;
        }
        self.set_premium(true).await
    }

    /// Enables or disables the premium tier.
    pub async fn set_premium(&mut self, enabled: bool) -> PremiumToggle {
        let mut settings = *self.session.settings();
        let outcome = if enabled {
            self.gate.enable_premium(&mut settings).await
        } else {
            self.gate.disable_premium(&mut settings)
        };

        let event = if settings.quality_tier.is_premium() {
            Event::PremiumActivated
        } else {
            Event::PremiumDeactivated
        };
        self.session.update(event);
        outcome
    }

    /// Submits the current prompt and waits for the result.
    pub async fn submit(&mut self) -> Submission {
        let Effect::Generate(request) = self.session.update(Event::Submit) else {
            return Submission::Skipped;
        };

        let (event, submission) = match self.provider.generate(&request).await {
            Ok(image) => {
                let id = Uuid::new_v4();
                let event = Event::Completed {
                    id,
                    created_at: Utc::now(),
                    image,
                };
                (event, Submission::Generated(id))
            }
            Err(err) => {
                let kind = err.kind();
                (Event::Failed(err), Submission::Failed(kind))
            }
        };

        if self.session.update(event) == Effect::RequestCredentialSelection {
            self.gate.reselect().await;
        }
        submission
    }

    /// Submits `prompt` after placing it in the prompt field.
    pub async fn generate(&mut self, prompt: impl Into<String>) -> Submission {
        self.set_prompt(prompt);
        self.submit().await
    }
}
