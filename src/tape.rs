//! Tapes: named, ordered collections of recorded interactions

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::fingerprint::{fingerprint_request, short_hex};
use crate::interaction::Interaction;
use crate::message::{Request, Response};
use crate::mode::TapeMode;
use crate::rule::ComposedMatchRule;
use crate::{Result, TapedeckError};

/// A named tape with its active mode and match rules
#[derive(Debug, Clone)]
pub struct Tape {
    name: String,
    mode: TapeMode,
    match_rules: ComposedMatchRule,
    interactions: Vec<Interaction>,
    dirty: bool,
}

impl Tape {
    /// Create an empty tape in the default mode with default match rules
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_interactions(name, Vec::new())
    }

    /// Create a tape holding previously persisted interactions
    pub fn with_interactions(name: impl Into<String>, interactions: Vec<Interaction>) -> Self {
        Self {
            name: name.into(),
            mode: TapeMode::default(),
            match_rules: ComposedMatchRule::default(),
            interactions,
            dirty: false,
        }
    }

    /// Tape name, also its persistence key
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Active mode
    #[must_use]
    pub fn mode(&self) -> TapeMode {
        self.mode
    }

    /// Set the mode for this insertion
    pub fn set_mode(&mut self, mode: TapeMode) {
        self.mode = mode;
    }

    /// Active match rules
    #[must_use]
    pub fn match_rules(&self) -> &ComposedMatchRule {
        &self.match_rules
    }

    /// Set the match rules for this insertion
    pub fn set_match_rules(&mut self, match_rules: ComposedMatchRule) {
        self.match_rules = match_rules;
    }

    /// Recorded interactions in recording order
    #[must_use]
    pub fn interactions(&self) -> &[Interaction] {
        &self.interactions
    }

    /// Number of recorded interactions
    #[must_use]
    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    /// Whether nothing has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    /// Whether interactions were recorded since the tape was loaded
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether the current mode allows playback
    #[must_use]
    pub fn is_readable(&self) -> bool {
        self.mode.is_readable()
    }

    /// Whether the current mode allows recording
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.mode.is_writable()
    }

    /// Earliest interaction matching `request` under the match rules, ignoring mode
    #[must_use]
    pub fn find(&self, request: &Request) -> Option<(usize, &Interaction)> {
        self.interactions
            .iter()
            .enumerate()
            .find(|(position, interaction)| {
                match self.match_rules.first_mismatch(interaction.request(), request) {
                    None => true,
                    Some(rule) => {
                        debug!(
                            "Tape '{}' #{}: {} {} rejected on {}",
                            self.name,
                            position,
                            interaction.request().method,
                            interaction.request().uri,
                            rule
                        );
                        false
                    }
                }
            })
    }

    /// Look up the recorded interaction to replay for `request`
    ///
    /// Interactions are never consumed, so the same one can be replayed for
    /// repeated identical requests. A write-only tape never replays.
    ///
    /// # Errors
    ///
    /// Returns `NoMatchFound` when a read-only tape has no match
    pub fn seek(&self, request: &Request) -> Result<Option<&Interaction>> {
        if !self.is_readable() {
            return Ok(None);
        }

        if let Some((position, interaction)) = self.find(request) {
            debug!(
                "Tape '{}' hit #{} for {} {}",
                self.name, position, request.method, request.uri
            );
            return Ok(Some(interaction));
        }

        if self.is_writable() {
            debug!(
                "Tape '{}' miss for {} {}",
                self.name, request.method, request.uri
            );
            return Ok(None);
        }

        warn!(
            "Tape '{}' has no match for {} {} (fingerprint: {})",
            self.name,
            request.method,
            request.uri,
            short_hex(&fingerprint_request(request))
        );
        Err(TapedeckError::NoMatchFound {
            tape: self.name.clone(),
            method: request.method.clone(),
            uri: request.uri.clone(),
            reason: if self.is_empty() {
                "tape is empty".to_string()
            } else {
                format!(
                    "none of {} interactions matched on {}",
                    self.len(),
                    self.match_rules
                )
            },
        })
    }

    /// Append a live interaction
    ///
    /// # Errors
    ///
    /// Returns `ModeViolation` if the mode does not allow recording
    pub fn record(&mut self, request: Request, response: Response) -> Result<&Interaction> {
        if !self.is_writable() {
            return Err(TapedeckError::ModeViolation {
                tape: self.name.clone(),
                mode: self.mode,
                operation: "record",
            });
        }

        self.interactions.push(Interaction::new(request, response));
        self.dirty = true;

        let index = self.interactions.len() - 1;
        let interaction = &self.interactions[index];
        debug!(
            "Recorded interaction: {} {} -> {} (tape: {}, count: {})",
            interaction.request().method,
            interaction.request().uri,
            interaction.response().status,
            self.name,
            self.interactions.len()
        );

        Ok(interaction)
    }
}

/// Shared handle to an inserted tape
///
/// Seek and record through one handle are serialized by its lock, so a
/// proxy multiplexing requests onto the tape cannot lose appends.
#[derive(Debug, Clone)]
pub struct TapeHandle {
    name: Arc<str>,
    tape: Arc<Mutex<Tape>>,
}

impl TapeHandle {
    /// Wrap a tape for shared access
    #[must_use]
    pub fn new(tape: Tape) -> Self {
        Self {
            name: Arc::from(tape.name()),
            tape: Arc::new(Mutex::new(tape)),
        }
    }

    /// Name of the wrapped tape
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Acquire exclusive access to the tape
    pub async fn lock(&self) -> MutexGuard<'_, Tape> {
        self.tape.lock().await
    }
}
