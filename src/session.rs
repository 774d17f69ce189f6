//! Session orchestration: inserting and ejecting tapes

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{error, info};

use crate::config::Config;
use crate::hosts::HostFilter;
use crate::loader::{FileTapeLoader, TapeLoader};
use crate::mode::TapeMode;
use crate::naming::{current_test_tape_name, validate_tape_name};
use crate::rule::ComposedMatchRule;
use crate::tape::TapeHandle;
use crate::{Result, TapedeckError};

/// Per-insertion overrides of the session defaults
#[derive(Debug, Clone, Default)]
pub struct InsertOptions {
    mode: Option<TapeMode>,
    match_rules: Option<ComposedMatchRule>,
}

impl InsertOptions {
    /// Use `mode` instead of the session default
    #[must_use]
    pub fn mode(mut self, mode: TapeMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Use `match_rules` instead of the session default
    #[must_use]
    pub fn match_rules(mut self, match_rules: ComposedMatchRule) -> Self {
        self.match_rules = Some(match_rules);
        self
    }
}

/// Holds at most one inserted tape plus the defaults applied to it
///
/// A session is an owned value: concurrent tests each create their own.
pub struct Session {
    default_mode: TapeMode,
    default_match_rules: ComposedMatchRule,
    host_filter: HostFilter,
    loader: Arc<dyn TapeLoader>,
    active: Option<TapeHandle>,
}

impl Session {
    /// Create a session storing tapes under `config.tape_root`
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub fn new(config: &Config) -> Result<Self> {
        let loader = FileTapeLoader::new(config.tape_root.clone());
        Self::with_loader(config, Arc::new(loader))
    }

    /// Create a session from discovered configuration
    ///
    /// # Errors
    ///
    /// Returns error if the discovered configuration is invalid
    pub fn discover() -> Result<Self> {
        Self::new(&Config::discover()?)
    }

    /// Create a session over an arbitrary tape loader
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub fn with_loader(config: &Config, loader: Arc<dyn TapeLoader>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            default_mode: config.default_mode,
            default_match_rules: config.match_rules()?,
            host_filter: config.host_filter(),
            loader,
            active: None,
        })
    }

    /// Mode applied when insert does not name one
    #[must_use]
    pub fn default_mode(&self) -> TapeMode {
        self.default_mode
    }

    /// Match rules applied when insert does not name any
    #[must_use]
    pub fn default_match_rules(&self) -> &ComposedMatchRule {
        &self.default_match_rules
    }

    /// Host exemption filter
    #[must_use]
    pub fn host_filter(&self) -> &HostFilter {
        &self.host_filter
    }

    /// Currently inserted tape, if any
    #[must_use]
    pub fn active_tape(&self) -> Option<TapeHandle> {
        self.active.clone()
    }

    /// Load the tape called `name` and make it the active tape
    ///
    /// # Errors
    ///
    /// Returns `State` if a tape is already inserted, or the loader's error
    pub fn insert(&mut self, name: &str, options: InsertOptions) -> Result<TapeHandle> {
        if let Some(active) = &self.active {
            return Err(TapedeckError::State(format!(
                "Cannot insert '{name}': tape '{}' is still inserted",
                active.name()
            )));
        }

        validate_tape_name(name)?;

        let mode = options.mode.unwrap_or(self.default_mode);
        let match_rules = options
            .match_rules
            .unwrap_or_else(|| self.default_match_rules.clone());

        let mut tape = self.loader.load(name)?;
        tape.set_mode(mode);
        tape.set_match_rules(match_rules);

        info!(
            "Inserted tape '{}' ({}, match {}, {} interactions)",
            name,
            mode,
            tape.match_rules(),
            tape.len()
        );

        let handle = TapeHandle::new(tape);
        self.active = Some(handle.clone());
        Ok(handle)
    }

    /// Insert a tape named after the running test
    ///
    /// # Errors
    ///
    /// Returns `InvalidTapeName` on an unnamed thread, otherwise as [`Session::insert`]
    pub fn insert_for_current_test(&mut self, options: InsertOptions) -> Result<TapeHandle> {
        let name = current_test_tape_name().ok_or_else(|| {
            TapedeckError::InvalidTapeName("Current thread has no test name".to_string())
        })?;
        self.insert(&name, options)
    }

    /// Persist the active tape and clear it
    ///
    /// Waits for any in-flight holder of the tape lock. If the write fails the
    /// tape stays inserted so its interactions are not lost.
    ///
    /// # Errors
    ///
    /// Returns `State` if no tape is inserted, or the loader's write error
    pub async fn eject(&mut self) -> Result<()> {
        let Some(handle) = self.active.as_ref() else {
            return Err(TapedeckError::State(
                "Cannot eject: no tape is inserted".to_string(),
            ));
        };

        {
            let tape = handle.lock().await;
            self.loader.write(&tape)?;
            info!(
                "Ejected tape '{}' ({} interactions)",
                tape.name(),
                tape.len()
            );
        }

        self.active = None;
        Ok(())
    }

    /// Alias for [`Session::insert`]
    ///
    /// # Errors
    ///
    /// As [`Session::insert`]
    pub fn start(&mut self, name: &str, options: InsertOptions) -> Result<TapeHandle> {
        self.insert(name, options)
    }

    /// Alias for [`Session::eject`]
    ///
    /// # Errors
    ///
    /// As [`Session::eject`]
    pub async fn stop(&mut self) -> Result<()> {
        self.eject().await
    }

    /// Run `body` with a tape inserted, ejecting it on every exit path
    ///
    /// A panic in `body` is resumed after the eject. When `body` fails and the
    /// eject fails too, the body's error is returned and the eject error logged.
    ///
    /// # Errors
    ///
    /// Returns the insert error, the body's error, or the eject error
    pub async fn with_tape<F, Fut, T>(
        &mut self,
        name: &str,
        options: InsertOptions,
        body: F,
    ) -> Result<T>
    where
        F: FnOnce(TapeHandle) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let handle = self.insert(name, options)?;
        let outcome = AssertUnwindSafe(body(handle)).catch_unwind().await;
        let ejected = self.eject().await;

        match outcome {
            Err(panic) => {
                if let Err(e) = ejected {
                    error!("Failed to eject tape '{name}' after panic: {e}");
                }
                std::panic::resume_unwind(panic)
            }
            Ok(Err(body_error)) => {
                if let Err(e) = ejected {
                    error!("Failed to eject tape '{name}' after error: {e}");
                }
                Err(body_error)
            }
            Ok(Ok(value)) => ejected.map(|()| value),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("default_mode", &self.default_mode)
            .field("default_match_rules", &self.default_match_rules)
            .field("host_filter", &self.host_filter)
            .field("active", &self.active.as_ref().map(TapeHandle::name))
            .finish_non_exhaustive()
    }
}
