//! Engine configuration
//!
//! Loaded from TOML, falls back to defaults if no config file exists.
//! A document holds the config behind an `Arc` and never mutates it.

use crate::error::{Error, Result};
use crate::types::TextRange;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Input handed to the label function during post-processing.
#[derive(Debug, Clone, Copy)]
pub struct LabelContext<'a> {
    pub neuron_label: &'a str,
    pub range: Option<TextRange>,
    /// Covered document text, if the range lies inside the text.
    pub text: Option<&'a str>,
}

pub type LabelFn = Arc<dyn Fn(&LabelContext<'_>) -> String + Send + Sync>;

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scale applied to gradients before they become weight updates.
    pub learn_rate: f64,
    /// Weight decay applied when committing updates. `None` disables decay.
    pub alpha: Option<f64>,
    /// When false, `update_model` commits nothing.
    pub training_enabled: bool,
    /// Deltas at or below this magnitude are not propagated.
    pub tolerance: f64,
    /// Interpretation search guard.
    pub max_search_steps: usize,
    /// Maximum relaxation rounds for recurrent synapses.
    pub max_rounds: u32,
    /// Maximum positional span of an option conjunction.
    pub max_rid: i64,
    #[serde(skip)]
    pub label_fn: Option<LabelFn>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            learn_rate: 0.01,
            alpha: None,
            training_enabled: false,
            tolerance: 1e-6,
            max_search_steps: 10_000,
            max_rounds: 20,
            max_rid: 20,
            label_fn: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("learn_rate", &self.learn_rate)
            .field("alpha", &self.alpha)
            .field("training_enabled", &self.training_enabled)
            .field("tolerance", &self.tolerance)
            .field("max_search_steps", &self.max_search_steps)
            .field("max_rounds", &self.max_rounds)
            .field("max_rid", &self.max_rid)
            .field("label_fn", &self.label_fn.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

// ============================================================
// Loading
// ============================================================

impl Config {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {} - using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {} - using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance > 0.0) {
            return Err(Error::Config("tolerance must be > 0".into()));
        }
        if !(self.learn_rate > 0.0 && self.learn_rate <= 1.0) {
            return Err(Error::Config("learn_rate must be in (0, 1]".into()));
        }
        if let Some(alpha) = self.alpha {
            if !(0.0..1.0).contains(&alpha) {
                return Err(Error::Config("alpha must be in [0, 1)".into()));
            }
        }
        if self.max_search_steps == 0 {
            return Err(Error::Config("max_search_steps must be > 0".into()));
        }
        if self.max_rid < 0 {
            return Err(Error::Config("max_rid must be >= 0".into()));
        }
        Ok(())
    }

    pub fn with_label_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&LabelContext<'_>) -> String + Send + Sync + 'static,
    {
        self.label_fn = Some(Arc::new(f));
        self
    }

    pub fn with_training(mut self, enabled: bool) -> Self {
        self.training_enabled = enabled;
        self
    }

    /// Render an activation label with the configured function or the default
    /// `neuron[begin..end]` form.
    pub fn label(&self, ctx: &LabelContext<'_>) -> String {
        match &self.label_fn {
            Some(f) => f(ctx),
            None => match ctx.range {
                Some(range) => format!("{}{}", ctx.neuron_label, range),
                None => ctx.neuron_label.to_string(),
            },
        }
    }
}
