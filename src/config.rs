use crate::calc::{PASSING_MARK, SCALE};
use crate::store::{Collection, DocKey, DocumentStore, StoreError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MAX_DEBOUNCE_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Pass threshold on the 0–20 scale.
    pub passing_mark: f64,
    /// Quiet period before a mark/comment edit is written.
    pub debounce_ms: u64,
    /// Write pending edits before the session is torn down.
    pub flush_on_close: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            passing_mark: PASSING_MARK,
            debounce_ms: 600,
            flush_on_close: true,
        }
    }
}

/// Partial update accepted by `config.update`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    pub passing_mark: Option<f64>,
    pub debounce_ms: Option<u64>,
    pub flush_on_close: Option<bool>,
}

impl EngineConfig {
    pub fn doc_key() -> DocKey {
        DocKey::new(Collection::Settings, "engine")
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Stored settings merged over defaults. An unreadable document falls
    /// back to defaults.
    pub fn load<S: DocumentStore>(store: &S) -> Result<Self, StoreError> {
        let Some(raw) = store.get(&Self::doc_key())? else {
            return Ok(Self::default());
        };
        match serde_json::from_value::<EngineConfig>(raw) {
            Ok(cfg) if cfg.validate().is_ok() => Ok(cfg),
            Ok(_) | Err(_) => {
                tracing::warn!("ignoring invalid engine settings; using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.passing_mark.is_finite() || !(0.0..=SCALE).contains(&self.passing_mark) {
            return Err(format!("passingMark must be within [0, {}]", SCALE));
        }
        if self.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(format!("debounceMs must be <= {}", MAX_DEBOUNCE_MS));
        }
        Ok(())
    }

    pub fn apply(&self, patch: &ConfigPatch) -> Result<Self, String> {
        let mut next = self.clone();
        if let Some(v) = patch.passing_mark {
            next.passing_mark = v;
        }
        if let Some(v) = patch.debounce_ms {
            next.debounce_ms = v;
        }
        if let Some(v) = patch.flush_on_close {
            next.flush_on_close = v;
        }
        next.validate()?;
        Ok(next)
    }
}
