//! Tolerant conversion of raw inference output into typed records.
//!
//! Inference responses are expected to be JSON but arrive fenced, wrapped in
//! prose, cut off at the output ceiling or sprinkled with control
//! characters. [`recover`] applies progressively more invasive fixes and
//! reports how far it had to go. It never panics and never returns an error:
//! failure is a [`Recovery::Failed`] value.

pub(crate) mod repair;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

/// A strict expected-record schema for one call type.
pub trait ResponseSchema: DeserializeOwned + Sized {
    /// Keys a flat fragment must carry to be considered a record.
    const FRAGMENT_KEYS: &'static [&'static str];

    /// Checks semantic constraints after a successful parse.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    /// Reassembles a partial value from extracted fragments.
    fn from_fragments(fragments: Vec<Value>) -> Option<Self>;
}

/// Which recovery step produced a complete value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStep {
    /// The raw text parsed as-is.
    Strict,
    /// Parsed after removing code fences.
    FenceStripped,
    /// Parsed after normalizing control characters.
    Normalized,
    /// Parsed after trimming an already bracketed value.
    Bracketed,
    /// Parsed after structural repair.
    Repaired,
}

/// Outcome of [`recover`].
#[derive(Debug, Clone, PartialEq)]
pub enum Recovery<T> {
    /// A whole, schema-valid value.
    Complete {
        /// The parsed value.
        value: T,
        /// Step that produced it.
        step: RecoveryStep,
    },
    /// A value reassembled from individual record fragments.
    Partial {
        /// The reassembled value.
        value: T,
        /// Number of fragments used.
        fragments: usize,
    },
    /// Nothing usable could be recovered.
    Failed {
        /// Last parse or validation error.
        reason: String,
    },
}

impl<T> Recovery<T> {
    /// Returns the recovered value, if any.
    pub fn value(self) -> Option<T> {
        match self {
            Self::Complete { value, .. } | Self::Partial { value, .. } => Some(value),
            Self::Failed { .. } => None,
        }
    }

    /// Returns true if nothing was recovered.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

fn attempt<T: ResponseSchema>(text: &str) -> Result<T, String> {
    let value: T = serde_json::from_str(text).map_err(|e| e.to_string())?;
    value.validate().map_err(|e| format!("schema validation failed: {e}"))?;
    Ok(value)
}

/// Parses `raw` into `T`, repairing it as far as needed.
pub fn recover<T: ResponseSchema>(raw: &str) -> Recovery<T> {
    let mut reason = match attempt::<T>(raw) {
        Ok(value) => {
            return Recovery::Complete {
                value,
                step: RecoveryStep::Strict,
            }
        }
        Err(e) => e,
    };

    let unfenced = repair::strip_fences(raw);
    if unfenced.as_ref() != raw {
        match attempt::<T>(&unfenced) {
            Ok(value) => {
                return Recovery::Complete {
                    value,
                    step: RecoveryStep::FenceStripped,
                }
            }
            Err(e) => reason = e,
        }
    }

    let normalized = repair::normalize(&unfenced);
    if normalized != unfenced.as_ref() {
        match attempt::<T>(&normalized) {
            Ok(value) => {
                return Recovery::Complete {
                    value,
                    step: RecoveryStep::Normalized,
                }
            }
            Err(e) => reason = e,
        }
    }

    let trimmed = normalized.trim();
    if repair::has_matching_outer_brackets(trimmed) {
        match attempt::<T>(trimmed) {
            Ok(value) => {
                return Recovery::Complete {
                    value,
                    step: RecoveryStep::Bracketed,
                }
            }
            Err(e) => reason = e,
        }
    } else {
        for candidate in repair::repair_candidates(trimmed) {
            match attempt::<T>(&candidate) {
                Ok(value) => {
                    debug!(
                        raw_len = raw.len(),
                        repaired_len = candidate.len(),
                        "Recovered structured output by repair"
                    );
                    return Recovery::Complete {
                        value,
                        step: RecoveryStep::Repaired,
                    };
                }
                Err(e) => reason = e,
            }
        }
    }

    let fragments = repair::extract_fragments(trimmed, T::FRAGMENT_KEYS);
    let count = fragments.len();
    if count > 0 {
        if let Some(value) = T::from_fragments(fragments) {
            if value.validate().is_ok() {
                debug!(fragments = count, "Recovered partial output from fragments");
                return Recovery::Partial {
                    value,
                    fragments: count,
                };
            }
        }
    }

    debug!(reason = %reason, raw_len = raw.len(), "Structured output recovery failed");
    Recovery::Failed { reason }
}
