//! Run diagnostics: NaN coverage and the sinks that receive it.
//!
//! Sinks are passed explicitly by the caller; nothing here is global.

use std::sync::Mutex;

use serde::Serialize;
use tracing::{info, warn};

/// NaN ratio above which `TracingSink` warns.
pub const DEFAULT_NAN_WARN_RATIO: f64 = 0.5;

/// How much of a variable is undefined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NanCoverage {
    pub variable: String,
    pub nan_cells: usize,
    pub total_cells: usize,
}

impl NanCoverage {
    pub fn of(variable: impl Into<String>, data: &[f32]) -> Self {
        Self {
            variable: variable.into(),
            nan_cells: data.iter().filter(|v| v.is_nan()).count(),
            total_cells: data.len(),
        }
    }

    /// Fraction of NaN cells; 0 for an empty field.
    pub fn ratio(&self) -> f64 {
        if self.total_cells == 0 {
            0.0
        } else {
            self.nan_cells as f64 / self.total_cells as f64
        }
    }
}

/// Something worth reporting about a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DiagnosticEvent {
    /// A pipeline stage finished for a source.
    Stage { stage: String, provider: String, detail: String },
    /// NaN coverage of one composite variable.
    Coverage(NanCoverageEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NanCoverageEvent {
    #[serde(flatten)]
    pub coverage: NanCoverage,
    pub ratio: f64,
}

impl DiagnosticEvent {
    pub fn stage(stage: impl Into<String>, provider: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            provider: provider.into(),
            detail: detail.into(),
        }
    }

    pub fn coverage(coverage: NanCoverage) -> Self {
        let ratio = coverage.ratio();
        Self::Coverage(NanCoverageEvent { coverage, ratio })
    }
}

/// Receiver of diagnostic events.
pub trait DiagnosticsSink {
    fn record(&self, event: DiagnosticEvent);
}

/// Emits events as structured `tracing` records.
#[derive(Debug, Clone)]
pub struct TracingSink {
    pub nan_warn_ratio: f64,
}

impl Default for TracingSink {
    fn default() -> Self {
        Self {
            nan_warn_ratio: DEFAULT_NAN_WARN_RATIO,
        }
    }
}

impl DiagnosticsSink for TracingSink {
    fn record(&self, event: DiagnosticEvent) {
        match event {
            DiagnosticEvent::Stage {
                stage,
                provider,
                detail,
            } => info!(%stage, %provider, %detail, "stage complete"),
            DiagnosticEvent::Coverage(NanCoverageEvent { coverage, ratio }) => {
                if ratio > self.nan_warn_ratio {
                    warn!(
                        variable = %coverage.variable,
                        nan_cells = coverage.nan_cells,
                        total_cells = coverage.total_cells,
                        nan_ratio = ratio,
                        "high NaN coverage"
                    );
                } else {
                    info!(
                        variable = %coverage.variable,
                        nan_cells = coverage.nan_cells,
                        total_cells = coverage.total_cells,
                        nan_ratio = ratio,
                        "NaN coverage"
                    );
                }
            }
        }
    }
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn coverage(&self) -> Vec<NanCoverage> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DiagnosticEvent::Coverage(c) => Some(c.coverage),
                DiagnosticEvent::Stage { .. } => None,
            })
            .collect()
    }
}

impl DiagnosticsSink for CollectingSink {
    fn record(&self, event: DiagnosticEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
