//! Confidence-gated LLM correction.
//!
//! After mapping, fields that are blank or below the correction threshold are
//! sent to the LLM one group at a time. Scanned documents (too little
//! extracted text) are routed to multimodal correction with rendered page
//! images when the configured model supports it. Group failures are isolated:
//! a group that exhausts its retries is reported failed while the others
//! proceed, and the invoice keeps flowing through the pipeline either way.

pub mod client;
pub mod groups;
pub mod parser;
pub mod prompt;

use std::sync::Arc;

use crate::config::Settings;
use crate::models::enums::CorrectionSource;
use crate::models::invoice::Invoice;
use crate::pipeline::render_cache::{EncodedImage, ImageRenderCache};
use crate::pipeline::retry::RetryPolicy;

use client::CorrectionClient;
use groups::FIELD_GROUPS;

// ═══════════════════════════════════════════════════════════
// Outcome types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupStatus {
    Succeeded,
    Failed(String),
}

/// Result of one group's correction attempt.
#[derive(Debug, Clone)]
pub struct GroupReport {
    pub group: &'static str,
    pub status: GroupStatus,
    pub source: CorrectionSource,
    pub fields_changed: Vec<String>,
}

/// One applied field correction, kept for logging and audit.
#[derive(Debug, Clone)]
pub struct FieldCorrection {
    pub field: String,
    pub previous: Option<String>,
    pub corrected: String,
}

/// Everything that happened during one correction pass.
#[derive(Debug, Clone, Default)]
pub struct CorrectionOutcome {
    pub groups: Vec<GroupReport>,
    pub corrections: Vec<FieldCorrection>,
}

impl CorrectionOutcome {
    pub fn any_applied(&self) -> bool {
        !self.corrections.is_empty()
    }

    pub fn any_failed(&self) -> bool {
        self.groups
            .iter()
            .any(|g| matches!(g.status, GroupStatus::Failed(_)))
    }
}

// ═══════════════════════════════════════════════════════════
// Orchestrator
// ═══════════════════════════════════════════════════════════

pub struct FallbackOrchestrator {
    client: Arc<dyn CorrectionClient>,
    render_cache: Option<Arc<ImageRenderCache>>,
    policy: RetryPolicy,
    correction_threshold: f32,
    corrected_confidence: f32,
    min_text_chars: usize,
    max_prompt_chars: usize,
    default_currency: String,
    multimodal: bool,
}

impl FallbackOrchestrator {
    pub fn new(
        client: Arc<dyn CorrectionClient>,
        render_cache: Option<Arc<ImageRenderCache>>,
        settings: &Settings,
    ) -> Self {
        Self {
            client,
            render_cache,
            policy: RetryPolicy::new(&settings.retry),
            correction_threshold: settings.correction_threshold,
            corrected_confidence: settings.corrected_confidence,
            min_text_chars: settings.min_text_chars,
            max_prompt_chars: settings.max_prompt_chars,
            default_currency: settings.default_currency.clone(),
            multimodal: settings.llm.multimodal,
        }
    }

    /// Run one correction pass over the invoice's weak fields.
    ///
    /// Never fails: every group outcome, success or failure, lands in the
    /// returned report and the invoice's processing state is untouched.
    pub async fn correct(
        &self,
        invoice: &mut Invoice,
        full_text: &str,
        document: &[u8],
    ) -> CorrectionOutcome {
        let mut outcome = CorrectionOutcome::default();

        let targets = self.group_targets(invoice);
        if targets.is_empty() {
            tracing::debug!("No fields below correction threshold");
            return outcome;
        }

        let scanned = full_text.trim().chars().count() < self.min_text_chars;
        let images = if scanned && self.multimodal {
            self.render_cache
                .as_ref()
                .map(|cache| cache.render_document(document))
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        let source = if images.is_empty() {
            CorrectionSource::LlmText
        } else {
            CorrectionSource::LlmMultimodal
        };

        tracing::info!(
            groups = targets.len(),
            scanned,
            source = source.as_str(),
            "Starting correction pass"
        );

        let system = prompt::build_system_prompt();
        for (group, fields) in targets {
            let user =
                prompt::build_user_prompt(group, &fields, invoice, full_text, self.max_prompt_chars);

            let report = match self.call_with_retry(&system, &user, &images).await {
                Ok(response) => match parser::parse_correction_response(&response) {
                    Ok(corrections) => {
                        let changed =
                            self.apply_corrections(invoice, &fields, corrections, &mut outcome);
                        tracing::info!(group, changed = changed.len(), "Group corrected");
                        GroupReport {
                            group,
                            status: GroupStatus::Succeeded,
                            source,
                            fields_changed: changed,
                        }
                    }
                    Err(e) => {
                        tracing::warn!(group, error = %e, "Correction response unusable");
                        GroupReport {
                            group,
                            status: GroupStatus::Failed(e.to_string()),
                            source,
                            fields_changed: Vec::new(),
                        }
                    }
                },
                Err(e) => {
                    tracing::warn!(group, error = %e, "Group correction failed");
                    GroupReport {
                        group,
                        status: GroupStatus::Failed(e.to_string()),
                        source,
                        fields_changed: Vec::new(),
                    }
                }
            };
            outcome.groups.push(report);
        }

        outcome
    }

    /// Group → fields needing correction, in group declaration order.
    fn group_targets(&self, invoice: &Invoice) -> Vec<(&'static str, Vec<String>)> {
        let mut targets = Vec::new();
        for (group, members) in FIELD_GROUPS {
            let fields: Vec<String> = members
                .iter()
                .filter(|f| self.needs_correction(invoice, f))
                .map(|f| f.to_string())
                .collect();
            if !fields.is_empty() {
                targets.push((*group, fields));
            }
        }
        targets
    }

    fn needs_correction(&self, invoice: &Invoice, field: &str) -> bool {
        if invoice.field_is_blank(field) {
            return true;
        }
        invoice
            .field_confidence
            .get(field)
            .copied()
            .unwrap_or(0.0)
            < self.correction_threshold
    }

    async fn call_with_retry(
        &self,
        system: &str,
        user: &str,
        images: &[EncodedImage],
    ) -> Result<String, client::CorrectionError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let result = if images.is_empty() {
                self.client.complete_text(system, user).await
            } else {
                self.client.complete_multimodal(system, user, images).await
            };
            match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && self.policy.allows_retry(attempt) => {
                    let delay = self.policy.delay_for(attempt, e.retry_after());
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient LLM error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Apply corrections for the fields this group was asked about.
    ///
    /// A correction lands only while the field is still blank or below the
    /// threshold, and only when its value parses for the field's type.
    /// Applied fields get the configured post-correction confidence.
    fn apply_corrections(
        &self,
        invoice: &mut Invoice,
        requested: &[String],
        corrections: std::collections::HashMap<String, String>,
        outcome: &mut CorrectionOutcome,
    ) -> Vec<String> {
        let mut changed = Vec::new();
        for (field, value) in corrections {
            if !requested.contains(&field) {
                tracing::debug!(field = %field, "Ignoring unrequested correction");
                continue;
            }
            if !self.needs_correction(invoice, &field) {
                continue;
            }
            let previous = invoice.get_field(&field);
            if invoice.set_field(&field, &value, &self.default_currency) {
                invoice
                    .field_confidence
                    .insert(field.clone(), self.corrected_confidence);
                outcome.corrections.push(FieldCorrection {
                    field: field.clone(),
                    previous,
                    corrected: value,
                });
                changed.push(field);
            } else {
                tracing::debug!(field = %field, "Correction value rejected by field type");
            }
        }
        changed.sort();
        changed
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
