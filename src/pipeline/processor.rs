//! End-to-end invoice processing.
//!
//! One `process` call takes raw document bytes all the way to a persisted
//! invoice: provider analysis (with retry), canonical mapping, confidence
//! scoring, optional LLM correction when the score falls below the threshold,
//! arithmetic validation, and the initial insert at review version 0. The
//! pipeline never aborts on extraction failure — a degraded provider result
//! is persisted at zero confidence with the failure reason so the document
//! still reaches a reviewer.

use rusqlite::Connection;

use crate::config::Settings;
use crate::db::{repository, DatabaseError};
use crate::models::invoice::Invoice;
use crate::pipeline::confidence::overall_confidence;
use crate::pipeline::correction::FallbackOrchestrator;
use crate::pipeline::gateway::ExtractionGateway;
use crate::pipeline::mapper::CanonicalFieldMapper;
use crate::pipeline::validation;

pub struct InvoiceProcessor {
    gateway: ExtractionGateway,
    mapper: CanonicalFieldMapper,
    orchestrator: Option<FallbackOrchestrator>,
    correction_threshold: f32,
}

impl InvoiceProcessor {
    pub fn new(
        gateway: ExtractionGateway,
        orchestrator: Option<FallbackOrchestrator>,
        settings: &Settings,
    ) -> Self {
        Self {
            gateway,
            mapper: CanonicalFieldMapper::new(&settings.default_currency),
            orchestrator,
            correction_threshold: settings.correction_threshold,
        }
    }

    /// Process one document and persist the resulting invoice.
    pub async fn process(
        &self,
        conn: &Connection,
        document: &[u8],
    ) -> Result<Invoice, DatabaseError> {
        let raw = self.gateway.analyze(document).await;
        let mut invoice = self.mapper.map(&raw);

        if let Some(reason) = &invoice.source_error {
            tracing::warn!(
                invoice_id = %invoice.id,
                reason = %reason,
                "Extraction degraded; persisting for manual review"
            );
            invoice.extraction_confidence = 0.0;
            repository::insert_invoice(conn, &invoice)?;
            return Ok(invoice);
        }

        invoice.extraction_confidence = overall_confidence(&invoice.field_confidence);
        tracing::info!(
            invoice_id = %invoice.id,
            confidence = invoice.extraction_confidence,
            fields = invoice.field_confidence.len(),
            "Document mapped"
        );

        let any_weak_field = invoice
            .field_confidence
            .values()
            .any(|&c| c < self.correction_threshold);
        if invoice.extraction_confidence < self.correction_threshold || any_weak_field {
            if let Some(orchestrator) = &self.orchestrator {
                let outcome = orchestrator
                    .correct(&mut invoice, &raw.full_text, document)
                    .await;
                if outcome.any_applied() {
                    invoice.extraction_confidence = overall_confidence(&invoice.field_confidence);
                }
                tracing::info!(
                    invoice_id = %invoice.id,
                    corrections = outcome.corrections.len(),
                    failed_groups = outcome.groups.iter()
                        .filter(|g| !matches!(g.status,
                            crate::pipeline::correction::GroupStatus::Succeeded))
                        .count(),
                    confidence = invoice.extraction_confidence,
                    "Correction pass finished"
                );
            }
        }

        let summary = validation::validate(&invoice);
        if !summary.all_valid {
            tracing::warn!(
                invoice_id = %invoice.id,
                failed = summary.total - summary.passed,
                "Arithmetic validation found inconsistencies"
            );
        }
        invoice.validation_warnings = summary.errors;

        repository::insert_invoice(conn, &invoice)?;
        Ok(invoice)
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    use crate::config::RetrySettings;
    use crate::db::init_schema;
    use crate::models::enums::ProcessingState;
    use crate::pipeline::correction::client::MockCorrectionClient;
    use crate::pipeline::gateway::{
        OcrProvider, ProviderError, RawExtraction, RawField, RawLineItem,
    };
    use crate::pipeline::retry::RetryPolicy;

    struct FixedProvider(Result<RawExtraction, &'static str>);

    #[async_trait]
    impl OcrProvider for FixedProvider {
        async fn analyze_once(&self, _document: &[u8]) -> Result<RawExtraction, ProviderError> {
            match &self.0 {
                Ok(raw) => Ok(raw.clone()),
                Err(body) => Err(ProviderError::Http {
                    status: 400,
                    body: body.to_string(),
                }),
            }
        }
    }

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(&RetrySettings {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        })
    }

    fn confident_extraction() -> RawExtraction {
        let mut fields = HashMap::new();
        for (name, value, conf) in [
            ("InvoiceId", "INV-500", 0.98),
            ("VendorName", "Acme Corp", 0.95),
            ("InvoiceDate", "2026-03-14", 0.96),
            ("SubTotal", "1150.00", 0.96),
            ("TotalTax", "100.00", 0.94),
            ("InvoiceTotal", "1250.00", 0.97),
        ] {
            fields.insert(
                name.to_string(),
                RawField {
                    value: value.into(),
                    confidence: conf,
                },
            );
        }
        RawExtraction {
            fields,
            line_items: vec![RawLineItem {
                description: Some("Widget".into()),
                quantity: Some("1".into()),
                unit_price: Some("1150.00".into()),
                amount: Some("1150.00".into()),
                confidence: 0.9,
                ..RawLineItem::default()
            }],
            full_text: "Acme Corp Invoice INV-500 total 1250.00 ".repeat(10),
            confidence: 0.95,
            error: None,
        }
    }

    #[tokio::test]
    async fn confident_document_skips_correction_and_persists() {
        let conn = test_conn();
        let settings = Settings::default();
        let gateway = ExtractionGateway::new(
            Box::new(FixedProvider(Ok(confident_extraction()))),
            fast_policy(),
        );
        let processor = InvoiceProcessor::new(gateway, None, &settings);

        let invoice = processor.process(&conn, b"pdf").await.unwrap();

        assert!(invoice.extraction_confidence > settings.correction_threshold);
        assert_eq!(invoice.processing_state, ProcessingState::Extracted);
        assert_eq!(invoice.review_version, 0);
        assert!(invoice.validation_warnings.is_empty());

        let loaded = repository::get_invoice(&conn, &invoice.id).unwrap().unwrap();
        assert_eq!(loaded.invoice_number.as_deref(), Some("INV-500"));
        assert_eq!(
            loaded.total_amount,
            Some(BigDecimal::from_str("1250.00").unwrap())
        );
    }

    #[tokio::test]
    async fn degraded_extraction_persists_with_reason() {
        let conn = test_conn();
        let settings = Settings::default();
        let gateway = ExtractionGateway::new(
            Box::new(FixedProvider(Err("bad request"))),
            fast_policy(),
        );
        let processor = InvoiceProcessor::new(gateway, None, &settings);

        let invoice = processor.process(&conn, b"pdf").await.unwrap();

        assert_eq!(invoice.extraction_confidence, 0.0);
        assert!(invoice.source_error.as_deref().unwrap().contains("400"));
        assert_eq!(invoice.processing_state, ProcessingState::Extracted);

        let loaded = repository::get_invoice(&conn, &invoice.id).unwrap().unwrap();
        assert!(loaded.source_error.is_some());
        assert_eq!(loaded.extraction_confidence, 0.0);
    }

    #[tokio::test]
    async fn weak_extraction_goes_through_correction() {
        let conn = test_conn();
        let mut settings = Settings::default();
        settings.retry.max_attempts = 1;
        settings.retry.initial_delay = Duration::from_millis(1);

        // Only a weak invoice number: overall confidence far below threshold.
        let mut fields = HashMap::new();
        fields.insert(
            "InvoiceId".to_string(),
            RawField {
                value: "INV-9".into(),
                confidence: 0.4,
            },
        );
        let raw = RawExtraction {
            fields,
            full_text: "Invoice INV-9 from Acme ".repeat(20),
            confidence: 0.4,
            ..RawExtraction::default()
        };

        // Every group gets corrected; only the header script matters here.
        let client = Arc::new(MockCorrectionClient::new(vec![Ok(
            r#"{"invoice_number": "INV-900", "invoice_date": "2026-03-14"}"#.to_string(),
        )]));
        let orchestrator = FallbackOrchestrator::new(client.clone(), None, &settings);
        let gateway = ExtractionGateway::new(Box::new(FixedProvider(Ok(raw))), fast_policy());
        let processor = InvoiceProcessor::new(gateway, Some(orchestrator), &settings);

        let invoice = processor.process(&conn, b"pdf").await.unwrap();

        assert!(client.calls() > 0);
        assert_eq!(invoice.invoice_number.as_deref(), Some("INV-900"));
        assert_eq!(
            invoice.invoice_date,
            Some(chrono::NaiveDate::from_ymd_opt(2026, 3, 14).unwrap())
        );
        // Confidence recomputed after corrections landed.
        assert!(invoice.extraction_confidence > 0.4);
    }

    #[tokio::test]
    async fn validation_warnings_are_persisted() {
        let conn = test_conn();
        let settings = Settings::default();

        let mut raw = confident_extraction();
        // Stated subtotal disagrees with the single 1150.00 line item.
        raw.fields.insert(
            "SubTotal".to_string(),
            RawField {
                value: "1100.00".into(),
                confidence: 0.96,
            },
        );
        let gateway = ExtractionGateway::new(Box::new(FixedProvider(Ok(raw))), fast_policy());
        let processor = InvoiceProcessor::new(gateway, None, &settings);

        let invoice = processor.process(&conn, b"pdf").await.unwrap();
        assert!(!invoice.validation_warnings.is_empty());
        assert!(invoice.validation_warnings[0].contains("subtotal"));

        let loaded = repository::get_invoice(&conn, &invoice.id).unwrap().unwrap();
        assert_eq!(loaded.validation_warnings, invoice.validation_warnings);
    }
}
