//! Service entry point: process any documents named on the command line,
//! then serve the review API.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

use factura::api::{router, AppState};
use factura::config::{Settings, APP_NAME, APP_VERSION};
use factura::db;
use factura::pipeline::correction::client::HttpCorrectionClient;
use factura::pipeline::correction::FallbackOrchestrator;
use factura::pipeline::gateway::{ExtractionGateway, HttpOcrProvider};
use factura::pipeline::processor::InvoiceProcessor;
use factura::pipeline::render_cache::{ImageRenderCache, PdfiumPageRenderer};
use factura::pipeline::retry::RetryPolicy;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env();
    tracing::info!(version = APP_VERSION, "Starting {APP_NAME}");

    let conn = db::open_database(&settings.database_path)?;

    let documents: Vec<PathBuf> = std::env::args().skip(1).map(PathBuf::from).collect();
    if !documents.is_empty() {
        let gateway = ExtractionGateway::new(
            Box::new(HttpOcrProvider::new(&settings.ocr)),
            RetryPolicy::new(&settings.retry),
        );
        let render_cache = match PdfiumPageRenderer::new() {
            Ok(renderer) => Some(Arc::new(ImageRenderCache::new(
                Box::new(renderer),
                settings.render.clone(),
            ))),
            Err(e) => {
                tracing::warn!(error = %e, "PDF rendering unavailable; multimodal correction disabled");
                None
            }
        };
        let client = Arc::new(HttpCorrectionClient::new(&settings.llm));
        let orchestrator = FallbackOrchestrator::new(client, render_cache, &settings);
        let processor = InvoiceProcessor::new(gateway, Some(orchestrator), &settings);

        for path in &documents {
            let bytes = std::fs::read(path)?;
            let invoice = processor.process(&conn, &bytes).await?;
            tracing::info!(
                file = %path.display(),
                invoice_id = %invoice.id,
                confidence = invoice.extraction_confidence,
                "Document processed"
            );
        }
    }

    let bind_addr = settings.bind_addr.clone();
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        settings: Arc::new(settings),
    };

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Review service listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
