//! Outstream demo - one ad slot driven by simulated collaborators.
//!
//! Plays one ad to completion, then a second one whose engine fails after
//! becoming ready, logging every lifecycle event along the way.
//!
//! # Running
//!
//! ```bash
//! cargo run --bin outstream-demo
//! RUST_LOG=outstream_controller=trace cargo run --bin outstream-demo
//! OUTSTREAM_METRICS_ADDR=127.0.0.1:9000 cargo run --bin outstream-demo
//! ```

use anyhow::Context;
use outstream_controller::{AdConfig, AdController, Collaborators, LifecyclePhase, attach_log_observer};
use outstream_core::decision::{AdDecision, DecisionFuture, DecisionRequest, Locator};
use outstream_core::engine::{
    EngineFuture, EngineSignal, RenderError, RenderingEngine, SignalSink, SlotDimensions,
};
use outstream_core::environment::{Clock, SystemClock};
use outstream_core::presentation::HeadlessPresentation;
use outstream_runtime::metrics::MetricsServer;
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const AD_REQUEST_INTERVAL: Duration = Duration::from_secs(1);
const SIGNAL_SPACING: Duration = Duration::from_millis(150);

/// Ad server stand-in answering after a random latency.
#[derive(Debug, Default)]
struct SimulatedDecision {
    served: AtomicU64,
}

impl AdDecision for SimulatedDecision {
    fn request_locator(&self, request: &DecisionRequest) -> DecisionFuture<'_> {
        let served = self.served.fetch_add(1, Ordering::SeqCst) + 1;
        let latency = Duration::from_millis(rand::thread_rng().gen_range(50..250));
        let locator = Locator::new(format!("https://ads.example.com/vast/{}/{served}", request.tag));
        tracing::debug!(latency_ms = latency.as_millis(), "Ad server answering");

        Box::pin(async move {
            tokio::time::sleep(latency).await;
            Ok(locator)
        })
    }
}

/// Rendering engine stand-in replaying a scripted session.
#[derive(Debug, Default)]
struct SimulatedEngine {
    fail_next: AtomicBool,
}

impl SimulatedEngine {
    fn script(fail: bool) -> Vec<EngineSignal> {
        if fail {
            return vec![
                EngineSignal::Ready,
                EngineSignal::Error(RenderError::new(402, "Timeout loading media file")),
            ];
        }
        vec![
            EngineSignal::Ready,
            EngineSignal::Loaded {
                content_type: "video/mp4".to_string(),
            },
            EngineSignal::ContentPauseRequested,
            EngineSignal::Started,
            EngineSignal::Impression,
            EngineSignal::FirstQuartile,
            EngineSignal::Midpoint,
            EngineSignal::ThirdQuartile,
            EngineSignal::Complete,
            EngineSignal::AllAdsCompleted,
        ]
    }
}

impl RenderingEngine for SimulatedEngine {
    fn prepare(&self) -> EngineFuture<'_, Result<(), RenderError>> {
        Box::pin(async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        })
    }

    fn initialize(
        &self,
        locator: &Locator,
        dimensions: SlotDimensions,
        sink: SignalSink,
    ) -> EngineFuture<'_, Result<(), RenderError>> {
        let script = Self::script(self.fail_next.swap(false, Ordering::SeqCst));
        tracing::debug!(
            session = sink.session(),
            locator = %locator,
            width = dimensions.width,
            height = dimensions.height,
            "Engine session opened"
        );

        tokio::spawn(async move {
            for signal in script {
                tokio::time::sleep(SIGNAL_SPACING).await;
                if !sink.emit(signal) {
                    break;
                }
            }
        });
        Box::pin(async { Ok(()) })
    }

    fn resize(&self, dimensions: SlotDimensions) {
        tracing::debug!(width = dimensions.width, height = dimensions.height, "Engine resized");
    }

    fn destroy(&self) -> EngineFuture<'_, ()> {
        Box::pin(async {
            tracing::debug!("Engine session destroyed");
        })
    }
}

async fn wait_for_idle<C: Clock + Clone + 'static>(controller: &AdController<C>) -> anyhow::Result<()> {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let snapshot = controller.snapshot().await;
            if snapshot.phase == LifecyclePhase::Idle && snapshot.cancel_count > 0 {
                return;
            }
        }
    })
    .await
    .context("ad did not finish within 10s")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "outstream_controller=debug,outstream_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metrics = match std::env::var("OUTSTREAM_METRICS_ADDR") {
        Ok(addr) => {
            let mut server = MetricsServer::new(addr.parse().context("invalid OUTSTREAM_METRICS_ADDR")?);
            server.start()?;
            Some(server)
        },
        Err(_) => None,
    };

    let engine = Arc::new(SimulatedEngine::default());
    let controller = AdController::new(
        AdConfig::new("outstream-demo")
            .with_domain("demo.example.com")
            .with_targeting("section", "news")
            .with_ad_request_interval(AD_REQUEST_INTERVAL),
        SystemClock,
        Collaborators::new(
            Arc::new(SimulatedDecision::default()),
            Arc::clone(&engine) as Arc<dyn RenderingEngine>,
            Arc::new(HeadlessPresentation),
        ),
    );
    attach_log_observer(controller.bus());

    tracing::info!("=== Outstream demo ===");
    controller.start().await?;

    tracing::info!("--- Ad 1: full play-through ---");
    controller.show_advertisement().await?;
    wait_for_idle(&controller).await?;

    tracing::info!("--- Ad 2: engine error after ready ---");
    engine.fail_next.store(true, Ordering::SeqCst);
    tokio::time::sleep(AD_REQUEST_INTERVAL).await;
    let before = controller.snapshot().await.cancel_count;
    controller.show_advertisement().await?;
    tokio::time::timeout(Duration::from_secs(10), async {
        while controller.snapshot().await.cancel_count == before {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .context("render error did not cancel within 10s")?;

    let snapshot = controller.snapshot().await;
    tracing::info!(snapshot = %serde_json::to_string(&snapshot)?, "Final state");

    let health = controller.health().await;
    tracing::info!(health = %serde_json::to_string(&health)?, "Health");

    if let Some(text) = metrics.as_ref().and_then(MetricsServer::render) {
        tracing::info!("Metrics:\n{text}");
    }

    controller.shutdown(Duration::from_secs(5)).await?;
    tracing::info!("Demo finished");
    Ok(())
}
