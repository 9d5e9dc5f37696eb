use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

use super::bus::EventBus;
use super::config::BusConfig;
use super::registry::BrokerRegistry;
use super::scheduler::DelayScheduler;
use crate::context::ExecutionContext;
use crate::diagnostics::{Diagnostic, DiagnosticBus, DiagnosticSink, SinkSet};
use crate::error::{BusError, current_runtime};

/// Name of the default context for lifecycle-bound subscriptions.
pub(crate) const MAIN_CONTEXT: &str = "main";
/// Name of the default context for detached subscriptions.
pub(crate) const BACKGROUND_CONTEXT: &str = "background";

/// Builder for constructing an [`EventBus`] with optional diagnostic sinks.
pub struct EventBusBuilder {
    cfg: BusConfig,
    sinks: Vec<Arc<dyn DiagnosticSink>>,
}

impl EventBusBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: BusConfig) -> Self {
        Self {
            cfg,
            sinks: Vec::new(),
        }
    }

    /// Sets diagnostic sinks.
    ///
    /// Sinks receive callback faults and scope bookkeeping through dedicated
    /// workers with bounded queues.
    pub fn with_sinks(mut self, sinks: Vec<Arc<dyn DiagnosticSink>>) -> Self {
        self.sinks = sinks;
        self
    }

    /// Builds the bus.
    ///
    /// Initializes the diagnostic channel, the broker registry with its global
    /// broker, the delay scheduler, the `main` and `background` contexts and,
    /// if any sinks were given, the sink listener.
    ///
    /// Fails with [`BusError::NoRuntime`] outside a tokio runtime.
    pub fn build(self) -> Result<EventBus, BusError> {
        let rt = current_runtime()?;
        let root = CancellationToken::new();
        let diagnostics = DiagnosticBus::new(self.cfg.diagnostics_capacity_clamped());

        let main = ExecutionContext::spawn(MAIN_CONTEXT, diagnostics.clone(), root.child_token())?;
        let background = ExecutionContext::spawn(BACKGROUND_CONTEXT, diagnostics.clone(), root.child_token())?;
        let registry = BrokerRegistry::new(root.clone(), diagnostics.clone());
        let scheduler = DelayScheduler::new(root.clone());

        if !self.sinks.is_empty() {
            let sinks = SinkSet::new(self.sinks, diagnostics.clone());
            rt.spawn(sink_listener(sinks, diagnostics.subscribe(), root.clone()));
        }

        Ok(EventBus::from_parts(
            self.cfg,
            root,
            diagnostics,
            registry,
            scheduler,
            main,
            background,
        ))
    }
}

/// Forwards every diagnostic to the sinks until the bus shuts down.
async fn sink_listener(sinks: SinkSet, mut rx: broadcast::Receiver<Diagnostic>, root: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            _ = root.cancelled() => break,
            msg = rx.recv() => match msg {
                Ok(d) => sinks.emit_arc(Arc::new(d)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "diagnostic listener lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
    while let Ok(d) = rx.try_recv() {
        sinks.emit_arc(Arc::new(d));
    }
    sinks.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticKind;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};

    struct Recorder(UnboundedSender<DiagnosticKind>);

    #[async_trait]
    impl DiagnosticSink for Recorder {
        async fn on_diagnostic(&self, d: &Diagnostic) {
            let _ = self.0.send(d.kind);
        }
    }

    #[test]
    fn test_build_requires_runtime() {
        let err = EventBusBuilder::new(BusConfig::default()).build().unwrap_err();
        assert_eq!(err.as_label(), "bus_no_runtime");
    }

    #[tokio::test]
    async fn test_sinks_receive_diagnostics() {
        let (tx, mut rx) = unbounded_channel();
        let sink: Arc<dyn DiagnosticSink> = Arc::new(Recorder(tx));
        let bus = EventBusBuilder::new(BusConfig::default())
            .with_sinks(vec![sink])
            .build()
            .unwrap();

        assert_eq!(bus.main_context().name(), MAIN_CONTEXT);
        assert_eq!(bus.background_context().name(), BACKGROUND_CONTEXT);

        let owner = crate::lifecycle::Lifecycle::new();
        bus.post_with(
            crate::core::Target::owner(&owner),
            Ping,
            crate::core::PostOptions::default(),
        )
        .unwrap();

        let kind = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kind, DiagnosticKind::ScopeCreated);
    }

    struct Ping;
    impl crate::events::Event for Ping {
        const KEY: &'static str = "test.ping";
    }
}
