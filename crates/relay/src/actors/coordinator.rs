use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time,
};
use tracing::{debug, error, info, warn};

use common::actors::{Producer, Subsystem, SubsystemKind};
use common::config::LifecycleSettings;
use common::errors::LifecycleError;

use crate::registry::SubscriberRegistry;
use crate::services::broadcaster::{SignalBroadcaster, panic_message};
use crate::services::subscription_service::SubscriptionService;
use crate::traits::{Delivery, SignalRenderer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Init,
    Running,
    Stopping,
    Stopped,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

/// Anomalies collected while the coordinator was running and stopping.
/// None of them prevent reaching [`LifecycleState::Stopped`].
#[derive(Debug, Default)]
pub struct ShutdownReport {
    pub errors: Vec<LifecycleError>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

type ConsumerFactory = Box<dyn FnOnce(SubscriptionService) -> Arc<dyn Subsystem> + Send>;

pub struct CoordinatorBuilder {
    settings: LifecycleSettings,
    producer: Option<Arc<dyn Producer>>,
    delivery: Option<Arc<dyn Delivery>>,
    renderer: Option<Arc<dyn SignalRenderer>>,
    consumer: Option<ConsumerFactory>,
}

impl CoordinatorBuilder {
    pub fn producer(mut self, producer: Arc<dyn Producer>) -> Self {
        self.producer = Some(producer);
        self
    }

    pub fn delivery(mut self, delivery: Arc<dyn Delivery>) -> Self {
        self.delivery = Some(delivery);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn SignalRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// The factory receives the subscription surface bound to the coordinator's registry.
    pub fn consumer<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(SubscriptionService) -> Arc<dyn Subsystem> + Send + 'static,
    {
        self.consumer = Some(Box::new(factory));
        self
    }

    /// Wires the registry into the broadcaster and the consumer, and registers
    /// the broadcaster as the producer callback.
    pub fn build(self) -> Result<LifecycleCoordinator, LifecycleError> {
        let producer = self.producer.ok_or(LifecycleError::MissingComponent("producer"))?;
        let delivery = self.delivery.ok_or(LifecycleError::MissingComponent("delivery"))?;
        let renderer = self.renderer.ok_or(LifecycleError::MissingComponent("renderer"))?;
        let consumer_factory = self.consumer.ok_or(LifecycleError::MissingComponent("consumer"))?;

        let registry = Arc::new(SubscriberRegistry::new());
        let broadcaster = Arc::new(SignalBroadcaster::new(
            registry.clone(),
            delivery,
            renderer,
            self.settings.delivery.clone(),
        ));
        producer.register_callback(broadcaster.clone());

        let consumer = consumer_factory(SubscriptionService::new(registry.clone()));
        let (state, _) = watch::channel(LifecycleState::Init);

        Ok(LifecycleCoordinator {
            settings: self.settings,
            registry,
            broadcaster,
            producer,
            consumer,
            state,
            handles: Mutex::new(HashMap::new()),
            failures: Arc::new(Mutex::new(Vec::new())),
        })
    }
}

struct SubsystemHandle {
    task: JoinHandle<()>,
    done: watch::Receiver<bool>,
}

/// Runs the producer and the consumer as independent tasks and shuts them
/// down in order: producer first, then consumer.
pub struct LifecycleCoordinator {
    settings: LifecycleSettings,
    registry: Arc<SubscriberRegistry>,
    broadcaster: Arc<SignalBroadcaster>,
    producer: Arc<dyn Producer>,
    consumer: Arc<dyn Subsystem>,
    state: watch::Sender<LifecycleState>,
    handles: Mutex<HashMap<SubsystemKind, SubsystemHandle>>,
    failures: Arc<Mutex<Vec<LifecycleError>>>,
}

impl LifecycleCoordinator {
    pub fn builder(settings: LifecycleSettings) -> CoordinatorBuilder {
        CoordinatorBuilder {
            settings,
            producer: None,
            delivery: None,
            renderer: None,
            consumer: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn registry(&self) -> Arc<SubscriberRegistry> {
        self.registry.clone()
    }

    pub fn subscriptions(&self) -> SubscriptionService {
        SubscriptionService::new(self.registry.clone())
    }

    /// Spawns both subsystems. Only valid from `Init`.
    pub fn start(&self) -> Result<(), LifecycleError> {
        // Held across the transition so a concurrent stop() sees both handles.
        let mut handles = self.handles.lock();

        let mut from = LifecycleState::Init;
        let started = self.state.send_if_modified(|state| {
            from = *state;
            if *state == LifecycleState::Init {
                *state = LifecycleState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(LifecycleError::InvalidTransition {
                from: from.as_str(),
                to: LifecycleState::Running.as_str(),
            });
        }

        let producer = self.producer.clone();
        handles.insert(
            SubsystemKind::Producer,
            self.spawn(SubsystemKind::Producer, async move { producer.run().await }),
        );

        let consumer = self.consumer.clone();
        handles.insert(
            SubsystemKind::Consumer,
            self.spawn(SubsystemKind::Consumer, async move { consumer.run().await }),
        );

        info!("Lifecycle coordinator running");
        Ok(())
    }

    fn spawn<F>(&self, kind: SubsystemKind, run: F) -> SubsystemHandle
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let (done_tx, done) = watch::channel(false);
        let failures = self.failures.clone();

        let task = tokio::spawn(async move {
            let failure = match AssertUnwindSafe(run).catch_unwind().await {
                Ok(Ok(())) => {
                    info!("{:?} finished", kind);
                    None
                }
                Ok(Err(e)) => Some(format!("{e:#}")),
                Err(panic) => Some(format!("panicked: {}", panic_message(panic.as_ref()))),
            };

            if let Some(reason) = failure {
                let err = LifecycleError::SubsystemFailed { subsystem: kind, reason };
                error!(label = err.as_label(), "{}", err);
                failures.lock().push(err);
            }
            let _ = done_tx.send(true);
        });

        SubsystemHandle { task, done }
    }

    /// Resolves once both subsystem tasks have exited, whatever the reason.
    pub async fn wait_finished(&self) {
        let receivers: Vec<watch::Receiver<bool>> =
            self.handles.lock().values().map(|h| h.done.clone()).collect();

        for mut done in receivers {
            let _ = done.wait_for(|finished| *finished).await;
        }
    }

    pub async fn wait_stopped(&self) {
        let mut state = self.state.subscribe();
        let _ = state.wait_for(|s| *s == LifecycleState::Stopped).await;
    }

    /// Idempotent. The first caller runs the shutdown sequence; concurrent or
    /// later callers wait for `Stopped` and get an empty report.
    pub async fn stop(&self) -> ShutdownReport {
        let mut from = LifecycleState::Init;
        let claimed = self.state.send_if_modified(|state| {
            from = *state;
            match *state {
                LifecycleState::Init | LifecycleState::Running => {
                    *state = LifecycleState::Stopping;
                    true
                }
                LifecycleState::Stopping | LifecycleState::Stopped => false,
            }
        });

        if !claimed {
            debug!("Stop already in progress or done, waiting for it");
            self.wait_stopped().await;
            return ShutdownReport::default();
        }

        if from == LifecycleState::Init {
            self.state.send_replace(LifecycleState::Stopped);
            info!("Coordinator stopped before start");
            return ShutdownReport::default();
        }

        info!("Shutting down: producer first, then consumer");
        let mut report = ShutdownReport::default();

        self.broadcaster.close();
        self.stop_subsystem(SubsystemKind::Producer, self.producer.stop(), &mut report)
            .await;
        self.stop_subsystem(SubsystemKind::Consumer, self.consumer.stop(), &mut report)
            .await;

        let mut errors = std::mem::take(&mut *self.failures.lock());
        errors.append(&mut report.errors);
        report.errors = errors;

        self.state.send_replace(LifecycleState::Stopped);
        if report.is_clean() {
            info!("Shutdown complete");
        } else {
            warn!(anomalies = report.errors.len(), "Shutdown complete with anomalies");
        }
        report
    }

    async fn stop_subsystem<F>(&self, kind: SubsystemKind, stop: F, report: &mut ShutdownReport)
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        let timeout = self.settings.shutdown_timeout;
        let handle = self
            .handles
            .lock()
            .get(&kind)
            .map(|h| (h.task.abort_handle(), h.done.clone()));

        let stop_failure = match time::timeout(timeout, stop).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{e:#}")),
            Err(_) => Some(format!("stop() did not return within {:?}", timeout)),
        };
        if let Some(reason) = stop_failure {
            let err = LifecycleError::StopFailed { subsystem: kind, reason };
            error!(label = err.as_label(), "{}", err);
            report.errors.push(err);
        }

        let Some((task, mut done)) = handle else {
            return;
        };

        if wait_done(&mut done, timeout).await {
            info!("{:?} stopped", kind);
        } else {
            task.abort();
            let err = LifecycleError::StopTimeout { subsystem: kind, timeout };
            error!(label = err.as_label(), "{}", err);
            report.errors.push(err);
        }
    }
}

/// `true` when the task signalled completion (or vanished) before `timeout`.
async fn wait_done(done: &mut watch::Receiver<bool>, timeout: Duration) -> bool {
    time::timeout(timeout, done.wait_for(|finished| *finished))
        .await
        .is_ok()
}
