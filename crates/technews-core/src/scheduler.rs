//! Trigger fan-in: chat messages, slash commands and the recurring timer all end up in a
//! [`ReportProducer`] and then in the [`Transport`].
//!
//! Every trigger handler is a recovery boundary. Failures are logged and answered with
//! a generic notice (or skipped, for the timer); nothing propagates to the caller.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashSet;
use rand::seq::SliceRandom;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::Result;
use crate::delivery::{
    acknowledgement, error_message, in_flight_notice, report_message, timer_message,
};
use crate::metrics::{record_delivery, record_pipeline_run};
use crate::pipeline::ReportProducer;
use crate::transport::{
    COMMAND_NAME, CommandInvocation, InboundEvent, InboundMessage, TOPIC_OPTION, Transport,
    technews_command,
};

/// Exponential backoff for retryable producer failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(30_000),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Destination of timer reports; ticks are skipped while unset.
    pub channel_id: Option<String>,
    pub interval: Duration,
    pub initial_delay: Duration,
    pub topics: Vec<String>,
    pub default_command_topic: String,
    pub max_report_chars: usize,
    pub dedupe_in_flight: bool,
    pub retry: RetryPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            channel_id: None,
            interval: Duration::from_secs(6 * 60 * 60),
            initial_delay: Duration::from_secs(30),
            topics: [
                "artificial intelligence",
                "blockchain",
                "cybersecurity",
                "technology trends",
                "machine learning",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            default_command_topic: "technology".to_string(),
            max_report_chars: 8192,
            dedupe_in_flight: false,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingChannel,
    ChannelUnavailable,
    TopicInFlight,
    NoTopics,
}

/// How a single trigger invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Ignored,
    Skipped(SkipReason),
    Failed,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Delivered => "delivered",
            DeliveryOutcome::Ignored => "ignored",
            DeliveryOutcome::Skipped(_) => "skipped",
            DeliveryOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryOutcome::Skipped(reason) => write!(f, "skipped ({reason:?})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Topics with a report run in progress, keyed case-insensitively.
#[derive(Debug, Default)]
pub struct InFlightTopics {
    topics: DashSet<String>,
}

impl InFlightTopics {
    pub fn key(topic: &str) -> String {
        topic.trim().to_lowercase()
    }

    /// Claim `topic`; `None` when another run already holds it.
    pub fn try_acquire(&self, topic: &str) -> Option<InFlightGuard<'_>> {
        let key = Self::key(topic);
        if self.topics.insert(key.clone()) {
            Some(InFlightGuard {
                registry: self,
                key,
            })
        } else {
            None
        }
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.topics.contains(&Self::key(topic))
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

/// Releases the topic on drop.
pub struct InFlightGuard<'a> {
    registry: &'a InFlightTopics,
    key: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.registry.topics.remove(&self.key);
    }
}

/// Stops the recurring timer. Ticks already running are left to finish.
pub struct ScheduleHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ScheduleHandle {
    pub async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(err) = self.task.await {
            warn!(error = %err, "timer task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Upper bound for timer delays; keeps instant arithmetic in range.
const MAX_TIMER_SPAN: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

const MESSAGE_TRIGGER: &str = "message";
const COMMAND_TRIGGER: &str = "command";
const TIMER_TRIGGER: &str = "timer";

pub struct DeliveryScheduler {
    producer: Arc<dyn ReportProducer>,
    transport: Arc<dyn Transport>,
    config: SchedulerConfig,
    in_flight: InFlightTopics,
}

impl DeliveryScheduler {
    pub fn new(
        producer: Arc<dyn ReportProducer>,
        transport: Arc<dyn Transport>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            producer,
            transport,
            config,
            in_flight: InFlightTopics::default(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn in_flight(&self) -> &InFlightTopics {
        &self.in_flight
    }

    pub async fn register_commands(&self) -> Result<()> {
        let spec = technews_command();
        self.transport.register_command(&spec).await?;
        info!(command = %spec.name, "registered command");
        Ok(())
    }

    /// Handle one inbound event. Never fails; the outcome is for logging and tests.
    pub async fn handle_event(&self, event: InboundEvent) -> DeliveryOutcome {
        let run_id = Uuid::new_v4();
        match event {
            InboundEvent::Message(message) => {
                let span = info_span!("trigger", trigger = MESSAGE_TRIGGER, %run_id);
                let outcome = self.on_message(&message).instrument(span).await;
                record_delivery(MESSAGE_TRIGGER, outcome.as_str());
                outcome
            }
            InboundEvent::Command(invocation) => {
                let span = info_span!("trigger", trigger = COMMAND_TRIGGER, %run_id);
                let outcome = self.on_command(&invocation).instrument(span).await;
                record_delivery(COMMAND_TRIGGER, outcome.as_str());
                outcome
            }
        }
    }

    /// Run exactly one timer tick.
    pub async fn tick(&self) -> DeliveryOutcome {
        let run_id = Uuid::new_v4();
        let span = info_span!("trigger", trigger = TIMER_TRIGGER, %run_id);
        let outcome = self.on_tick().instrument(span).await;
        record_delivery(TIMER_TRIGGER, outcome.as_str());
        outcome
    }

    /// One warm-up tick after `initial_delay`, plus a recurring tick every `interval`
    /// counted from the start, so the schedule is `delay, interval, 2 * interval, ...`.
    /// Each tick runs in its own task so a slow report never shifts the schedule.
    pub fn start_timer(self: Arc<Self>) -> ScheduleHandle {
        let (stop, mut stopped) = oneshot::channel::<()>();
        let period = self
            .config
            .interval
            .clamp(Duration::from_millis(1), MAX_TIMER_SPAN);
        let delay = self.config.initial_delay.min(MAX_TIMER_SPAN);
        let started = tokio::time::Instant::now();

        info!(
            initial_delay_secs = delay.as_secs(),
            interval_secs = period.as_secs(),
            "starting report timer"
        );

        let task = tokio::spawn(async move {
            let warm_up = tokio::time::sleep_until(started + delay);
            tokio::pin!(warm_up);
            let mut warmed_up = false;

            let mut ticker = tokio::time::interval_at(started + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = &mut warm_up, if !warmed_up => {
                        warmed_up = true;
                        Arc::clone(&self).spawn_tick();
                    }
                    _ = ticker.tick() => Arc::clone(&self).spawn_tick(),
                }
            }
            info!("report timer stopped");
        });

        ScheduleHandle { stop, task }
    }

    fn spawn_tick(self: Arc<Self>) {
        tokio::spawn(async move {
            self.tick().await;
        });
    }

    /// Handle every event from `events` in its own task until the sender closes.
    pub fn dispatch(self: Arc<Self>, mut events: mpsc::Receiver<InboundEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let scheduler = Arc::clone(&self);
                tokio::spawn(async move {
                    scheduler.handle_event(event).await;
                });
            }
            debug!("inbound event stream closed");
        })
    }

    async fn on_message(&self, message: &InboundMessage) -> DeliveryOutcome {
        if message.author.bot {
            debug!(author = %message.author.id, "ignoring automated author");
            return DeliveryOutcome::Ignored;
        }
        let topic = message.content.trim();
        if topic.is_empty() {
            return DeliveryOutcome::Ignored;
        }

        info!(%topic, channel = %message.channel_id, "message trigger received");

        let _guard = if self.config.dedupe_in_flight {
            match self.in_flight.try_acquire(topic) {
                Some(guard) => Some(guard),
                None => {
                    info!(%topic, "topic already in flight");
                    if let Err(err) = self.transport.reply(message, &in_flight_notice()).await {
                        warn!(error = %err, "failed to send in-flight notice");
                    }
                    return DeliveryOutcome::Skipped(SkipReason::TopicInFlight);
                }
            }
        } else {
            None
        };

        if let Err(err) = self
            .transport
            .send(&message.channel_id, &acknowledgement())
            .await
        {
            warn!(error = %err, "failed to send acknowledgement");
        }

        let report = match self.produce(MESSAGE_TRIGGER, topic).await {
            Ok(report) => report,
            Err(err) => {
                error!(error = %err, "message trigger failed");
                if let Err(err) = self.transport.reply(message, &error_message(false)).await {
                    warn!(error = %err, "failed to send error notice");
                }
                return DeliveryOutcome::Failed;
            }
        };

        match self
            .transport
            .reply(message, &report_message(&report, self.config.max_report_chars))
            .await
        {
            Ok(()) => {
                info!("report delivered");
                DeliveryOutcome::Delivered
            }
            Err(err) => {
                error!(error = %err, "failed to deliver report");
                DeliveryOutcome::Failed
            }
        }
    }

    async fn on_command(&self, invocation: &CommandInvocation) -> DeliveryOutcome {
        if invocation.command_name != COMMAND_NAME {
            debug!(command = %invocation.command_name, "ignoring unknown command");
            return DeliveryOutcome::Ignored;
        }

        let mut deferred = false;
        match self.run_command(invocation, &mut deferred).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(error = %err, deferred, "command trigger failed");
                let sent = if deferred {
                    self.transport
                        .edit_deferred(invocation, &error_message(false))
                        .await
                } else {
                    self.transport
                        .respond(invocation, &error_message(true))
                        .await
                };
                if let Err(err) = sent {
                    warn!(error = %err, "failed to send error notice");
                }
                DeliveryOutcome::Failed
            }
        }
    }

    async fn run_command(
        &self,
        invocation: &CommandInvocation,
        deferred: &mut bool,
    ) -> Result<DeliveryOutcome> {
        self.transport.defer(invocation).await?;
        *deferred = true;

        let topic = invocation
            .option(TOPIC_OPTION)
            .map(str::trim)
            .filter(|topic| !topic.is_empty())
            .unwrap_or(self.config.default_command_topic.as_str());

        info!(%topic, "command trigger received");

        let _guard = if self.config.dedupe_in_flight {
            match self.in_flight.try_acquire(topic) {
                Some(guard) => Some(guard),
                None => {
                    info!(%topic, "topic already in flight");
                    self.transport
                        .edit_deferred(invocation, &in_flight_notice())
                        .await?;
                    return Ok(DeliveryOutcome::Skipped(SkipReason::TopicInFlight));
                }
            }
        } else {
            None
        };

        let report = self.produce(COMMAND_TRIGGER, topic).await?;
        self.transport
            .edit_deferred(
                invocation,
                &report_message(&report, self.config.max_report_chars),
            )
            .await?;

        info!("report delivered");
        Ok(DeliveryOutcome::Delivered)
    }

    async fn on_tick(&self) -> DeliveryOutcome {
        let Some(channel_id) = self.config.channel_id.as_deref() else {
            warn!("no news channel configured; skipping tick");
            return DeliveryOutcome::Skipped(SkipReason::MissingChannel);
        };

        match self.transport.channel_accepts_messages(channel_id).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(channel = %channel_id, "news channel does not accept messages; skipping tick");
                return DeliveryOutcome::Skipped(SkipReason::ChannelUnavailable);
            }
            Err(err) => {
                warn!(channel = %channel_id, error = %err, "news channel unreachable; skipping tick");
                return DeliveryOutcome::Skipped(SkipReason::ChannelUnavailable);
            }
        }

        let picked = {
            let mut rng = rand::thread_rng();
            self.config.topics.choose(&mut rng).cloned()
        };
        let Some(topic) = picked else {
            warn!("no timer topics configured; skipping tick");
            return DeliveryOutcome::Skipped(SkipReason::NoTopics);
        };

        info!(%topic, channel = %channel_id, "timer tick");

        let _guard = if self.config.dedupe_in_flight {
            match self.in_flight.try_acquire(&topic) {
                Some(guard) => Some(guard),
                None => {
                    info!(%topic, "topic already in flight; skipping tick");
                    return DeliveryOutcome::Skipped(SkipReason::TopicInFlight);
                }
            }
        } else {
            None
        };

        let report = match self.produce(TIMER_TRIGGER, &topic).await {
            Ok(report) => report,
            Err(err) => {
                error!(%topic, error = %err, "timer report failed");
                return DeliveryOutcome::Failed;
            }
        };

        let message = timer_message(
            &topic,
            &report,
            self.config.max_report_chars,
            self.config.interval,
            Utc::now(),
        );
        match self.transport.send(channel_id, &message).await {
            Ok(()) => {
                info!(%topic, "timer report delivered");
                DeliveryOutcome::Delivered
            }
            Err(err) => {
                error!(%topic, error = %err, "failed to deliver timer report");
                DeliveryOutcome::Failed
            }
        }
    }

    async fn produce(&self, trigger: &'static str, topic: &str) -> Result<String> {
        let retry = &self.config.retry;
        let started = Instant::now();
        let mut attempt = 0;
        let mut backoff = retry.initial_backoff;

        loop {
            match self.producer.produce(topic).await {
                Ok(report) => {
                    record_pipeline_run(trigger, "success", started.elapsed().as_millis() as u64);
                    return Ok(report);
                }
                Err(err) if attempt < retry.max_retries && err.is_retryable() => {
                    attempt += 1;
                    warn!(
                        error = %err,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "report production failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2).min(retry.max_backoff);
                }
                Err(err) => {
                    record_pipeline_run(trigger, "failure", started.elapsed().as_millis() as u64);
                    return Err(err);
                }
            }
        }
    }
}
