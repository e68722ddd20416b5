//! Offline watcher: keeps the register unlocked only while the trial is
//! active and the authority stays reachable.
//!
//! The decision logic lives in [`WatcherCore`], a synchronous reducer fed
//! with fetch results and timer ticks. [`OfflineWatcher::spawn`] wraps it
//! in a tokio task that owns the poll interval, the countdown ticker and at
//! most one in-flight status request. The UI talks to the task only
//! through a [`WatcherHandle`]: it sends commands and subscribes to
//! [`WatcherEvent`]s, and never mutates the watcher's state.

use crate::authority::AuthorityClient;
use crate::cache::{CachedStatus, StatusCache};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tablepos_license::{LicenseError, LicensePolicy, LicenseResult, LicenseStatusResponse, TrialStatus};
use tablepos_types::{Clock, MachineId, SystemClock};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 64;
const COMMAND_CAPACITY: usize = 16;
/// Floor for timer periods; tokio intervals reject zero.
const MIN_PERIOD: Duration = Duration::from_millis(10);

/// Timing knobs for the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Interval between status polls.
    pub poll_interval: Duration,
    /// How long the authority may stay unreachable before locking.
    pub offline_grace: Duration,
    /// A request slower than this counts as unreachable.
    pub request_timeout: Duration,
    /// Resolution of the offline countdown and the local expiry check.
    pub countdown_tick: Duration,
}

impl From<&LicensePolicy> for WatcherConfig {
    fn from(policy: &LicensePolicy) -> Self {
        Self {
            poll_interval: policy.poll_interval(),
            offline_grace: policy.offline_grace(),
            request_timeout: policy.request_timeout(),
            countdown_tick: Duration::from_secs(1),
        }
    }
}

impl From<LicensePolicy> for WatcherConfig {
    fn from(policy: LicensePolicy) -> Self {
        Self::from(&policy)
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self::from(&LicensePolicy::default())
    }
}

/// Why the register is locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockReason {
    /// The operator paused the trial.
    Paused,
    /// The trial ran out.
    Expired,
    /// The authority was unreachable for longer than the grace period.
    Offline,
    /// The machine has neither a trial nor an activation.
    Unlicensed,
}

impl LockReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paused => "paused",
            Self::Expired => "expired",
            Self::Offline => "offline",
            Self::Unlicensed => "unlicensed",
        }
    }
}

impl fmt::Display for LockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the UI should currently show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// Nothing known yet.
    Unknown,
    /// Trial running until `expires_at`.
    Unlocked { expires_at: DateTime<Utc> },
    /// Permanently activated.
    Licensed,
    Locked(LockReason),
}

impl LockState {
    /// Classifies an authority response as seen at `now`.
    #[must_use]
    pub fn from_status(status: &LicenseStatusResponse, now: DateTime<Utc>) -> Self {
        if status.activated {
            return Self::Licensed;
        }
        match &status.trial {
            None => Self::Locked(LockReason::Unlicensed),
            Some(trial) => match trial.status {
                TrialStatus::Active if trial.expires_at > now => Self::Unlocked {
                    expires_at: trial.expires_at,
                },
                TrialStatus::Active | TrialStatus::Expired => Self::Locked(LockReason::Expired),
                TrialStatus::Paused => Self::Locked(LockReason::Paused),
            },
        }
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked(_))
    }

    fn event(self) -> Option<WatcherEvent> {
        match self {
            Self::Unknown => None,
            Self::Unlocked { expires_at } => Some(WatcherEvent::Active { expires_at }),
            Self::Licensed => Some(WatcherEvent::Licensed),
            Self::Locked(reason) => Some(WatcherEvent::Locked(reason)),
        }
    }
}

/// Status change published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherEvent {
    Active { expires_at: DateTime<Utc> },
    Licensed,
    Locked(LockReason),
    /// Seconds left before an offline lock.
    Countdown { remaining_secs: u64 },
    /// The authority answered again after one or more failures.
    OnlineRestored,
}

/// Local network transition reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkChange {
    Online,
    Offline,
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

/// Pure watcher state machine.
#[derive(Debug)]
pub struct WatcherCore {
    state: LockState,
    grace: Duration,
    offline_deadline: Option<Instant>,
    failing: bool,
    /// Set only by an authority answer reporting an activation.
    confirmed_licensed: bool,
}

impl WatcherCore {
    #[must_use]
    pub fn new(grace: Duration) -> Self {
        Self {
            state: LockState::Unknown,
            grace,
            offline_deadline: None,
            failing: false,
            confirmed_licensed: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> LockState {
        self.state
    }

    /// Time left on the offline countdown, if one is running.
    #[must_use]
    pub fn countdown_remaining(&self, now: Instant) -> Option<Duration> {
        self.offline_deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// True once the authority itself has reported an activation. Polling
    /// stops only then; a cached activation is never enough.
    #[must_use]
    pub fn is_confirmed_licensed(&self) -> bool {
        self.confirmed_licensed
    }

    /// Adopts a previously cached status without publishing anything.
    ///
    /// The seeded state is for display until the authority answers; it
    /// never stops polling.
    pub fn seed(&mut self, status: &LicenseStatusResponse, now: DateTime<Utc>) {
        self.state = LockState::from_status(status, now);
    }

    /// The authority answered.
    pub fn on_fetch_ok(&mut self, status: &LicenseStatusResponse, now: DateTime<Utc>) -> Vec<WatcherEvent> {
        let mut events = Vec::new();
        if self.failing {
            self.failing = false;
            self.offline_deadline = None;
            events.push(WatcherEvent::OnlineRestored);
        }
        let next = LockState::from_status(status, now);
        self.confirmed_licensed = next == LockState::Licensed;
        self.transition(next, &mut events);
        events
    }

    /// The authority could not be reached in time.
    pub fn on_fetch_err(&mut self, now: Instant) -> Vec<WatcherEvent> {
        self.failing = true;
        let mut events = Vec::new();
        if self.offline_deadline.is_none() && self.counts_down() {
            self.offline_deadline = Some(now + self.grace);
            events.push(WatcherEvent::Countdown {
                remaining_secs: ceil_secs(self.grace),
            });
        }
        events
    }

    /// Advances the countdown and checks the last known expiry.
    pub fn on_tick(&mut self, now: Instant, wall: DateTime<Utc>) -> Vec<WatcherEvent> {
        let mut events = Vec::new();
        if let LockState::Unlocked { expires_at } = self.state {
            if expires_at <= wall {
                self.transition(LockState::Locked(LockReason::Expired), &mut events);
                return events;
            }
        }
        if let Some(deadline) = self.offline_deadline {
            if now >= deadline {
                self.transition(LockState::Locked(LockReason::Offline), &mut events);
            } else {
                events.push(WatcherEvent::Countdown {
                    remaining_secs: ceil_secs(deadline - now),
                });
            }
        }
        events
    }

    // Only a register that is (or may be) unlocked has anything to lose
    // by going offline. A cached activation counts until confirmed.
    fn counts_down(&self) -> bool {
        match self.state {
            LockState::Unknown | LockState::Unlocked { .. } => true,
            LockState::Licensed => !self.confirmed_licensed,
            LockState::Locked(_) => false,
        }
    }

    fn transition(&mut self, next: LockState, events: &mut Vec<WatcherEvent>) {
        if next == self.state {
            return;
        }
        self.state = next;
        if !self.counts_down() {
            self.offline_deadline = None;
        }
        if let Some(event) = next.event() {
            events.push(event);
        }
    }
}

#[derive(Debug)]
enum Command {
    Network(NetworkChange),
    Refresh,
    Shutdown,
}

type FetchResult = LicenseResult<LicenseStatusResponse>;

/// Builder for the background watcher task.
pub struct OfflineWatcher {
    machine_id: MachineId,
    client: Arc<dyn AuthorityClient>,
    clock: Arc<dyn Clock>,
    config: WatcherConfig,
    cache: Option<StatusCache>,
}

impl OfflineWatcher {
    pub fn new(machine_id: MachineId, client: Arc<dyn AuthorityClient>, config: WatcherConfig) -> Self {
        Self {
            machine_id,
            client,
            clock: Arc::new(SystemClock),
            config,
            cache: None,
        }
    }

    /// Replaces the wall clock used for expiry checks.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Seeds the initial state from, and persists fetched status to, `cache`.
    #[must_use]
    pub fn with_cache(mut self, cache: StatusCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Starts the watcher on the current tokio runtime.
    pub fn spawn(self) -> WatcherHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (state_tx, state_rx) = watch::channel(LockState::Unknown);
        let task = tokio::spawn(self.run(command_rx, event_tx.clone(), state_tx));
        WatcherHandle {
            commands: command_tx,
            events: event_tx,
            state: state_rx,
            task: Some(task),
        }
    }

    async fn run(
        self,
        mut commands: mpsc::Receiver<Command>,
        events: broadcast::Sender<WatcherEvent>,
        state: watch::Sender<LockState>,
    ) {
        let mut core = WatcherCore::new(self.config.offline_grace);
        self.seed_from_cache(&mut core).await;
        publish(&events, &state, &core, Vec::new());

        let (result_tx, mut results) = mpsc::channel::<FetchResult>(1);
        let mut in_flight: Option<JoinHandle<()>> = None;

        let mut poll = tokio::time::interval(self.config.poll_interval.max(MIN_PERIOD));
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticker = tokio::time::interval(self.config.countdown_tick.max(MIN_PERIOD));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(machine_id = %self.machine_id, "license watcher started");

        loop {
            let emitted = tokio::select! {
                _ = poll.tick(), if !core.is_confirmed_licensed() => {
                    self.start_fetch(&core, &mut in_flight, &result_tx);
                    Vec::new()
                }
                _ = ticker.tick() => core.on_tick(Instant::now(), self.clock.now()),
                Some(result) = results.recv() => {
                    in_flight = None;
                    self.handle_result(&mut core, result).await
                }
                command = commands.recv() => match command {
                    Some(Command::Network(change)) => {
                        info!(?change, "network change, refreshing license status");
                        self.start_fetch(&core, &mut in_flight, &result_tx);
                        Vec::new()
                    }
                    Some(Command::Refresh) => {
                        self.start_fetch(&core, &mut in_flight, &result_tx);
                        Vec::new()
                    }
                    Some(Command::Shutdown) | None => break,
                },
            };
            publish(&events, &state, &core, emitted);
        }

        if let Some(task) = in_flight.take() {
            task.abort();
        }
        info!(machine_id = %self.machine_id, "license watcher stopped");
    }

    async fn seed_from_cache(&self, core: &mut WatcherCore) {
        let Some(cache) = &self.cache else {
            return;
        };
        match cache.load(&self.machine_id).await {
            Ok(Some(cached)) => {
                core.seed(&cached.status, self.clock.now());
                debug!(fetched_at = %cached.fetched_at, state = ?core.state(), "seeded from status cache");
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "ignoring unreadable status cache"),
        }
    }

    /// Starts a status request unless one is already running.
    fn start_fetch(
        &self,
        core: &WatcherCore,
        in_flight: &mut Option<JoinHandle<()>>,
        results: &mpsc::Sender<FetchResult>,
    ) {
        if core.is_confirmed_licensed() {
            return;
        }
        if in_flight.is_some() {
            debug!("status request already in flight, skipping");
            return;
        }
        let client = Arc::clone(&self.client);
        let machine_id = self.machine_id.clone();
        let timeout = self.config.request_timeout;
        let results = results.clone();
        *in_flight = Some(tokio::spawn(async move {
            // The request runs in its own task so that a panicking client
            // still produces a result and frees the in-flight slot.
            let mut request = AbortOnDrop(tokio::spawn(async move {
                tokio::time::timeout(timeout, client.fetch_status(&machine_id)).await
            }));
            let result = match (&mut request.0).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(LicenseError::Unreachable(format!(
                    "no response within {}s",
                    timeout.as_secs()
                ))),
                Err(e) => {
                    warn!(error = %e, "status request task failed");
                    Err(LicenseError::Unreachable(format!("status request failed: {e}")))
                }
            };
            let _ = results.send(result).await;
        }));
    }

    async fn handle_result(&self, core: &mut WatcherCore, result: FetchResult) -> Vec<WatcherEvent> {
        match result {
            Ok(status) => {
                let now = self.clock.now();
                let emitted = core.on_fetch_ok(&status, now);
                if let Some(cache) = &self.cache {
                    let cached = CachedStatus {
                        status,
                        fetched_at: now,
                    };
                    if let Err(e) = cache.store(&cached).await {
                        warn!(error = %e, "failed to write status cache");
                    }
                }
                emitted
            }
            Err(e) => {
                warn!(machine_id = %self.machine_id, error = %e, "license status fetch failed");
                core.on_fetch_err(Instant::now())
            }
        }
    }
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn publish(
    events: &broadcast::Sender<WatcherEvent>,
    state: &watch::Sender<LockState>,
    core: &WatcherCore,
    emitted: Vec<WatcherEvent>,
) {
    let current = core.state();
    state.send_if_modified(|published| {
        if *published == current {
            false
        } else {
            *published = current;
            true
        }
    });
    for event in emitted {
        match &event {
            WatcherEvent::Locked(reason) => info!(%reason, "register locked"),
            WatcherEvent::OnlineRestored => info!("authority reachable again"),
            other => debug!(event = ?other, "watcher event"),
        }
        // No subscribers is fine.
        let _ = events.send(event);
    }
}

/// Control side of a running watcher.
///
/// Dropping the handle stops the watcher.
#[derive(Debug)]
pub struct WatcherHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<WatcherEvent>,
    state: watch::Receiver<LockState>,
    task: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    /// Subscribes to status events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<WatcherEvent> {
        self.events.subscribe()
    }

    /// Latest state.
    #[must_use]
    pub fn state(&self) -> LockState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<LockState> {
        self.state.clone()
    }

    /// Reports a network transition; triggers an immediate fetch.
    pub async fn network_changed(&self, change: NetworkChange) {
        self.send(Command::Network(change)).await;
    }

    /// Asks for an immediate fetch.
    pub async fn refresh(&self) {
        self.send(Command::Refresh).await;
    }

    /// Stops the watcher and waits for it to finish.
    pub async fn shutdown(mut self) {
        self.send(Command::Shutdown).await;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    async fn send(&self, command: Command) {
        if self.commands.send(command).await.is_err() {
            debug!("license watcher already stopped");
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
