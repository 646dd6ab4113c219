use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tilefall_engine::{
    DrawSink, EntityId, FixedStepLoop, LoopStatsAccumulator, StepConfig, Vec2,
};
use tracing::{debug, info, warn};

use crate::combat::engage;
use crate::combat::unit::{CombatUnit, EquipSlot, UnitPreset};
use crate::combat::AttackOutcome;
use crate::net::transport::{AuthorityTransport, TransportError};
use crate::net::wire::{
    attack_selected_event, buy_item_event, chat_event, deploy_event, recall_event, DeleteEvent,
    EventId, PurchaseRecord,
};
use crate::reconcile::{self, Reconciler};
use crate::world::{topic, BusEvent, HeroProfile, World};

/// Poll pacing: a fixed wall-clock interval while healthy, exponential
/// backoff (capped) after failures. A failed poll logs and contributes
/// nothing that cycle; there is no user-facing error surface.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub interval: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
        }
    }
}

pub fn backoff_delay(policy: &PollPolicy, consecutive_failures: u32) -> Duration {
    if consecutive_failures == 0 {
        return policy.interval;
    }
    let exponent = consecutive_failures.saturating_sub(1).min(16);
    policy
        .backoff_base
        .saturating_mul(1u32 << exponent)
        .min(policy.backoff_max)
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub profile: HeroProfile,
    pub seed: u64,
    pub step: StepConfig,
    pub poll: PollPolicy,
    pub stats_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            profile: HeroProfile {
                hero_id: 1,
                name: "wanderer".to_string(),
                map: "outskirts".to_string(),
                speed: 2.5,
            },
            seed: 7,
            step: StepConfig::default(),
            poll: PollPolicy::default(),
            stats_interval: Duration::from_secs(5),
        }
    }
}

/// One client session: the world, the fixed-step loop, and the poll driver,
/// all advanced from the host's frame callback on a single thread. The two
/// mutation sources (frame steps and poll application) interleave here;
/// a poll response always applies to completion between steps.
pub struct Session<T: AuthorityTransport> {
    world: World,
    reconciler: Reconciler,
    transport: T,
    step_loop: FixedStepLoop,
    poll_policy: PollPolicy,
    next_poll_at: Option<Instant>,
    poll_outstanding: bool,
    consecutive_poll_failures: u32,
    stats: LoopStatsAccumulator,
    last_frame_at: Option<Instant>,
    live: bool,
}

impl<T: AuthorityTransport> Session<T> {
    pub fn new(config: SessionConfig, transport: T) -> Self {
        let mut step_loop = FixedStepLoop::new(config.step);
        step_loop.start();
        Self {
            world: World::new(config.profile, config.seed),
            reconciler: Reconciler::new(),
            transport,
            step_loop,
            poll_policy: config.poll,
            next_poll_at: None,
            poll_outstanding: false,
            consecutive_poll_failures: 0,
            stats: LoopStatsAccumulator::new(config.stats_interval),
            last_frame_at: None,
            live: true,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    /// One host frame: pump the poll driver, run the planned fixed steps,
    /// draw exactly once.
    pub fn on_host_frame(&mut self, now: Instant, sink: &mut dyn DrawSink) {
        if !self.live {
            return;
        }

        self.pump_poll(now);

        let plan = self.step_loop.frame(now);
        let fixed_dt = self.step_loop.fixed_dt();
        for _ in 0..plan.steps_to_run {
            self.world.step(fixed_dt);
        }
        if plan.dropped_backlog > Duration::ZERO {
            warn!(
                dropped_backlog_ms = plan.dropped_backlog.as_millis() as u64,
                "step_backlog_dropped"
            );
        }

        self.world.scene.draw(sink);

        let frame_dt = self
            .last_frame_at
            .map(|previous| now.saturating_duration_since(previous))
            .unwrap_or(Duration::ZERO);
        self.last_frame_at = Some(now);
        self.stats.record_frame(frame_dt);
        self.stats.record_steps(plan.steps_to_run);
        if let Some(snapshot) = self.stats.maybe_snapshot(now) {
            info!(
                fps = snapshot.fps,
                sps = snapshot.sps,
                frame_time_ms = snapshot.frame_time_ms,
                polls_ok = snapshot.polls_ok,
                polls_failed = snapshot.polls_failed,
                entities = self.world.scene.len(),
                "loop_stats"
            );
        }
    }

    fn pump_poll(&mut self, now: Instant) {
        if self.poll_outstanding {
            match self.transport.poll_response() {
                Ok(Some(response)) => {
                    self.poll_outstanding = false;
                    self.consecutive_poll_failures = 0;
                    self.stats.record_poll(true);
                    let outcome = self.reconciler.apply_response(&mut self.world, &response);
                    debug!(
                        applied = outcome.applied,
                        duplicates = outcome.duplicates,
                        malformed = outcome.malformed,
                        unknown = outcome.unknown,
                        heroes_synced = outcome.heroes_synced,
                        chat_appended = outcome.chat_appended,
                        "poll_applied"
                    );
                    self.next_poll_at = Some(now + self.poll_policy.interval);
                }
                Ok(None) => {}
                Err(error) => {
                    self.poll_outstanding = false;
                    self.record_poll_failure(now, &error, "poll_failed");
                }
            }
            return;
        }

        let due = self.next_poll_at.map_or(true, |at| now >= at);
        if !due {
            return;
        }
        let request = self.world.local_summary();
        match self.transport.begin_poll(&request) {
            Ok(()) => self.poll_outstanding = true,
            Err(error) => self.record_poll_failure(now, &error, "poll_start_failed"),
        }
    }

    fn record_poll_failure(&mut self, now: Instant, error: &TransportError, message: &'static str) {
        self.consecutive_poll_failures = self.consecutive_poll_failures.saturating_add(1);
        self.stats.record_poll(false);
        let delay = backoff_delay(&self.poll_policy, self.consecutive_poll_failures);
        warn!(
            error = %error,
            failures = self.consecutive_poll_failures,
            retry_in_ms = delay.as_millis() as u64,
            "{message}"
        );
        self.next_poll_at = Some(now + delay);
    }

    /// Appends the message locally right away and submits it; the
    /// authority's echo is filtered by the transcript.
    pub fn send_chat(&mut self, text: &str) -> Result<(), TransportError> {
        let timestamp_ms = epoch_millis();
        let hero_id = self.world.local.hero_id;
        let name = self.world.local.name.clone();
        let map = self.world.local.map.clone();
        self.world
            .transcript
            .append_local(hero_id, &name, text, timestamp_ms);
        self.transport
            .submit_event(&chat_event(hero_id, &map, timestamp_ms, text))
    }

    /// Deploys a locally owned unit next to the hero and announces it.
    pub fn deploy_unit(
        &mut self,
        preset_name: &str,
        position: Vec2,
    ) -> Result<Option<EntityId>, TransportError> {
        let Some(preset) = UnitPreset::by_name(preset_name) else {
            return Ok(None);
        };
        let hero_id = self.world.local.hero_id;
        let remote_id = self.world.alloc_ephemeral_remote_id();
        let mut unit = CombatUnit::from_preset(remote_id, Some(hero_id), &preset);
        unit.enemy = false;

        let hero_entity = self.world.local_hero_entity();
        let hero_absolute = self
            .world
            .scene
            .absolute_position(hero_entity)
            .unwrap_or_default();
        let local_position = Vec2::new(position.x - hero_absolute.x, position.y - hero_absolute.y);
        let entity = match self.world.spawn_unit(hero_entity, local_position, unit) {
            Ok(entity) => entity,
            Err(error) => {
                warn!(error = %error, "deploy_spawn_failed");
                return Ok(None);
            }
        };
        self.world.publish(
            topic::UNIT_DEPLOYED,
            &BusEvent::UnitDeployed {
                entity,
                remote_id,
                owner: Some(hero_id),
            },
        );

        if let Some(record) = self.world.unit_record(entity) {
            let map = self.world.local.map.clone();
            self.transport
                .submit_event(&deploy_event(hero_id, &map, epoch_millis(), &record))?;
        }
        Ok(Some(entity))
    }

    pub fn recall_unit(&mut self, entity: EntityId) -> Result<bool, TransportError> {
        let Some(unit) = self.world.units.get(&entity) else {
            return Ok(false);
        };
        let remote_id = unit.remote_id;
        let hero_id = self.world.local.hero_id;
        let removed = reconcile::recall_unit(&mut self.world, remote_id);
        if removed {
            let map = self.world.local.map.clone();
            self.transport
                .submit_event(&recall_event(hero_id, &map, epoch_millis(), remote_id))?;
        }
        Ok(removed)
    }

    /// Player-initiated attack with an explicit slot; resolves through the
    /// same combat path as autonomous attacks, then announces the choice.
    pub fn attack_with(
        &mut self,
        entity: EntityId,
        slot: EquipSlot,
    ) -> Result<AttackOutcome, TransportError> {
        let Some(unit) = self.world.units.get(&entity) else {
            return Ok(AttackOutcome::NoTarget);
        };
        let remote_id = unit.remote_id;
        let outcome = engage::try_attack(&mut self.world, entity, Some(slot));
        if matches!(
            outcome,
            AttackOutcome::Hit { .. } | AttackOutcome::Destroyed { .. }
        ) {
            let hero_id = self.world.local.hero_id;
            let map = self.world.local.map.clone();
            self.transport.submit_event(&attack_selected_event(
                hero_id,
                &map,
                epoch_millis(),
                remote_id,
                slot,
            ))?;
        }
        Ok(outcome)
    }

    pub fn request_purchase(&mut self, purchase: &PurchaseRecord) -> Result<(), TransportError> {
        let hero_id = self.world.local.hero_id;
        let map = self.world.local.map.clone();
        self.transport
            .submit_event(&buy_item_event(hero_id, &map, epoch_millis(), purchase))
    }

    pub fn confirm_party_invite(&mut self) -> bool {
        if !self.world.party.confirm_pending() {
            return false;
        }
        let member_count = self.world.party.members().len();
        self.world.publish(
            topic::PARTY_CHANGED,
            &BusEvent::PartyChanged { member_count },
        );
        true
    }

    pub fn decline_party_invite(&mut self) -> bool {
        self.world.party.decline_pending()
    }

    pub fn retract_event(&mut self, event_id: EventId) -> Result<(), TransportError> {
        self.transport.delete_event(&DeleteEvent { event_id })
    }

    /// Idempotent. Marks the session dead so a poll response that arrives
    /// afterwards is defensively ignored, stops the loop, and recursively
    /// destroys the scene graph, cascading subscription removal.
    pub fn teardown(&mut self) {
        if !self.live {
            return;
        }
        self.live = false;
        self.step_loop.stop();
        self.next_poll_at = None;
        self.poll_outstanding = false;
        self.world.teardown();
        info!("session_teardown");
    }
}

pub fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}
