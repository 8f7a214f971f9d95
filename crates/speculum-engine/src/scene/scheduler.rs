use std::time::{Duration, Instant};

/// Target draw rate when none is configured.
pub const DEFAULT_FRAME_RATE: u32 = 60;

/// How the frame-rate ceiling is measured.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum ThrottlePolicy {
    /// Draws are due on a fixed cadence; the next due time advances by one
    /// interval per draw and resynchronises after a stall (no catch-up bursts).
    #[default]
    FixedCadence,
    /// A draw is due once one interval has passed since the previous draw finished.
    SinceLastDraw,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SchedulerState {
    Idle,
    Animating,
}

/// Outcome of one host frame callback.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TickDecision {
    /// Run the draw callback now.
    Draw { first_render: bool },
    /// Under the frame-rate ceiling; the request stays pending.
    Throttled,
    /// A draw is still executing.
    Busy,
    /// Nothing requested.
    Idle,
}

/// Animation state machine driven by the host's frame callback.
///
/// The host calls [`poll`](Self::poll) once per presentation opportunity and, on
/// [`TickDecision::Draw`], runs the draw and reports back with
/// [`finish`](Self::finish). While animating, every finished draw re-requests the
/// next frame. Stopping drops the pending request.
#[derive(Debug, Clone)]
pub struct FrameScheduler {
    state: SchedulerState,
    policy: ThrottlePolicy,
    interval: Duration,

    pending: bool,
    in_draw: bool,

    first_draw: Option<Instant>,
    last_draw: Option<Instant>,
    next_due: Option<Instant>,
    frames: u64,
}

impl FrameScheduler {
    /// `frame_rate` is clamped to at least 1 Hz.
    pub fn new(frame_rate: u32, policy: ThrottlePolicy) -> Self {
        Self {
            state: SchedulerState::Idle,
            policy,
            interval: Duration::from_nanos(1_000_000_000 / u64::from(frame_rate.max(1))),
            pending: false,
            in_draw: false,
            first_draw: None,
            last_draw: None,
            next_due: None,
            frames: 0,
        }
    }

    #[inline]
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    #[inline]
    pub fn is_animating(&self) -> bool {
        self.state == SchedulerState::Animating
    }

    /// Minimum time between two draws.
    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the host should deliver a frame callback.
    #[inline]
    pub fn frame_requested(&self) -> bool {
        self.pending
    }

    /// Number of draws finished so far.
    #[inline]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn start(&mut self) {
        self.state = SchedulerState::Animating;
        self.pending = true;
    }

    /// Enters idle and cancels the pending frame request.
    pub fn stop(&mut self) {
        self.state = SchedulerState::Idle;
        self.pending = false;
    }

    /// Flips between idle and animating; returns `true` when now animating.
    pub fn toggle(&mut self) -> bool {
        match self.state {
            SchedulerState::Idle => self.start(),
            SchedulerState::Animating => self.stop(),
        }
        self.is_animating()
    }

    /// Host frame callback.
    pub fn poll(&mut self, now: Instant) -> TickDecision {
        if self.in_draw {
            return TickDecision::Busy;
        }
        if !self.pending {
            return TickDecision::Idle;
        }
        if self.throttled(now) {
            return TickDecision::Throttled;
        }
        self.begin(now)
    }

    /// Starts a draw immediately, ignoring the frame-rate ceiling.
    ///
    /// Still refuses while another draw is executing.
    pub fn poll_immediate(&mut self, now: Instant) -> TickDecision {
        if self.in_draw {
            return TickDecision::Busy;
        }
        self.begin(now)
    }

    /// Reports the end of the draw started by the last `Draw` decision.
    pub fn finish(&mut self, now: Instant) {
        if !self.in_draw {
            log::warn!("frame scheduler: finish() without a draw in progress");
            return;
        }
        self.in_draw = false;
        self.last_draw = Some(now);
        self.frames += 1;
        self.pending = self.is_animating();
    }

    /// Time since the first draw started; zero before it.
    pub fn since_first_draw(&self, now: Instant) -> Duration {
        self.first_draw
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or_default()
    }

    fn throttled(&self, now: Instant) -> bool {
        match self.policy {
            ThrottlePolicy::FixedCadence => self.next_due.is_some_and(|due| now < due),
            ThrottlePolicy::SinceLastDraw => self
                .last_draw
                .is_some_and(|last| now.saturating_duration_since(last) < self.interval),
        }
    }

    fn begin(&mut self, now: Instant) -> TickDecision {
        self.in_draw = true;
        self.pending = false;

        let first_render = self.first_draw.is_none();
        if first_render {
            self.first_draw = Some(now);
        }

        let mut due = self
            .next_due
            .map_or(now + self.interval, |d| d + self.interval);
        if due <= now {
            due = now + self.interval;
        }
        self.next_due = Some(due);

        TickDecision::Draw { first_render }
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_RATE, ThrottlePolicy::default())
    }
}
