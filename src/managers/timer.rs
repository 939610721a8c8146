//! Backup scheduling
//!
//! Three mutually exclusive modes:
//! - once: run the action a single time and return its result
//! - interval: first run at `begin` (`HHMM` local time, or `+M` minutes from
//!   start), then every `frequency` minutes
//! - cron: run at each time matched by a cron expression
//!
//! The scheduler only decides *when*. Time comes from a [`Clock`] so the loop
//! can be driven deterministically in tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
use cron::Schedule;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const DEFAULT_BEGIN: &str = "+0";
pub const DEFAULT_FREQUENCY_MINUTES: u64 = 1440;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimerError {
    #[error("conflicting timer options: {0}")]
    ConflictingModes(String),

    #[error("invalid begin '{0}': expected HHMM or +<minutes>")]
    InvalidBegin(String),

    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("frequency must be at least one minute")]
    InvalidFrequency,
}

/// Timer settings as given by the operator, before validation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerOptions {
    pub once: bool,
    pub cron: Option<String>,
    pub begin: Option<String>,
    pub frequency: Option<u64>,
}

/// When an interval schedule fires for the first time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Begin {
    /// Next occurrence of this local wall-clock time
    Absolute { hour: u32, minute: u32 },
    /// This many minutes after the scheduler starts
    Relative(u64),
}

impl FromStr for Begin {
    type Err = TimerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TimerError::InvalidBegin(s.to_string());

        if let Some(minutes) = s.strip_prefix('+') {
            if minutes.is_empty() || !minutes.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            return minutes.parse().map(Begin::Relative).map_err(|_| invalid());
        }

        if s.len() != 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let hour: u32 = s[..2].parse().map_err(|_| invalid())?;
        let minute: u32 = s[2..].parse().map_err(|_| invalid())?;
        if hour > 23 || minute > 59 {
            return Err(invalid());
        }
        Ok(Begin::Absolute { hour, minute })
    }
}

impl fmt::Display for Begin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Begin::Absolute { hour, minute } => write!(f, "{:02}{:02}", hour, minute),
            Begin::Relative(minutes) => write!(f, "+{}", minutes),
        }
    }
}

#[derive(Debug, Clone)]
pub enum TimerConfig {
    Once,
    Interval {
        begin: Begin,
        frequency_minutes: u64,
    },
    Cron {
        expression: String,
        schedule: Schedule,
    },
}

impl TimerConfig {
    /// Validate raw options into exactly one timer mode
    ///
    /// Exclusivity is judged on what was explicitly set; defaults for
    /// `begin` and `frequency` are applied afterwards.
    pub fn from_options(options: &TimerOptions) -> Result<Self, TimerError> {
        let interval = options.begin.is_some() || options.frequency.is_some();
        let mut modes = Vec::new();
        if options.once {
            modes.push("once");
        }
        if options.cron.is_some() {
            modes.push("cron");
        }
        if interval {
            modes.push("begin/frequency");
        }
        if modes.len() > 1 {
            return Err(TimerError::ConflictingModes(format!(
                "{} cannot be combined",
                modes.join(", ")
            )));
        }

        if options.once {
            return Ok(TimerConfig::Once);
        }

        if let Some(expression) = &options.cron {
            return Ok(TimerConfig::Cron {
                expression: expression.clone(),
                schedule: parse_cron(expression)?,
            });
        }

        let begin = options.begin.as_deref().unwrap_or(DEFAULT_BEGIN).parse()?;
        let frequency_minutes = options.frequency.unwrap_or(DEFAULT_FREQUENCY_MINUTES);
        if frequency_minutes == 0 {
            return Err(TimerError::InvalidFrequency);
        }
        Ok(TimerConfig::Interval {
            begin,
            frequency_minutes,
        })
    }

    pub fn is_once(&self) -> bool {
        matches!(self, TimerConfig::Once)
    }
}

impl fmt::Display for TimerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerConfig::Once => write!(f, "once"),
            TimerConfig::Interval {
                begin,
                frequency_minutes,
            } => write!(f, "every {} minutes, beginning {}", frequency_minutes, begin),
            TimerConfig::Cron { expression, .. } => write!(f, "cron '{}'", expression),
        }
    }
}

/// Parse a cron expression, accepting the classic five-field form
///
/// Five-field expressions get a zero seconds field. In every form the
/// day-of-week numbers (0-7, Sunday = 0 or 7) are shifted to the 1-7
/// (Sunday = 1) range the parser expects.
pub fn parse_cron(expression: &str) -> Result<Schedule, TimerError> {
    let mut fields: Vec<String> = expression.split_whitespace().map(str::to_string).collect();
    if fields.len() == 5 {
        fields.insert(0, "0".to_string());
    }
    if let Some(day_of_week) = fields.get_mut(5) {
        *day_of_week = shift_day_of_week(day_of_week);
    }

    Schedule::from_str(&fields.join(" ")).map_err(|e| TimerError::InvalidCron {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

fn shift_day_of_week(field: &str) -> String {
    fn flush(digits: &mut String, out: &mut String, after_step: bool) {
        if digits.is_empty() {
            return;
        }
        match (after_step, digits.parse::<u32>()) {
            (false, Ok(day)) if day <= 7 => out.push_str(&((day % 7) + 1).to_string()),
            _ => out.push_str(digits),
        }
        digits.clear();
    }

    let mut out = String::with_capacity(field.len());
    let mut digits = String::new();
    // Numbers after '/' are step sizes, not days
    let mut after_step = false;

    for c in field.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else {
            flush(&mut digits, &mut out, after_step);
            after_step = c == '/';
            out.push(c);
        }
    }
    flush(&mut digits, &mut out, after_step);
    out
}

fn local_occurrence<Tz: TimeZone>(
    tz: &Tz,
    date: NaiveDate,
    hour: u32,
    minute: u32,
) -> Option<DateTime<Tz>> {
    let naive = date.and_hms_opt(hour, minute, 0)?;
    tz.from_local_datetime(&naive).earliest()
}

/// First fire time of an interval schedule started at `now`
///
/// An absolute begin time is taken in `now`'s timezone: today if it has not
/// yet passed, otherwise tomorrow.
pub fn first_fire<Tz: TimeZone>(begin: Begin, now: &DateTime<Tz>) -> DateTime<Utc> {
    match begin {
        Begin::Relative(minutes) => {
            let offset = i64::try_from(minutes)
                .ok()
                .and_then(Duration::try_minutes)
                .unwrap_or(Duration::MAX);
            now.with_timezone(&Utc)
                .checked_add_signed(offset)
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        }
        Begin::Absolute { hour, minute } => {
            let tz = now.timezone();
            let today = now.date_naive();
            let candidate = local_occurrence(&tz, today, hour, minute)
                .filter(|t| t >= now)
                .or_else(|| {
                    today
                        .succ_opt()
                        .and_then(|tomorrow| local_occurrence(&tz, tomorrow, hour, minute))
                });
            candidate
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|| now.with_timezone(&Utc))
        }
    }
}

/// Next interval slot after the one that fired at `last_slot`
///
/// If one or more slots were missed while the action ran, the latest missed
/// slot is returned so it fires immediately, once; later slots keep the
/// original cadence.
pub fn next_interval_fire(
    last_slot: DateTime<Utc>,
    frequency: Duration,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let next = last_slot + frequency;
    if next > now {
        return next;
    }
    let step = frequency.num_seconds().max(1);
    let missed = (now - last_slot).num_seconds() / step;
    last_slot + Duration::seconds(step * missed)
}

/// Next time `schedule` matches strictly after `now`, evaluated in `now`'s
/// timezone
pub fn next_cron<Tz: TimeZone>(schedule: &Schedule, now: &DateTime<Tz>) -> Option<DateTime<Utc>> {
    schedule.after(now).next().map(|t| t.with_timezone(&Utc))
}

/// Source of time for the scheduler
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Suspend until `deadline`; returns immediately if it has passed
    async fn sleep_until(&self, deadline: DateTime<Utc>);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep_until(&self, deadline: DateTime<Utc>) {
        // Wall-clock deadline converted once to a monotonic sleep
        if let Ok(wait) = (deadline - Utc::now()).to_std() {
            tokio::time::sleep(wait).await;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Waiting,
    Running,
    Terminated,
}

pub struct Scheduler {
    config: TimerConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    pub fn new(config: TimerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: TimerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(SchedulerState::Idle),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: SchedulerState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Wait for `deadline` unless cancelled first. Returns false on cancel.
    async fn wait(&self, deadline: DateTime<Utc>, cancel: &CancellationToken) -> bool {
        self.set_state(SchedulerState::Waiting);
        info!("Next run at {}", deadline.with_timezone(&Local).to_rfc3339());
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = self.clock.sleep_until(deadline) => true,
        }
    }

    async fn fire<F, Fut>(&self, action: &mut F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.set_state(SchedulerState::Running);
        if let Err(e) = action().await {
            error!("Scheduled run failed: {:#}", e);
        }
    }

    /// Drive `action` according to the timer configuration
    ///
    /// In once mode the action's result is returned. Repeating modes log
    /// action failures and keep going until `cancel` fires; cancellation
    /// is only observed between runs, never during one.
    pub async fn run<F, Fut>(&self, mut action: F, cancel: CancellationToken) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        match &self.config {
            TimerConfig::Once => {
                self.set_state(SchedulerState::Running);
                let result = action().await;
                self.set_state(SchedulerState::Terminated);
                return result;
            }
            TimerConfig::Interval {
                begin,
                frequency_minutes,
            } => {
                let frequency = i64::try_from(*frequency_minutes)
                    .ok()
                    .and_then(Duration::try_minutes)
                    .ok_or(TimerError::InvalidFrequency)?;
                let mut slot = first_fire(*begin, &self.clock.now().with_timezone(&Local));

                while self.wait(slot, &cancel).await {
                    self.fire(&mut action).await;
                    if cancel.is_cancelled() {
                        break;
                    }
                    slot = next_interval_fire(slot, frequency, self.clock.now());
                }
            }
            TimerConfig::Cron {
                expression,
                schedule,
            } => loop {
                let now = self.clock.now().with_timezone(&Local);
                let Some(next) = next_cron(schedule, &now) else {
                    warn!("Cron expression '{}' has no future matches", expression);
                    break;
                };
                if !self.wait(next, &cancel).await {
                    break;
                }
                self.fire(&mut action).await;
                if cancel.is_cancelled() {
                    break;
                }
            },
        }

        info!("Scheduler stopped");
        self.set_state(SchedulerState::Terminated);
        Ok(())
    }
}

/// Manually driven clock for tests
/// Available for use in external test crates
pub mod mock {
    use super::*;

    #[derive(Debug)]
    pub struct ManualClock {
        now: Mutex<DateTime<Utc>>,
        sleeps: Mutex<Vec<DateTime<Utc>>>,
    }

    impl ManualClock {
        pub fn new(start: DateTime<Utc>) -> Self {
            Self {
                now: Mutex::new(start),
                sleeps: Mutex::new(Vec::new()),
            }
        }

        pub fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += by;
        }

        /// Deadlines passed to `sleep_until`, in call order
        pub fn sleeps(&self) -> Vec<DateTime<Utc>> {
            self.sleeps.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }

        async fn sleep_until(&self, deadline: DateTime<Utc>) {
            self.sleeps.lock().unwrap().push(deadline);
            let mut now = self.now.lock().unwrap();
            if deadline > *now {
                *now = deadline;
            }
        }
    }
}
