//! Admission decision engine.
//!
//! Orchestrates the config fetch, whitelist and schedule into one fail-closed
//! verdict per call.
//!
//! ## Evaluation Order
//!
//! 1. Fetch config - any failure or empty answer denies with `config_error`
//! 2. Empty caller denies with `error`
//! 3. Whitelisted caller is allowed, whatever the schedule says
//! 4. Schedule match allows (`within_hours`), otherwise deny (`outside_hours`)
//! 5. Anything else that goes wrong denies with `error`
//!
//! The engine never returns an error or panics outward: every path ends in a
//! [`Decision`], and each terminal state emits one log line.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigError, ConfigSource};
use crate::decision::{CallEvent, Decision, Reason};
use crate::dst::{IsraelDst, OffsetResolver};
use crate::schedule::{is_within_schedule, ScheduleError};

/// Failures that end an evaluation early.
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// Configuration could not be obtained.
    #[error("could not load configuration: {0}")]
    ConfigUnavailable(#[from] ConfigError),

    /// Caller identifier is empty.
    #[error("missing caller number")]
    InvalidCaller,

    /// Unexpected failure while evaluating.
    #[error("evaluation failed: {0}")]
    EvaluationFailure(String),
}

impl From<ScheduleError> for EvaluationError {
    fn from(err: ScheduleError) -> Self {
        EvaluationError::EvaluationFailure(err.to_string())
    }
}

impl EvaluationError {
    /// Reason reported for this failure.
    pub fn reason(&self) -> Reason {
        match self {
            EvaluationError::ConfigUnavailable(_) => Reason::ConfigError,
            EvaluationError::InvalidCaller | EvaluationError::EvaluationFailure(_) => Reason::Error,
        }
    }

    /// Builds the deny decision for this failure.
    pub fn into_decision(self, caller: &str, timestamp: DateTime<Utc>) -> Decision {
        let message = self.to_string();
        match self.reason() {
            Reason::ConfigError => Decision::config_error(caller, timestamp, message),
            _ => Decision::error(caller, timestamp, message),
        }
    }
}

/// Decides for one caller against a config snapshot.
///
/// This is the synchronous core of [`AdmissionEngine::evaluate`], usable once
/// configuration is in hand.
pub fn decide(
    config: &Config,
    caller: &str,
    now: DateTime<Utc>,
    resolver: &dyn OffsetResolver,
) -> Decision {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        try_decide(config, caller, now, resolver)
    }));

    let decision = match outcome {
        Ok(Ok(decision)) => decision,
        Ok(Err(err)) => err.into_decision(caller, now),
        Err(_) => EvaluationError::EvaluationFailure("unhandled panic".to_string())
            .into_decision(caller, now),
    };
    log_decision(&decision);
    decision
}

fn try_decide(
    config: &Config,
    caller: &str,
    now: DateTime<Utc>,
    resolver: &dyn OffsetResolver,
) -> Result<Decision, EvaluationError> {
    if caller.is_empty() {
        return Err(EvaluationError::InvalidCaller);
    }

    if config.is_whitelisted(caller) {
        return Ok(Decision::whitelisted(caller, now));
    }

    if let Some(problem) = config.schedule_problem() {
        return Err(EvaluationError::EvaluationFailure(format!(
            "unreadable schedule: {problem}"
        )));
    }

    let within = is_within_schedule(config.schedule.as_ref(), now, resolver)?;
    Ok(Decision::scheduled(
        within,
        caller,
        now,
        resolver.utc_offset_hours(now),
    ))
}

fn log_decision(decision: &Decision) {
    match decision.reason {
        Reason::Whitelist => info!(caller = %decision.caller, "Caller is whitelisted - allowing"),
        Reason::WithinHours => info!(
            caller = %decision.caller,
            offset_hours = ?decision.offset_hours,
            "Within allowed schedule - allowing"
        ),
        Reason::OutsideHours => info!(
            caller = %decision.caller,
            offset_hours = ?decision.offset_hours,
            "Outside allowed schedule - denying"
        ),
        Reason::ConfigError => warn!(
            caller = %decision.caller,
            message = ?decision.message,
            "Failed to load config - denying by default"
        ),
        Reason::Error => warn!(
            caller = %decision.caller,
            message = ?decision.message,
            "Evaluation failed - denying"
        ),
    }
}

/// Fail-closed gatekeeper for inbound calls.
///
/// Holds only immutable settings; share it behind an `Arc` across concurrent
/// evaluations.
pub struct AdmissionEngine<S> {
    source: S,
    resolver: Arc<dyn OffsetResolver>,
}

impl<S: ConfigSource> AdmissionEngine<S> {
    /// Creates an engine for the Israel timezone rule.
    pub fn new(source: S) -> Self {
        Self::with_resolver(source, Arc::new(IsraelDst))
    }

    /// Creates an engine with a custom offset resolver.
    pub fn with_resolver(source: S, resolver: Arc<dyn OffsetResolver>) -> Self {
        Self { source, resolver }
    }

    /// Evaluates one call. Never fails; errors become deny decisions.
    pub async fn evaluate(&self, event: &CallEvent) -> Decision {
        debug!(
            caller = %event.caller,
            at = %event.arrival.to_rfc3339(),
            source = %self.source.describe(),
            resolver = self.resolver.name(),
            "Evaluating call"
        );

        let config = match self.load_config().await {
            Ok(config) => config,
            Err(err) => {
                let decision = err.into_decision(&event.caller, event.arrival);
                log_decision(&decision);
                return decision;
            }
        };

        debug!(whitelisted = config.whitelist.len(), "Config loaded");
        decide(&config, &event.caller, event.arrival, self.resolver.as_ref())
    }

    async fn load_config(&self) -> Result<Config, EvaluationError> {
        let fetched = AssertUnwindSafe(self.source.fetch())
            .catch_unwind()
            .await
            .map_err(|_| ConfigError::SourcePanicked)?;

        fetched?.ok_or(EvaluationError::ConfigUnavailable(ConfigError::NotFound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticConfigSource;
    use crate::dst::ConstantOffset;
    use crate::remote::{RemoteConfigSettings, RemoteConfigSource};
    use crate::schedule::{Schedule, Window, ALL_DAYS, WORKWEEK};
    use async_trait::async_trait;
    use chrono::TimeZone;

    const CALLER: &str = "+972501234567";
    const FRIEND: &str = "+972509999999";

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    // 2025-06-11 is a Wednesday in the daylight period
    fn wednesday(hour: u32) -> DateTime<Utc> {
        utc(2025, 6, 11, hour)
    }

    fn config_with(schedule: Option<Schedule>) -> Config {
        Config::new(vec![FRIEND.to_string()], schedule)
    }

    fn engine(config: Config) -> AdmissionEngine<StaticConfigSource> {
        AdmissionEngine::new(StaticConfigSource::new(config))
    }

    /// Source that always fails to reach the store.
    struct FailingSource;

    #[async_trait]
    impl ConfigSource for FailingSource {
        async fn fetch(&self) -> crate::config::Result<Option<Config>> {
            Err(ConfigError::Io(std::io::Error::other("store unreachable")))
        }

        fn describe(&self) -> String {
            "failing".to_string()
        }
    }

    /// Source whose fetch panics.
    struct PanickingSource;

    #[async_trait]
    impl ConfigSource for PanickingSource {
        async fn fetch(&self) -> crate::config::Result<Option<Config>> {
            panic!("store client exploded")
        }

        fn describe(&self) -> String {
            "panicking".to_string()
        }
    }

    /// Resolver that blows up, standing in for an unexpected fault.
    struct PanickingResolver;

    impl OffsetResolver for PanickingResolver {
        fn utc_offset_hours(&self, _instant: DateTime<Utc>) -> i32 {
            panic!("resolver exploded")
        }

        fn name(&self) -> &str {
            "panicking"
        }
    }

    // ==================== Scenario Tests ====================

    #[tokio::test]
    async fn within_business_hours() {
        let engine = engine(config_with(Some(Schedule::business_hours())));
        // 10:00 UTC = 13:00 local
        let decision = engine.evaluate(&CallEvent::new(CALLER, wednesday(10))).await;

        assert!(decision.allow);
        assert_eq!(decision.reason, Reason::WithinHours);
        assert_eq!(decision.offset_hours, Some(3));
        assert_eq!(decision.caller, CALLER);
        assert_eq!(decision.timestamp, wednesday(10));
    }

    #[tokio::test]
    async fn after_business_hours() {
        let engine = engine(config_with(Some(Schedule::business_hours())));
        // 20:00 UTC = 23:00 local
        let decision = engine.evaluate(&CallEvent::new(CALLER, wednesday(20))).await;

        assert!(!decision.allow);
        assert_eq!(decision.reason, Reason::OutsideHours);
        assert_eq!(decision.offset_hours, Some(3));
    }

    #[tokio::test]
    async fn saturday_is_outside_hours() {
        let engine = engine(config_with(Some(Schedule::business_hours())));
        let decision = engine.evaluate(&CallEvent::new(CALLER, utc(2025, 6, 14, 10))).await;
        assert_eq!(decision.reason, Reason::OutsideHours);
        assert!(!decision.allow);
    }

    #[tokio::test]
    async fn winter_uses_standard_offset() {
        let engine = engine(config_with(Some(Schedule::business_hours())));
        // 2025-01-15 is a Wednesday; 06:00 UTC = 08:00 local
        let decision = engine.evaluate(&CallEvent::new(CALLER, utc(2025, 1, 15, 6))).await;
        assert_eq!(decision.reason, Reason::OutsideHours);
        assert_eq!(decision.offset_hours, Some(2));

        let decision = engine.evaluate(&CallEvent::new(CALLER, utc(2025, 1, 15, 7))).await;
        assert_eq!(decision.reason, Reason::WithinHours);
    }

    // ==================== Whitelist Tests ====================

    #[tokio::test]
    async fn whitelist_wins_over_any_schedule() {
        let mut disabled = Schedule::business_hours();
        disabled.disable();

        for schedule in [None, Some(disabled), Some(Schedule::business_hours())] {
            let engine = engine(config_with(schedule));
            for at in [wednesday(10), wednesday(20), utc(2025, 6, 14, 3)] {
                let decision = engine.evaluate(&CallEvent::new(FRIEND, at)).await;
                assert!(decision.allow);
                assert_eq!(decision.reason, Reason::Whitelist);
                assert!(decision.offset_hours.is_none());
            }
        }
    }

    #[tokio::test]
    async fn whitelist_wins_over_malformed_schedule() {
        let mut schedule = Schedule::new("Asia/Jerusalem");
        schedule.add_window(Window::new(ALL_DAYS, "bad", "bad"));
        let engine = engine(config_with(Some(schedule)));

        let decision = engine.evaluate(&CallEvent::new(FRIEND, wednesday(10))).await;
        assert_eq!(decision.reason, Reason::Whitelist);
    }

    #[tokio::test]
    async fn whitelist_wins_over_unreadable_schedule() {
        // Window without an end time
        let config = Config::from_json(&format!(
            r#"{{"whitelist": ["{FRIEND}"], "schedule": {{"enabled": true,
                "allowedTimes": [{{"dayOfWeek": [3], "startTime": "09:00"}}]}}}}"#
        ))
        .unwrap();
        let engine = engine(config);

        let decision = engine.evaluate(&CallEvent::new(FRIEND, wednesday(10))).await;
        assert!(decision.allow);
        assert_eq!(decision.reason, Reason::Whitelist);

        let decision = engine.evaluate(&CallEvent::new(CALLER, wednesday(10))).await;
        assert!(!decision.allow);
        assert_eq!(decision.reason, Reason::Error);
        assert!(decision.message.unwrap().contains("endTime"));
    }

    // ==================== Schedule Edge Tests ====================

    #[tokio::test]
    async fn disabled_schedule_denies() {
        let mut schedule = Schedule::new("Asia/Jerusalem");
        schedule.add_window(Window::new(ALL_DAYS, "00:00", "00:00"));
        schedule.disable();
        let engine = engine(config_with(Some(schedule)));

        for hour in 0..24 {
            let decision = engine.evaluate(&CallEvent::new(CALLER, wednesday(hour))).await;
            assert!(!decision.allow);
            assert_eq!(decision.reason, Reason::OutsideHours);
        }
    }

    #[tokio::test]
    async fn absent_schedule_denies() {
        let engine = engine(config_with(None));
        let decision = engine.evaluate(&CallEvent::new(CALLER, wednesday(10))).await;
        assert_eq!(decision.reason, Reason::OutsideHours);
    }

    #[tokio::test]
    async fn half_hour_start_matches_like_full_hour() {
        let mut half = Schedule::new("Asia/Jerusalem");
        half.add_window(Window::new(WORKWEEK, "09:30", "17:00"));
        let half = engine(config_with(Some(half)));
        let full = engine(config_with(Some(Schedule::business_hours())));

        for hour in 0..24 {
            let event = CallEvent::new(CALLER, wednesday(hour));
            assert_eq!(
                half.evaluate(&event).await.reason,
                full.evaluate(&event).await.reason,
                "hour {hour}"
            );
        }
    }

    #[tokio::test]
    async fn malformed_window_fails_closed() {
        let mut schedule = Schedule::new("Asia/Jerusalem");
        schedule.add_window(Window::new(WORKWEEK, "09:00", "17h"));
        let engine = engine(config_with(Some(schedule)));

        let decision = engine.evaluate(&CallEvent::new(CALLER, wednesday(10))).await;
        assert!(!decision.allow);
        assert_eq!(decision.reason, Reason::Error);
        assert!(decision.message.unwrap().contains("17h"));
    }

    #[tokio::test]
    async fn custom_resolver_shifts_windows() {
        let source = StaticConfigSource::new(config_with(Some(Schedule::business_hours())));
        let engine = AdmissionEngine::with_resolver(source, Arc::new(ConstantOffset::utc()));

        // With a zero offset the window is 09:00-17:00 UTC
        let decision = engine.evaluate(&CallEvent::new(CALLER, wednesday(7))).await;
        assert_eq!(decision.reason, Reason::OutsideHours);
        assert_eq!(decision.offset_hours, Some(0));

        let decision = engine.evaluate(&CallEvent::new(CALLER, wednesday(16))).await;
        assert_eq!(decision.reason, Reason::WithinHours);
    }

    // ==================== Failure Tests ====================

    #[tokio::test]
    async fn empty_caller_is_error() {
        let engine = engine(Config::default());
        let decision = engine.evaluate(&CallEvent::new("", wednesday(10))).await;

        assert!(!decision.allow);
        assert_eq!(decision.reason, Reason::Error);
        assert_eq!(decision.message.as_deref(), Some("missing caller number"));
    }

    #[tokio::test]
    async fn missing_config_is_config_error() {
        let engine = AdmissionEngine::new(StaticConfigSource::empty());
        let decision = engine.evaluate(&CallEvent::new(CALLER, wednesday(10))).await;

        assert!(!decision.allow);
        assert_eq!(decision.reason, Reason::ConfigError);
        assert!(decision.message.is_some());
    }

    #[tokio::test]
    async fn config_checked_before_caller() {
        let engine = AdmissionEngine::new(StaticConfigSource::empty());
        let decision = engine.evaluate(&CallEvent::new("", wednesday(10))).await;
        assert_eq!(decision.reason, Reason::ConfigError);
    }

    #[tokio::test]
    async fn fetch_failure_is_config_error() {
        let engine = AdmissionEngine::new(FailingSource);
        let decision = engine.evaluate(&CallEvent::new(CALLER, wednesday(10))).await;

        assert!(!decision.allow);
        assert_eq!(decision.reason, Reason::ConfigError);
        assert!(decision.message.unwrap().contains("store unreachable"));
    }

    #[tokio::test]
    async fn unconfigured_remote_is_config_error() {
        let source = RemoteConfigSource::new(RemoteConfigSettings::default()).unwrap();
        let engine = AdmissionEngine::new(source);
        let decision = engine.evaluate(&CallEvent::new(CALLER, wednesday(10))).await;

        assert_eq!(decision.reason, Reason::ConfigError);
        assert!(decision.message.unwrap().contains("API_URL"));
    }

    #[tokio::test]
    async fn panic_during_evaluation_is_error() {
        let source = StaticConfigSource::new(config_with(Some(Schedule::business_hours())));
        let engine = AdmissionEngine::with_resolver(source, Arc::new(PanickingResolver));

        let decision = engine.evaluate(&CallEvent::new(CALLER, wednesday(10))).await;
        assert!(!decision.allow);
        assert_eq!(decision.reason, Reason::Error);
    }

    #[tokio::test]
    async fn panicking_source_is_config_error() {
        let engine = AdmissionEngine::new(PanickingSource);

        let decision = tokio::spawn(async move {
            engine.evaluate(&CallEvent::new(CALLER, wednesday(10))).await
        })
        .await
        .unwrap();

        assert!(!decision.allow);
        assert_eq!(decision.reason, Reason::ConfigError);
        assert!(decision.message.is_some());
    }

    // ==================== Pure Core Tests ====================

    #[test]
    fn decide_is_pure() {
        let config = config_with(Some(Schedule::business_hours()));
        let first = decide(&config, CALLER, wednesday(10), &IsraelDst);
        let second = decide(&config, CALLER, wednesday(10), &IsraelDst);
        assert_eq!(first, second);
    }

    #[test]
    fn allow_implies_allowing_reason() {
        let config = config_with(Some(Schedule::business_hours()));
        for caller in ["", CALLER, FRIEND] {
            for hour in 0..24 {
                let decision = decide(&config, caller, wednesday(hour), &IsraelDst);
                assert_eq!(decision.allow, decision.reason.allows());
            }
        }
    }

    #[test]
    fn error_reasons() {
        assert_eq!(
            EvaluationError::from(ConfigError::NotFound).reason(),
            Reason::ConfigError
        );
        assert_eq!(EvaluationError::InvalidCaller.reason(), Reason::Error);
        assert_eq!(
            EvaluationError::from(ScheduleError::InvalidFormat("x".into())).reason(),
            Reason::Error
        );
    }
}
