//! Offduty Core - admission decisions for inbound phone calls.
//!
//! Decides whether to forward a call from a caller whitelist and a weekly
//! schedule written in local time. The decision fails closed: any missing
//! configuration or unexpected fault rejects the call.
//!
//! ## Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use offduty_core::{decide, Config, IsraelDst, Reason};
//!
//! let config = Config::default(); // Mon-Fri 09:00-17:00 local
//! // Wednesday 10:00 UTC is 13:00 in Israel during daylight time
//! let now = Utc.with_ymd_and_hms(2025, 6, 11, 10, 0, 0).unwrap();
//!
//! let decision = decide(&config, "+972501234567", now, &IsraelDst);
//! assert!(decision.allow);
//! assert_eq!(decision.reason, Reason::WithinHours);
//! ```

pub mod config;
pub mod decision;
pub mod dst;
pub mod engine;
pub mod remote;
pub mod schedule;

pub use config::{Config, ConfigError, ConfigSource, StaticConfigSource};
pub use decision::{CallEvent, Decision, Reason};
pub use dst::{ConstantOffset, DstBoundaries, IsraelDst, OffsetResolver};
pub use engine::{decide, AdmissionEngine, EvaluationError};
pub use remote::{RemoteConfigSettings, RemoteConfigSource};
pub use schedule::{Schedule, ScheduleError, TimeOfDay, Window};
