//! Runtime core of the pursuit economy: violation detection, wanted
//! episodes, pursuer/target proximity and capture, and per-second accrual.

pub mod accrual;
pub mod detectors;
pub mod engine;
pub mod geometry;
pub mod ledger;
pub mod proximity;
pub mod roles;
pub mod runtime;
pub mod scheduler;
pub mod telemetry;

pub use engine::{FailOutcome, PursuitEngine, TickMetrics};
pub use ledger::{AccountLedger, LedgerEntry, LedgerError};
pub use roles::RoleClassifier;
pub use runtime::{EpisodeClock, RuntimeState, ZigzagTurnState};
pub use scheduler::{DueTask, TaskKey, TaskKind, TaskScheduler};
pub use telemetry::TelemetrySnapshot;
