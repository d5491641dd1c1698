//! Domain model (ids, jobs, claim state, outcomes, balance, progress, errors).
//!
//! I/O を一切持たない層です。ストア・送信・時刻は ports 経由で扱います。

pub mod balance;
pub mod errors;
pub mod ids;
pub mod job;
pub mod message;
pub mod outcome;
pub mod progress;
pub mod state;

pub use self::balance::Credits;
pub use self::errors::{RelayError, SendError, StoreError};
pub use self::ids::{JobId, OutcomeId, OwnerId, RunId};
pub use self::job::{ClaimBatch, ClaimShortfall, ClaimedJob, Job, NewJob};
pub use self::message::{Encoding, OutboundSms, divide_message, validate_destination};
pub use self::outcome::{Confirmation, DeliveryOutcome, DeliveryStatus, ResultCode, Settlement};
pub use self::progress::{Progress, RunPhase, TerminalState};
pub use self::state::ClaimState;
