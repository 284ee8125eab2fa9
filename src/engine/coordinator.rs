//! Booking transaction coordinator: the public mutation API.
//!
//! Each attempt runs on its own task. Dropping the caller's future (a request
//! timeout, a closed connection) therefore never stops a commit halfway: the
//! attempt either lands in both the WAL and the calendar, or in neither.
//! `ConcurrencyFailure` is the only error retried here.

use std::future::Future;
use std::sync::Arc;

use ulid::Ulid;

use crate::model::*;
use crate::observability;

use super::{Engine, EngineError};

impl Engine {
    pub async fn create_appointment(self: &Arc<Self>, req: BookingRequest) -> Result<Appointment, EngineError> {
        self.coordinate("create", move |engine| async move { engine.create_locked(req).await })
            .await
    }

    pub async fn reschedule_appointment(
        self: &Arc<Self>,
        id: Ulid,
        new_start: Ms,
    ) -> Result<Appointment, EngineError> {
        self.coordinate("reschedule", move |engine| async move {
            engine.reschedule_locked(id, new_start).await
        })
        .await
    }

    pub async fn confirm_appointment(self: &Arc<Self>, id: Ulid) -> Result<Appointment, EngineError> {
        self.transition(id, Transition::Confirm).await
    }

    pub async fn cancel_appointment(self: &Arc<Self>, id: Ulid) -> Result<Appointment, EngineError> {
        self.transition(id, Transition::Cancel).await
    }

    pub async fn complete_appointment(self: &Arc<Self>, id: Ulid) -> Result<Appointment, EngineError> {
        self.transition(id, Transition::Complete).await
    }

    async fn transition(self: &Arc<Self>, id: Ulid, transition: Transition) -> Result<Appointment, EngineError> {
        let op = match transition {
            Transition::Confirm => "confirm",
            Transition::Cancel => "cancel",
            Transition::Complete => "complete",
            Transition::Reschedule => "reschedule",
        };
        self.coordinate(op, move |engine| async move {
            engine.transition_locked(id, transition).await
        })
        .await
    }

    async fn coordinate<T, F, Fut>(self: &Arc<Self>, op: &'static str, attempt: F) -> Result<T, EngineError>
    where
        F: Fn(Arc<Engine>) -> Fut,
        Fut: Future<Output = Result<T, EngineError>> + Send + 'static,
        T: Send + 'static,
    {
        let mut retries = 0u32;
        loop {
            let result = match tokio::spawn(attempt(self.clone())).await {
                Ok(result) => result,
                Err(e) => Err(EngineError::Aborted(e.to_string())),
            };

            match result {
                Err(e) if e.is_retryable() && retries < self.config.max_retries => {
                    retries += 1;
                    metrics::counter!(observability::RETRIES_TOTAL, "op" => op).increment(1);
                    tracing::warn!("{op}: {e} (retry {retries}/{})", self.config.max_retries);
                    tokio::time::sleep(self.config.retry_backoff * retries).await;
                }
                other => {
                    let outcome = match &other {
                        Ok(_) => "ok",
                        Err(e) => e.kind(),
                    };
                    metrics::counter!(observability::OPERATIONS_TOTAL, "op" => op, "outcome" => outcome)
                        .increment(1);
                    return other;
                }
            }
        }
    }
}
