use crate::command::cancellation::CancellationFlag;
use crate::error::ipc::IpcError;
use crate::ipc::protocol::CorrelationId;

use common::ErrorLocation;

use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FormatResult};
use std::panic::Location;
use std::sync::Arc;

use parking_lot::Mutex;

/// Where a request is in the dispatch pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RequestPhase {
    Received,
    Resolving,
    Invoking,
    Completed,
}

impl Display for RequestPhase {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        let phase = match self {
            RequestPhase::Received => "received",
            RequestPhase::Resolving => "resolving",
            RequestPhase::Invoking => "invoking",
            RequestPhase::Completed => "completed",
        };
        formatter.write_str(phase)
    }
}

#[derive(Debug)]
struct PendingEntry {
    phase: RequestPhase,
    cancellation: CancellationFlag,
}

/// In-flight requests keyed by correlation id.
///
/// An entry is created on receipt and removed by the one completion that
/// wins; every later completion attempt for the same id is rejected.
#[derive(Debug, Clone, Default)]
pub struct PendingRequests {
    entries: Arc<Mutex<HashMap<CorrelationId, PendingEntry>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a newly received request.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::DuplicateCorrelation`] if `id` is already in flight.
    #[track_caller]
    pub fn begin(&self, id: &CorrelationId) -> Result<CancellationFlag, IpcError> {
        let mut entries = self.entries.lock();
        if entries.contains_key(id) {
            return Err(IpcError::DuplicateCorrelation {
                correlation_id: id.to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let cancellation = CancellationFlag::new();
        entries.insert(
            id.clone(),
            PendingEntry {
                phase: RequestPhase::Received,
                cancellation: cancellation.clone(),
            },
        );
        Ok(cancellation)
    }

    /// Moves a pending request forward. Phases never move backwards.
    pub fn advance(&self, id: &CorrelationId, phase: RequestPhase) -> bool {
        match self.entries.lock().get_mut(id) {
            Some(entry) if phase > entry.phase && phase != RequestPhase::Completed => {
                entry.phase = phase;
                true
            }
            _ => false,
        }
    }

    pub fn phase(&self, id: &CorrelationId) -> Option<RequestPhase> {
        self.entries.lock().get(id).map(|entry| entry.phase)
    }

    /// Claims the single completion of `id` and forgets it.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::CompletionRejected`] if `id` is unknown or was
    /// already completed.
    #[track_caller]
    pub fn complete(&self, id: &CorrelationId) -> Result<(), IpcError> {
        match self.entries.lock().remove(id) {
            Some(_) => Ok(()),
            None => Err(IpcError::CompletionRejected {
                correlation_id: id.to_string(),
                location: ErrorLocation::from(Location::caller()),
            }),
        }
    }

    /// Raises the cancellation flag of `id`. Returns `false` if nothing is pending under it.
    pub fn cancel(&self, id: &CorrelationId) -> bool {
        match self.entries.lock().get(id) {
            Some(entry) => {
                entry.cancellation.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancellation_flag(&self, id: &CorrelationId) -> Option<CancellationFlag> {
        self.entries
            .lock()
            .get(id)
            .map(|entry| entry.cancellation.clone())
    }

    pub fn contains(&self, id: &CorrelationId) -> bool {
        self.entries.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
