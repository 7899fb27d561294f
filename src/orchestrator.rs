//! Per-issue open/download state machine.
//!
//! Drives one issue from overview to complete: check whether local content
//! is current, fetch section zero, hand off to the reader, then finish the
//! full download in the background. Exactly one user-initiated open may be
//! in flight at a time; opens for a different issue are rejected as busy.
//!
//! The orchestrator holds no I/O. The kiosk facade spawns the network tasks
//! and feeds their completions back as events; the generation number makes
//! stale completions (from an abandoned or superseded open) detectable so
//! they can never resurrect a record into an inconsistent state.

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::KioskError;
use crate::types::IssueStatus;

/// Where the active open currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenPhase {
    /// Comparing the file manifest against what is already on disk.
    CheckingNeedsUpdate,
    /// Section zero in flight; the reader is not yet handed off.
    SectionZero,
    /// Reader handed off, remaining files downloading in the background.
    FullDownload,
}

#[derive(Debug)]
pub struct ActiveOpen {
    pub date: NaiveDate,
    pub generation: u64,
    pub phase: OpenPhase,
    /// Status to revert to if the open is abandoned.
    pub prior_status: IssueStatus,
    pub token: CancellationToken,
}

/// Outcome of an `open` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginOpen {
    /// New open started with this generation.
    Started(u64),
    /// The same issue is already in flight; the caller stays attached as an
    /// observer and no second request is issued.
    AlreadyInFlight,
}

#[derive(Debug, Default)]
pub struct DownloadOrchestrator {
    active: Option<ActiveOpen>,
    next_generation: u64,
}

impl DownloadOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&ActiveOpen> {
        self.active.as_ref()
    }

    pub fn active_date(&self) -> Option<NaiveDate> {
        self.active.as_ref().map(|a| a.date)
    }

    pub fn is_open_in_flight(&self, date: NaiveDate) -> bool {
        self.active.as_ref().is_some_and(|a| a.date == date)
    }

    /// A completion is current iff it belongs to the active open. Anything
    /// else is stale and must be dropped by the dispatcher.
    pub fn is_current(&self, date: NaiveDate, generation: u64) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.date == date && a.generation == generation)
    }

    /// Start an open for `date`, enforcing the global serialization rule for
    /// user-initiated downloads.
    pub fn begin_open(
        &mut self,
        date: NaiveDate,
        prior_status: IssueStatus,
    ) -> Result<BeginOpen, KioskError> {
        if let Some(active) = &self.active {
            if active.date == date {
                debug!(date = %date, "Open already in flight, re-attaching");
                return Ok(BeginOpen::AlreadyInFlight);
            }
            return Err(KioskError::Busy);
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        self.active = Some(ActiveOpen {
            date,
            generation,
            phase: OpenPhase::CheckingNeedsUpdate,
            prior_status,
            token: CancellationToken::new(),
        });
        debug!(date = %date, generation, "Open started");
        Ok(BeginOpen::Started(generation))
    }

    /// Move the active open into the section-zero phase. No full download
    /// can exist before this phase completed.
    pub fn enter_section_zero(&mut self, generation: u64) -> bool {
        self.advance(generation, OpenPhase::CheckingNeedsUpdate, OpenPhase::SectionZero)
    }

    /// Section zero landed; the reader takes over while the rest downloads.
    pub fn enter_full_download(&mut self, generation: u64) -> bool {
        self.advance(generation, OpenPhase::SectionZero, OpenPhase::FullDownload)
    }

    /// Terminal: the open finished (complete, opened-from-cache, or failed).
    pub fn finish(&mut self, generation: u64) -> Option<ActiveOpen> {
        if self.active.as_ref().is_some_and(|a| a.generation == generation) {
            self.active.take()
        } else {
            None
        }
    }

    /// Explicit user cancellation (e.g. leaving the app mid-download).
    /// Cancels the token so the network task winds down, and returns the
    /// abandoned open so the caller can revert the record's status. A later
    /// retry is then permitted instead of being perceived as still in
    /// flight.
    pub fn abandon(&mut self) -> Option<ActiveOpen> {
        let active = self.active.take()?;
        active.token.cancel();
        debug!(date = %active.date, generation = active.generation, "Open abandoned");
        Some(active)
    }

    fn advance(&mut self, generation: u64, from: OpenPhase, to: OpenPhase) -> bool {
        match &mut self.active {
            Some(a) if a.generation == generation && a.phase == from => {
                a.phase = to;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn open_for_second_issue_is_busy() {
        let mut orch = DownloadOrchestrator::new();
        orch.begin_open(date("2026-03-10"), IssueStatus::Overview)
            .unwrap();
        assert_eq!(
            orch.begin_open(date("2026-03-09"), IssueStatus::Overview),
            Err(KioskError::Busy)
        );
        // After the first resolves, the second goes through.
        let gen = orch.active().unwrap().generation;
        orch.finish(gen);
        assert!(matches!(
            orch.begin_open(date("2026-03-09"), IssueStatus::Overview),
            Ok(BeginOpen::Started(_))
        ));
    }

    #[test]
    fn reopen_of_in_flight_issue_is_idempotent() {
        let mut orch = DownloadOrchestrator::new();
        orch.begin_open(date("2026-03-10"), IssueStatus::Overview)
            .unwrap();
        assert_eq!(
            orch.begin_open(date("2026-03-10"), IssueStatus::Overview),
            Ok(BeginOpen::AlreadyInFlight)
        );
    }

    #[test]
    fn phases_are_strictly_ordered() {
        let mut orch = DownloadOrchestrator::new();
        let Ok(BeginOpen::Started(gen)) =
            orch.begin_open(date("2026-03-10"), IssueStatus::Overview)
        else {
            panic!("open rejected");
        };
        // Full download cannot start before section zero.
        assert!(!orch.enter_full_download(gen));
        assert!(orch.enter_section_zero(gen));
        assert!(!orch.enter_section_zero(gen));
        assert!(orch.enter_full_download(gen));
    }

    #[test]
    fn stale_generation_is_rejected() {
        let mut orch = DownloadOrchestrator::new();
        let Ok(BeginOpen::Started(gen1)) =
            orch.begin_open(date("2026-03-10"), IssueStatus::Overview)
        else {
            panic!("open rejected");
        };
        let abandoned = orch.abandon().unwrap();
        assert!(abandoned.token.is_cancelled());
        assert_eq!(abandoned.prior_status, IssueStatus::Overview);

        let Ok(BeginOpen::Started(gen2)) =
            orch.begin_open(date("2026-03-10"), IssueStatus::Overview)
        else {
            panic!("open rejected");
        };
        assert_ne!(gen1, gen2);
        assert!(!orch.is_current(date("2026-03-10"), gen1));
        assert!(orch.is_current(date("2026-03-10"), gen2));
        assert!(!orch.enter_section_zero(gen1));
    }
}
