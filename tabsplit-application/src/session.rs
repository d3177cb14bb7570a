use indexmap::IndexMap;

use tabsplit_domain::{AllocationOutcome, CostAllocator, Receipt};

use crate::{error::SplitError, ledger::AssignmentLedger};

/// Lifecycle of a split.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SplitPhase {
    Draft,
    AwaitingAgreement,
    Finalized,
    Cancelled,
}

/// Answer to "can this split be finalized right now?".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeCheck<'a> {
    pub ok: bool,
    pub pending: Vec<&'a str>,
}

/// Tracks per-participant agreement and the split phase.
///
/// The tracker does not inspect assignments itself; the caller supplies the
/// coverage flag when opening agreement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgreementTracker<'a> {
    phase: SplitPhase,
    agreed: IndexMap<&'a str, bool>,
}

impl<'a> AgreementTracker<'a> {
    pub fn new(participants: &'a [&'a str]) -> Self {
        Self {
            phase: SplitPhase::Draft,
            agreed: participants
                .iter()
                .map(|&participant| (participant, false))
                .collect(),
        }
    }

    pub fn phase(&self) -> SplitPhase {
        self.phase
    }

    pub fn is_locked(&self) -> bool {
        matches!(self.phase, SplitPhase::Finalized | SplitPhase::Cancelled)
    }

    pub fn has_agreed(&self, participant: &str) -> bool {
        self.agreed.get(participant).copied().unwrap_or(false)
    }

    /// Moves the split into `AwaitingAgreement`. Idempotent while already
    /// awaiting.
    pub fn begin_agreement(&mut self, coverage_complete: bool) -> Result<(), SplitError> {
        if self.is_locked() {
            return Err(SplitError::SplitLocked);
        }
        if !coverage_complete {
            return Err(SplitError::CoverageIncomplete);
        }
        self.phase = SplitPhase::AwaitingAgreement;
        Ok(())
    }

    /// Records the participant's agreement. Agreeing twice is a no-op.
    pub fn set_agreed(&mut self, participant: &str) -> Result<(), SplitError> {
        if self.is_locked() {
            return Err(SplitError::SplitLocked);
        }
        if self.phase == SplitPhase::Draft {
            return Err(SplitError::AgreementNotOpen);
        }
        match self.agreed.get_mut(participant) {
            Some(flag) => {
                *flag = true;
                Ok(())
            }
            None => Err(SplitError::UnknownParticipant {
                participant: participant.to_owned(),
            }),
        }
    }

    pub fn pending_participants(&self) -> Vec<&'a str> {
        self.agreed
            .iter()
            .filter(|(_, &agreed)| !agreed)
            .map(|(&participant, _)| participant)
            .collect()
    }

    pub fn can_finalize(&self) -> FinalizeCheck<'a> {
        let pending = self.pending_participants();
        FinalizeCheck {
            ok: self.phase == SplitPhase::AwaitingAgreement && pending.is_empty(),
            pending,
        }
    }

    pub fn finalize(&mut self) -> Result<(), SplitError> {
        if self.is_locked() {
            return Err(SplitError::SplitLocked);
        }
        if self.phase == SplitPhase::Draft {
            return Err(SplitError::AgreementNotOpen);
        }
        let pending = self.pending_participants();
        if !pending.is_empty() {
            return Err(SplitError::NotAllAgreed {
                pending: pending.into_iter().map(str::to_owned).collect(),
            });
        }
        self.phase = SplitPhase::Finalized;
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), SplitError> {
        if self.is_locked() {
            return Err(SplitError::SplitLocked);
        }
        self.phase = SplitPhase::Cancelled;
        Ok(())
    }
}

/// One receipt-splitting session among a fixed set of participants.
///
/// Owns the assignment ledger and the agreement tracker; the receipt and the
/// participant list are borrowed from the caller for the session's lifetime.
/// All mutations go through this aggregate so that a finalized or cancelled
/// split rejects further edits.
#[derive(Debug, Clone)]
pub struct SplitSession<'a> {
    receipt: &'a Receipt,
    participants: &'a [&'a str],
    ledger: AssignmentLedger<'a>,
    tracker: AgreementTracker<'a>,
}

impl<'a> SplitSession<'a> {
    pub fn new(receipt: &'a Receipt, participants: &'a [&'a str]) -> Self {
        Self {
            receipt,
            participants,
            ledger: AssignmentLedger::for_receipt(receipt),
            tracker: AgreementTracker::new(participants),
        }
    }

    pub fn receipt(&self) -> &'a Receipt {
        self.receipt
    }

    pub fn participants(&self) -> &'a [&'a str] {
        self.participants
    }

    pub fn ledger(&self) -> &AssignmentLedger<'a> {
        &self.ledger
    }

    pub fn phase(&self) -> SplitPhase {
        self.tracker.phase()
    }

    pub fn toggle(&mut self, line_id: &str, participant: &str) -> Result<(), SplitError> {
        self.ensure_mutable()?;
        let participant = self.canonical(participant)?;
        self.ledger.toggle(line_id, participant);
        Ok(())
    }

    pub fn select_all(&mut self, line_id: &str) -> Result<(), SplitError> {
        self.ensure_mutable()?;
        self.ledger.select_all(line_id, self.participants);
        Ok(())
    }

    pub fn clear(&mut self, line_id: &str) -> Result<(), SplitError> {
        self.ensure_mutable()?;
        self.ledger.clear(line_id);
        Ok(())
    }

    /// Opens agreement once every billable line has at least one assignee.
    pub fn submit_for_agreement(&mut self) -> Result<(), SplitError> {
        self.tracker.begin_agreement(self.ledger.is_fully_covered())
    }

    pub fn agree(&mut self, participant: &str) -> Result<(), SplitError> {
        let participant = self.canonical(participant)?;
        self.tracker.set_agreed(participant)
    }

    pub fn can_finalize(&self) -> FinalizeCheck<'a> {
        self.tracker.can_finalize()
    }

    pub fn finalize(&mut self) -> Result<(), SplitError> {
        self.tracker.finalize()
    }

    pub fn cancel(&mut self) -> Result<(), SplitError> {
        self.tracker.cancel()
    }

    /// Recomputes the per-participant costs from current state and overlays
    /// each participant's agreement flag.
    pub fn allocation(&self) -> AllocationOutcome<'a> {
        let mut outcome =
            CostAllocator::allocate(self.receipt, self.ledger.assignments(), self.participants);
        for cost in &mut outcome.per_participant {
            cost.agreed = self.tracker.has_agreed(cost.participant);
        }
        outcome
    }

    fn ensure_mutable(&self) -> Result<(), SplitError> {
        if self.tracker.is_locked() {
            return Err(SplitError::SplitLocked);
        }
        Ok(())
    }

    fn canonical(&self, participant: &str) -> Result<&'a str, SplitError> {
        self.participants
            .iter()
            .copied()
            .find(|&known| known == participant)
            .ok_or_else(|| SplitError::UnknownParticipant {
                participant: participant.to_owned(),
            })
    }
}
