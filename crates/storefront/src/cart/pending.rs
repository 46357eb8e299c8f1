//! Registry of in-flight cart mutations.
//!
//! Every submitted mutation is registered here before dispatch and settled
//! when its response is observed. The overlay builder reads a snapshot of
//! this registry on each render, so registration and settlement are the
//! only writes in the optimistic path.
//!
//! Records are not deduplicated and never cancel each other: rapid
//! quantity taps against one line produce several records, each of which
//! settles on its own response.

use marmalade_core::{LineId, SubmissionId};

use crate::commerce::CartAction;

/// Settlement state of a pending mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleState {
    /// Dispatched, response not yet observed.
    InFlight,
    /// Response observed and applied. The patch keeps applying until a
    /// snapshot whose adoption ticket covers `settle_seq` arrives, at
    /// which point the record is dropped.
    Applied {
        /// Settlement sequence assigned when the response was observed.
        settle_seq: u64,
    },
}

/// What a mutation touches, for conflict checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetKey {
    /// A cart line, real or synthetic.
    Line(LineId),
    /// A discount or gift card code entry.
    Code(String),
    /// The whole cart (buyer identity).
    Cart,
}

/// A submitted, not-yet-dropped cart mutation.
#[derive(Debug, Clone)]
pub struct PendingMutation {
    /// Unique id assigned at registration.
    pub submission_id: SubmissionId,
    /// The submitted action, as dispatched to the backend.
    pub action: CartAction,
    /// Settlement state.
    pub state: SettleState,
}

impl PendingMutation {
    /// The keys this mutation touches. Derived from the action so they can
    /// never drift from the payload.
    ///
    /// A `LinesAdd` targets the synthetic line ids its overlay patch will
    /// create, so the provisional lines report busy to the UI too.
    #[must_use]
    pub fn target_keys(&self) -> Vec<TargetKey> {
        match &self.action {
            CartAction::LinesAdd { lines } => lines
                .iter()
                .enumerate()
                .map(|(index, _)| TargetKey::Line(LineId::synthetic(&self.submission_id, index)))
                .collect(),
            CartAction::LinesUpdate { lines } => lines
                .iter()
                .map(|line| TargetKey::Line(line.id.clone()))
                .collect(),
            CartAction::LinesRemove { line_ids } => line_ids
                .iter()
                .map(|id| TargetKey::Line(id.clone()))
                .collect(),
            CartAction::DiscountCodesUpdate { discount_codes } => discount_codes
                .iter()
                .map(|code| TargetKey::Code(code.clone()))
                .collect(),
            CartAction::GiftCardCodesUpdate { gift_card_codes } => gift_card_codes
                .iter()
                .map(|code| TargetKey::Code(code.clone()))
                .collect(),
            CartAction::GiftCardCodesRemove { gift_card_codes } => gift_card_codes
                .iter()
                .map(|id| TargetKey::Code(id.as_str().to_string()))
                .collect(),
            CartAction::BuyerIdentityUpdate { .. } => vec![TargetKey::Cart],
        }
    }

    /// Whether the response for this mutation has been observed.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        matches!(self.state, SettleState::Applied { .. })
    }
}

/// The set of in-flight mutation records, in submission order.
#[derive(Debug, Default)]
pub struct PendingTracker {
    records: Vec<PendingMutation>,
}

impl PendingTracker {
    /// Register a submitted action. Returns the generated submission id,
    /// from which the overlay derives any synthetic line ids.
    pub fn register(&mut self, action: CartAction) -> SubmissionId {
        let submission_id = SubmissionId::generate();
        self.records.push(PendingMutation {
            submission_id: submission_id.clone(),
            action,
            state: SettleState::InFlight,
        });
        submission_id
    }

    /// Mark a record as applied at the given settlement sequence. Its
    /// patch keeps applying until [`Self::drop_settled`] covers the seq.
    pub fn settle_applied(&mut self, submission_id: &SubmissionId, settle_seq: u64) {
        if let Some(record) = self
            .records
            .iter_mut()
            .find(|r| r.submission_id == *submission_id)
        {
            record.state = SettleState::Applied { settle_seq };
        }
    }

    /// Settle a rejected or failed submission: the record is removed
    /// outright so its patch never applies again.
    pub fn settle_failed(&mut self, submission_id: &SubmissionId) {
        self.records.retain(|r| r.submission_id != *submission_id);
    }

    /// Drop applied records whose settlement sequence is covered by an
    /// adopted snapshot. In-flight records are untouched.
    pub fn drop_settled(&mut self, up_to_seq: u64) {
        self.records.retain(|r| match r.state {
            SettleState::InFlight => true,
            SettleState::Applied { settle_seq } => settle_seq > up_to_seq,
        });
    }

    /// Snapshot of all records in submission order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PendingMutation> {
        self.records.clone()
    }

    /// Is there a pending `LinesAdd` whose result would make the cart
    /// non-empty? Used to render "loading" instead of "empty cart" while
    /// a first add is in flight.
    #[must_use]
    pub fn has_pending_lines_add(&self) -> bool {
        self.records.iter().any(|r| match &r.action {
            CartAction::LinesAdd { lines } => lines.iter().any(|line| line.quantity > 0),
            _ => false,
        })
    }

    /// Whether any record targets the given line. Lets one line's controls
    /// be disabled while its own mutation is pending, without a global
    /// submit lock.
    #[must_use]
    pub fn is_line_busy(&self, line_id: &LineId) -> bool {
        self.records
            .iter()
            .flat_map(PendingMutation::target_keys)
            .any(|key| matches!(key, TargetKey::Line(id) if id == *line_id))
    }

    /// Number of records, settled or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no records remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
