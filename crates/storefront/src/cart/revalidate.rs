//! Revalidation decisions and causally ordered snapshot adoption.
//!
//! Two small pieces, both pure so the engine can hold them under its
//! session mutex:
//!
//! - [`should_revalidate`] decides whether an event warrants refetching
//!   the authoritative cart.
//! - [`AdoptionGuard`] orders snapshot adoption. Responses and fetches
//!   complete in any order, so every candidate snapshot carries a ticket
//!   (the settlement sequence current when it was requested) and may only
//!   displace a snapshot adopted at a ticket less than or equal to its
//!   own. A slow fetch that raced past a newer one is rejected instead of
//!   rolling truth backwards.

/// An event the revalidation coordinator reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevalidateTrigger {
    /// A mutation's response was observed.
    MutationSettled {
        /// The submitted action had an empty input list and cannot have
        /// changed anything, so the adopted response cart is already
        /// current.
        noop: bool,
    },
    /// The visitor navigated and route data is being assembled.
    Navigation {
        /// The navigation landed on the location already rendered.
        same_location: bool,
    },
    /// The caller explicitly asked for fresh truth.
    Explicit,
}

/// Whether the authoritative cart should be refetched for this event.
#[must_use]
pub const fn should_revalidate(trigger: RevalidateTrigger) -> bool {
    match trigger {
        RevalidateTrigger::MutationSettled { noop } => !noop,
        RevalidateTrigger::Navigation { same_location } => !same_location,
        RevalidateTrigger::Explicit => true,
    }
}

/// Assigns settlement sequences and gates snapshot adoption on them.
#[derive(Debug, Default)]
pub struct AdoptionGuard {
    /// Sequence of the most recently observed settlement.
    settle_counter: u64,
    /// Ticket of the currently adopted snapshot.
    adopted_seq: u64,
}

impl AdoptionGuard {
    /// Assign the next settlement sequence. Called once per observed
    /// mutation response.
    pub fn next_settle_seq(&mut self) -> u64 {
        self.settle_counter += 1;
        self.settle_counter
    }

    /// The sequence a fetch issued right now should carry as its ticket:
    /// it will reflect at least every settlement observed so far.
    #[must_use]
    pub const fn current_seq(&self) -> u64 {
        self.settle_counter
    }

    /// Try to adopt a snapshot carrying `ticket`. Returns whether the
    /// snapshot may displace the current one; on admission the guard
    /// records the ticket so older fetches are refused from now on.
    pub fn admit(&mut self, ticket: u64) -> bool {
        if ticket >= self.adopted_seq {
            self.adopted_seq = ticket;
            true
        } else {
            false
        }
    }

    /// Ticket of the currently adopted snapshot.
    #[must_use]
    pub const fn adopted_seq(&self) -> u64 {
        self.adopted_seq
    }
}
