use crate::Event;

/// A projection builds a read model from an append-only event trail.
///
/// Read models are **disposable**: they can be dropped and rebuilt by replaying
/// the trail from the beginning. The stock balance check in the reconciliation
/// job is exactly that: replay every ledger event and compare the result with
/// the cached balance column.
///
/// `apply` must be deterministic. Events that are not relevant to the
/// projection are ignored.
pub trait Projection {
    type Ev: Event;

    /// Apply a single event to the projection, updating the read model.
    fn apply(&mut self, event: &Self::Ev);

    /// Apply a sequence of events in order.
    fn apply_all<'a, I>(&mut self, events: I)
    where
        I: IntoIterator<Item = &'a Self::Ev>,
        Self::Ev: 'a,
    {
        for event in events {
            self.apply(event);
        }
    }
}
