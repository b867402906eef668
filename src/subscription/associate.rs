//! Binding a subscription's lifetime to a field of some owner.
//!
//! Operators keep the subscriptions they create (inner monitors, scheduled
//! dispatcher work) in their context. Associating a subscription stores it
//! in the context and arranges for it to be removed again once it vanishes.
//! The removal goes through a weak accessor, so an association never keeps
//! the owner alive.

use crate::{
  context::ContextAccessor,
  subscription::{Subscription, SubscriptionId},
};

/// Stores `subscription` with `set` and removes it with `clear` once it
/// vanishes. `then` receives whatever `clear` returned, after the write
/// completed, and is skipped when the owner is gone.
///
/// A subscription that already vanished is stored and cleared right away.
pub fn associate<C, R>(
  subscription: &Subscription,
  context: &ContextAccessor<C>,
  set: impl FnOnce(&mut C, Subscription),
  clear: impl FnOnce(&mut C, SubscriptionId) -> R + Send + 'static,
  then: impl FnOnce(R) + Send + 'static,
) where
  C: Clone + Send + Sync + 'static,
{
  let handle = subscription.clone();
  context.read_write(move |content| set(content, handle));
  let weak = context.weakify();
  let id = subscription.id();
  subscription.when_vanished(move || {
    if let Some(outcome) = weak.read_write(|content| clear(content, id)) {
      then(outcome);
    }
  });
}

/// Keeps `subscription` in an optional slot until it vanishes. The slot is
/// only cleared if it still holds this very subscription.
pub fn associate_slot<C>(
  subscription: &Subscription,
  context: &ContextAccessor<C>,
  slot: fn(&mut C) -> &mut Option<Subscription>,
) where
  C: Clone + Send + Sync + 'static,
{
  associate(
    subscription,
    context,
    move |content, handle| *slot(content) = Some(handle),
    move |content, id| {
      let slot = slot(content);
      if slot.as_ref().map(Subscription::id) == Some(id) {
        *slot = None;
      }
    },
    |_| {},
  );
}

/// Keeps `subscription` in a collection until it vanishes.
pub fn associate_in<C>(
  subscription: &Subscription,
  context: &ContextAccessor<C>,
  collection: fn(&mut C) -> &mut Vec<Subscription>,
) where
  C: Clone + Send + Sync + 'static,
{
  associate(
    subscription,
    context,
    move |content, handle| collection(content).push(handle),
    move |content, id| collection(content).retain(|candidate| candidate.id() != id),
    |_| {},
  );
}
