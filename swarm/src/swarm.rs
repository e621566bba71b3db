//! Coordinator-side API.
//!
//! Every collective call here is synchronous: it returns only after all of
//! the responses it expects (or the closing barrier) have been seen.

use std::borrow::Borrow;
use std::rc::Rc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::codec::{Codec, decode_plain, encode_plain};
use crate::error::{Error, Result};
use crate::parallel::{Parallel, Stream};
use crate::realm::{Realm, Source};
use crate::registry::{ContextMapOp, EachContextOp, EachOp, FactoryOp, GetOp, MapOp, Op, Registry};
use crate::task::{Response, Task};

/// Callback run on the coordinator for every response it receives, with the
/// sender's rank.
pub type ReceiveNotifier = Rc<dyn Fn(usize)>;

/// Handle given to the coordinator body. Only exists on rank 0.
pub struct Swarm<'a, C> {
    realm: &'a mut dyn Realm,
    registry: &'a Registry<C>,
    blocking: bool,
    notifiers: Vec<ReceiveNotifier>,
}

impl<'a, C> Swarm<'a, C> {
    pub(crate) fn new(
        realm: &'a mut dyn Realm,
        registry: &'a Registry<C>,
        blocking: bool,
    ) -> Self {
        Self {
            realm,
            registry,
            blocking,
            notifiers: Vec::new(),
        }
    }

    /// Number of nodes, coordinator included.
    pub fn size(&self) -> usize {
        self.realm.total()
    }

    pub fn workers(&self) -> usize {
        self.realm.total() - 1
    }

    /// Task sends still in flight. Completed ones are swept first.
    pub fn pending_sends(&mut self) -> usize {
        self.realm.pending_sends()
    }

    pub fn parallelize<T, I>(&mut self, items: I) -> Parallel<'_, 'a, C, T>
    where
        I: IntoIterator<Item = T>,
    {
        Parallel::new(self, items.into_iter().collect())
    }

    /// Binds `items` without collecting them. The iterator is only advanced
    /// while tasks are being sent.
    pub fn stream<I>(&mut self, items: I) -> Stream<'_, 'a, C, I::IntoIter>
    where
        I: IntoIterator,
    {
        Stream::new(self, items.into_iter())
    }

    /// Creates every worker's context with `factory(rank)`.
    pub fn context(&mut self, factory: &FactoryOp) -> Result<()> {
        self.broadcast(factory, true)
    }

    pub fn each(&mut self, action: &EachOp) -> Result<()> {
        self.broadcast(action, true)
    }

    pub fn each_context(&mut self, action: &EachContextOp) -> Result<()> {
        self.broadcast(action, true)
    }

    /// One result per worker, position `j` holding rank `j + 1`'s answer.
    pub fn get<R: DeserializeOwned>(&mut self, action: &GetOp<R>) -> Result<Vec<R>> {
        self.broadcast(action, false)?;
        self.receive_ordered(self.workers(), -1)
    }

    pub fn map<T, R>(&mut self, items: &[T], transform: &MapOp<T, R>) -> Result<Vec<R>>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        self.map_iter(items, transform)
    }

    /// [`map`](Self::map) over any iterator of items or references to them.
    /// Items are encoded and sent one at a time as the iterator yields them.
    pub fn map_iter<T, R, I>(&mut self, items: I, transform: &MapOp<T, R>) -> Result<Vec<R>>
    where
        T: Serialize,
        R: DeserializeOwned,
        I: IntoIterator,
        I::Item: Borrow<T>,
    {
        let count = self.dispatch(transform, items, drop)?;
        self.receive_ordered(count, 0)
    }

    pub fn map_context<T, R>(
        &mut self,
        items: &[T],
        transform: &ContextMapOp<T, R>,
    ) -> Result<Vec<R>>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        self.map_context_iter(items, transform)
    }

    pub fn map_context_iter<T, R, I>(
        &mut self,
        items: I,
        transform: &ContextMapOp<T, R>,
    ) -> Result<Vec<R>>
    where
        T: Serialize,
        R: DeserializeOwned,
        I: IntoIterator,
        I::Item: Borrow<T>,
    {
        let count = self.dispatch(transform, items, drop)?;
        self.receive_ordered(count, 0)
    }

    /// Keeps the items for which `predicate` holds, in their original order.
    ///
    /// Workers only send back the verdict; the values themselves never leave
    /// the coordinator's copy of `items`.
    pub fn filter<T>(&mut self, items: Vec<T>, predicate: &MapOp<T, bool>) -> Result<Vec<T>>
    where
        T: Serialize,
    {
        self.filter_iter(items, predicate)
    }

    /// [`filter`](Self::filter) over any iterator. Each item is kept on the
    /// coordinator once its task has been sent.
    pub fn filter_iter<T, I>(&mut self, items: I, predicate: &MapOp<T, bool>) -> Result<Vec<T>>
    where
        T: Serialize,
        I: IntoIterator<Item = T>,
    {
        let mut sent = Vec::new();
        self.dispatch(predicate, items, |item| sent.push(item))?;
        self.receive_filtered(sent)
    }

    /// Returns false if this notifier was already registered.
    pub fn add_receive_notifier(&mut self, notifier: ReceiveNotifier) -> bool {
        if self.notifiers.iter().any(|n| Rc::ptr_eq(n, &notifier)) {
            return false;
        }
        self.notifiers.push(notifier);
        true
    }

    /// Returns false if this notifier was not registered.
    pub fn remove_receive_notifier(&mut self, notifier: &ReceiveNotifier) -> bool {
        let before = self.notifiers.len();
        self.notifiers.retain(|n| !Rc::ptr_eq(n, notifier));
        self.notifiers.len() != before
    }

    fn resolve<K, I, O>(&self, op: &Op<K, I, O>) -> Result<String> {
        self.registry.handler(op.name())?;
        Ok(op.name().to_string())
    }

    /// Sends one `Apply` task per item, handing each item to `sent` once its
    /// frame is built. Returns the number of tasks.
    fn dispatch<K, T, O, I, F>(&mut self, op: &Op<K, T, O>, items: I, mut sent: F) -> Result<usize>
    where
        T: Serialize,
        I: IntoIterator,
        I::Item: Borrow<T>,
        F: FnMut(I::Item),
    {
        let operation = self.resolve(op)?;
        let codec = *self.realm.codec();
        let count = self.realm.send_evenly(items, self.blocking, |index, item| {
            let frame = apply_frame(&codec, &operation, index, Borrow::<T>::borrow(&item))?;
            sent(item);
            Ok(frame)
        })?;
        tracing::debug!(operation = %operation, count, "dispatched tasks");
        Ok(count)
    }

    fn broadcast<K, I, O>(&mut self, op: &Op<K, I, O>, sync: bool) -> Result<()> {
        let operation = self.resolve(op)?;
        tracing::debug!(operation = %operation, sync, "broadcast");
        self.realm
            .send_to_others(&Task::Broadcast { operation, sync }, self.blocking)?;
        if sync {
            self.realm.barrier()?;
        }
        Ok(())
    }

    /// Ends every worker loop and joins them at the closing barrier.
    pub(crate) fn stop(&mut self) -> Result<()> {
        tracing::debug!(workers = self.workers(), "stopping workers");
        self.realm.send_to_others(&Task::Stop, self.blocking)?;
        self.realm.barrier()
    }

    /// Receives exactly `count` responses, notifying observers as each one
    /// arrives.
    fn fold<F>(&mut self, count: usize, mut accept: F) -> Result<()>
    where
        F: FnMut(usize, Response) -> Result<()>,
    {
        for _ in 0..count {
            let parcel = self.realm.recv_parcel::<Response>(Source::Any)?;
            let (sender, index) = (parcel.sender, parcel.payload.index);
            tracing::trace!(sender, index, "response");
            for notifier in &self.notifiers {
                notifier(parcel.sender);
            }
            accept(parcel.sender, parcel.payload)?;
        }
        Ok(())
    }

    fn receive_ordered<R: DeserializeOwned>(
        &mut self,
        count: usize,
        offset: isize,
    ) -> Result<Vec<R>> {
        let mut slots: Vec<Option<R>> = (0..count).map(|_| None).collect();
        self.fold(count, |sender, response| {
            let slot = &mut slots[slot_index(sender, response.index, offset, count)?];
            if slot.is_some() {
                return Err(duplicate(sender, response.index));
            }
            *slot = Some(decode_plain(&response.data)?);
            Ok(())
        })?;
        // `count` responses with distinct in-range indices fill every slot.
        Ok(slots.into_iter().flatten().collect())
    }

    fn receive_filtered<T>(&mut self, items: Vec<T>) -> Result<Vec<T>> {
        let count = items.len();
        let mut verdicts: Vec<Option<bool>> = vec![None; count];
        self.fold(count, |sender, response| {
            let verdict = &mut verdicts[slot_index(sender, response.index, 0, count)?];
            if verdict.is_some() {
                return Err(duplicate(sender, response.index));
            }
            *verdict = Some(decode_plain(&response.data)?);
            Ok(())
        })?;
        Ok(items
            .into_iter()
            .zip(verdicts)
            .filter_map(|(item, keep)| (keep == Some(true)).then_some(item))
            .collect())
    }
}

fn apply_frame<T>(codec: &Codec, operation: &str, index: usize, item: &T) -> Result<Vec<u8>>
where
    T: Serialize + ?Sized,
{
    let task = Task::Apply {
        index,
        operation: operation.to_string(),
        payload: encode_plain(item)?,
    };
    codec.encode(&task)
}

fn slot_index(sender: usize, index: usize, offset: isize, count: usize) -> Result<usize> {
    index
        .checked_add_signed(offset)
        .filter(|&slot| slot < count)
        .ok_or_else(|| Error::ProtocolViolation {
            sender,
            detail: format!("response index {} outside of {} expected", index, count),
        })
}

fn duplicate(sender: usize, index: usize) -> Error {
    Error::ProtocolViolation {
        sender,
        detail: format!("second response for index {}", index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realm::threads::create_realms;
    use std::cell::Cell;

    #[test]
    fn test_slot_index() {
        assert_eq!(slot_index(1, 3, 0, 4).unwrap(), 3);
        assert_eq!(slot_index(1, 1, -1, 3).unwrap(), 0);
        assert!(slot_index(1, 0, -1, 3).is_err());
        assert!(slot_index(2, 4, 0, 4).is_err());
    }

    #[test]
    fn test_notifier_set_semantics() {
        let mut realms = create_realms::<thread_channel::StdMpsc>(2, Codec::plain());
        let registry = Registry::<()>::new();
        let mut swarm = Swarm::new(&mut realms[0], &registry, true);

        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let notifier: ReceiveNotifier = Rc::new(move |_| counter.set(counter.get() + 1));

        assert!(swarm.add_receive_notifier(Rc::clone(&notifier)));
        assert!(!swarm.add_receive_notifier(Rc::clone(&notifier)));
        assert!(swarm.remove_receive_notifier(&notifier));
        assert!(!swarm.remove_receive_notifier(&notifier));
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn test_ordered_fold_rejects_duplicates() {
        let mut realms = create_realms::<thread_channel::StdMpsc>(2, Codec::plain());
        let mut worker = realms.pop().unwrap();
        let worker: &mut dyn Realm = &mut worker;
        for _ in 0..2 {
            let response = Response {
                index: 0,
                data: encode_plain(&1u8).unwrap(),
            };
            worker.send_to_coordinator(&response, true).unwrap();
        }

        let registry = Registry::<()>::new();
        let mut swarm = Swarm::new(&mut realms[0], &registry, true);
        let result = swarm.receive_ordered::<u8>(2, 0);
        assert!(matches!(
            result,
            Err(Error::ProtocolViolation { sender: 1, .. })
        ));
    }

    #[test]
    fn test_filtered_fold_keeps_order() {
        let mut realms = create_realms::<thread_channel::StdMpsc>(3, Codec::plain());
        let verdicts = [
            (2usize, 2usize, true),
            (1, 0, false),
            (2, 3, true),
            (1, 1, true),
        ];
        for (rank, index, keep) in verdicts {
            let realm: &mut dyn Realm = &mut realms[rank];
            let response = Response {
                index,
                data: encode_plain(&keep).unwrap(),
            };
            realm.send_to_coordinator(&response, true).unwrap();
        }

        let registry = Registry::<()>::new();
        let mut swarm = Swarm::new(&mut realms[0], &registry, true);
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        swarm.add_receive_notifier(Rc::new(move |_| counter.set(counter.get() + 1)));

        let kept = swarm.receive_filtered(vec!["a", "b", "c", "d"]).unwrap();
        assert_eq!(kept, vec!["b", "c", "d"]);
        assert_eq!(hits.get(), 4);
    }

    #[test]
    fn test_unregistered_handle_is_rejected_before_sending() {
        let mut realms = create_realms::<thread_channel::StdMpsc>(2, Codec::plain());
        let mut elsewhere = Registry::<()>::new();
        let op = elsewhere.map("double", |v: u32| v * 2).unwrap();

        let registry = Registry::<()>::new();
        let mut swarm = Swarm::new(&mut realms[0], &registry, true);
        assert!(matches!(
            swarm.map(&[1u32], &op),
            Err(Error::UnknownOperation(_))
        ));
    }
}
