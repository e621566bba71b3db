//! Fluent handles binding a set of items to a swarm.

use std::borrow::Borrow;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::registry::{ContextMapOp, MapOp};
use crate::swarm::Swarm;

/// A collection bound to a swarm, from [`Swarm::parallelize`]. Can be
/// mapped any number of times.
pub struct Parallel<'s, 'a, C, T> {
    swarm: &'s mut Swarm<'a, C>,
    items: Vec<T>,
}

impl<'s, 'a, C, T> Parallel<'s, 'a, C, T> {
    pub(crate) fn new(swarm: &'s mut Swarm<'a, C>, items: Vec<T>) -> Self {
        Self { swarm, items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }
}

impl<C, T: Serialize> Parallel<'_, '_, C, T> {
    pub fn map<R: DeserializeOwned>(&mut self, transform: &MapOp<T, R>) -> Result<Vec<R>> {
        self.swarm.map(&self.items, transform)
    }

    pub fn map_context<R: DeserializeOwned>(
        &mut self,
        transform: &ContextMapOp<T, R>,
    ) -> Result<Vec<R>> {
        self.swarm.map_context(&self.items, transform)
    }

    pub fn filter(self, predicate: &MapOp<T, bool>) -> Result<Vec<T>> {
        self.swarm.filter(self.items, predicate)
    }
}

/// An iterator bound to a swarm, from [`Swarm::stream`]. Nothing is pulled
/// from it until an operation runs, and that operation consumes it.
pub struct Stream<'s, 'a, C, I> {
    swarm: &'s mut Swarm<'a, C>,
    items: I,
}

impl<'s, 'a, C, I: Iterator> Stream<'s, 'a, C, I> {
    pub(crate) fn new(swarm: &'s mut Swarm<'a, C>, items: I) -> Self {
        Self { swarm, items }
    }

    pub fn map<T, R>(self, transform: &MapOp<T, R>) -> Result<Vec<R>>
    where
        T: Serialize,
        R: DeserializeOwned,
        I::Item: Borrow<T>,
    {
        self.swarm.map_iter(self.items, transform)
    }

    pub fn map_context<T, R>(self, transform: &ContextMapOp<T, R>) -> Result<Vec<R>>
    where
        T: Serialize,
        R: DeserializeOwned,
        I::Item: Borrow<T>,
    {
        self.swarm.map_context_iter(self.items, transform)
    }

    pub fn filter(self, predicate: &MapOp<I::Item, bool>) -> Result<Vec<I::Item>>
    where
        I::Item: Serialize,
    {
        self.swarm.filter_iter(self.items, predicate)
    }
}
