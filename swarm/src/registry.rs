//! Named operations that tasks refer to.
//!
//! Every node builds the same registry before the run starts, so a task only
//! has to carry an operation name and plain-data arguments. Registration
//! hands back a typed [`Op`] handle; the coordinator API only accepts handles
//! of the right kind, which keeps e.g. a context operation out of `map`.
//!
//! Handlers are type-erased to bytes in and bytes out here, at registration
//! time, where the argument and result types are still known.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::codec::{decode_plain, encode_plain};
use crate::error::{Error, Result};

/// Marker types for [`Op`] kinds.
pub mod kind {
    /// `T -> R`, one task per element.
    pub struct Map;
    /// `(&mut C, T) -> R`, one task per element.
    pub struct MapContext;
    /// `rank -> C`, once per worker.
    pub struct Factory;
    /// `rank -> ()`, once per worker.
    pub struct Each;
    /// `&mut C -> ()`, once per worker.
    pub struct EachContext;
    /// `&C -> R`, once per worker.
    pub struct Get;
}

/// Typed handle onto a registered operation.
pub struct Op<K, I, O> {
    name: Arc<str>,
    _marker: PhantomData<fn(I) -> (K, O)>,
}

impl<K, I, O> Op<K, I, O> {
    fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<K, I, O> Clone for Op<K, I, O> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            _marker: PhantomData,
        }
    }
}

impl<K, I, O> fmt::Debug for Op<K, I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Op").field(&self.name).finish()
    }
}

pub type MapOp<T, R> = Op<kind::Map, T, R>;
pub type ContextMapOp<T, R> = Op<kind::MapContext, T, R>;
pub type FactoryOp = Op<kind::Factory, usize, ()>;
pub type EachOp = Op<kind::Each, usize, ()>;
pub type EachContextOp = Op<kind::EachContext, (), ()>;
pub type GetOp<R> = Op<kind::Get, (), R>;

type MapFn = Box<dyn Fn(&[u8]) -> Result<Vec<u8>> + Send + Sync>;
type ContextMapFn<C> = Box<dyn Fn(&mut C, &[u8]) -> Result<Vec<u8>> + Send + Sync>;
type FactoryFn<C> = Box<dyn Fn(usize) -> C + Send + Sync>;
type EachFn = Box<dyn Fn(usize) + Send + Sync>;
type EachContextFn<C> = Box<dyn Fn(&mut C) + Send + Sync>;
type GetFn<C> = Box<dyn Fn(&C) -> Result<Vec<u8>> + Send + Sync>;

/// A registered operation with its argument/result encoding baked in.
pub enum Handler<C> {
    Map(MapFn),
    MapContext(ContextMapFn<C>),
    Factory(FactoryFn<C>),
    Each(EachFn),
    EachContext(EachContextFn<C>),
    Get(GetFn<C>),
}

impl<C> Handler<C> {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Handler::Map(_) => "map",
            Handler::MapContext(_) => "map-context",
            Handler::Factory(_) => "factory",
            Handler::Each(_) => "each",
            Handler::EachContext(_) => "each-context",
            Handler::Get(_) => "get",
        }
    }
}

/// Operation table shared by every node of a run.
///
/// `C` is the per-worker context type, fixed for the whole run.
pub struct Registry<C> {
    handlers: HashMap<String, Handler<C>>,
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<C: 'static> Registry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, name: &str, handler: Handler<C>) -> Result<()> {
        if self.handlers.contains_key(name) {
            return Err(Error::DuplicateOperation(name.to_string()));
        }
        let kind = handler.kind_name();
        tracing::debug!(operation = name, kind, "registered operation");
        self.handlers.insert(name.to_string(), handler);
        Ok(())
    }

    /// Registers an element transform. Also serves as a filter predicate
    /// when `R` is `bool`.
    pub fn map<T, R, F>(&mut self, name: &str, transform: F) -> Result<MapOp<T, R>>
    where
        T: DeserializeOwned + 'static,
        R: Serialize + 'static,
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        let handler = Handler::Map(Box::new(move |payload: &[u8]| {
            let value: T = decode_plain(payload)?;
            encode_plain(&transform(value))
        }));
        self.insert(name, handler)?;
        Ok(Op::new(name))
    }

    /// Registers an element transform that also sees the worker's context.
    pub fn map_context<T, R, F>(&mut self, name: &str, transform: F) -> Result<ContextMapOp<T, R>>
    where
        T: DeserializeOwned + 'static,
        R: Serialize + 'static,
        F: Fn(&mut C, T) -> R + Send + Sync + 'static,
    {
        let handler = Handler::MapContext(Box::new(move |context: &mut C, payload: &[u8]| {
            let value: T = decode_plain(payload)?;
            encode_plain(&transform(context, value))
        }));
        self.insert(name, handler)?;
        Ok(Op::new(name))
    }

    /// Registers a context factory, called with the worker's rank.
    pub fn factory<F>(&mut self, name: &str, factory: F) -> Result<FactoryOp>
    where
        F: Fn(usize) -> C + Send + Sync + 'static,
    {
        self.insert(name, Handler::Factory(Box::new(factory)))?;
        Ok(Op::new(name))
    }

    pub fn each<F>(&mut self, name: &str, action: F) -> Result<EachOp>
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.insert(name, Handler::Each(Box::new(action)))?;
        Ok(Op::new(name))
    }

    pub fn each_context<F>(&mut self, name: &str, action: F) -> Result<EachContextOp>
    where
        F: Fn(&mut C) + Send + Sync + 'static,
    {
        self.insert(name, Handler::EachContext(Box::new(action)))?;
        Ok(Op::new(name))
    }

    /// Registers a context read-back, one result per worker.
    pub fn get<R, F>(&mut self, name: &str, action: F) -> Result<GetOp<R>>
    where
        R: Serialize + 'static,
        F: Fn(&C) -> R + Send + Sync + 'static,
    {
        let handler = Handler::Get(Box::new(move |context: &C| encode_plain(&action(context))));
        self.insert(name, handler)?;
        Ok(Op::new(name))
    }
}

impl<C> Registry<C> {
    pub fn handler(&self, name: &str) -> Result<&Handler<C>> {
        self.handlers
            .get(name)
            .ok_or_else(|| Error::UnknownOperation(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Counter {
        hits: u32,
    }

    #[test]
    fn test_map_handler_round_trip() {
        let mut registry = Registry::<Counter>::new();
        let op = registry
            .map("double", |v: u64| v * 2)
            .unwrap();
        assert_eq!(op.name(), "double");

        let Handler::Map(f) = registry.handler("double").unwrap() else {
            panic!("expected a map handler");
        };
        let out = f(&encode_plain(&21u64).unwrap()).unwrap();
        assert_eq!(decode_plain::<u64>(&out).unwrap(), 42);
    }

    #[test]
    fn test_context_handlers_share_state() {
        let mut registry = Registry::<Counter>::new();
        registry
            .factory("init", |rank| Counter { hits: rank as u32 })
            .unwrap();
        registry
            .map_context("bump", |ctx: &mut Counter, by: u32| {
                ctx.hits += by;
                ctx.hits
            })
            .unwrap();
        registry.get("hits", |ctx: &Counter| ctx.hits).unwrap();

        let Handler::Factory(init) = registry.handler("init").unwrap() else {
            panic!("expected a factory");
        };
        let mut ctx = init(3);

        let Handler::MapContext(bump) = registry.handler("bump").unwrap() else {
            panic!("expected a context map");
        };
        bump(&mut ctx, &encode_plain(&4u32).unwrap()).unwrap();

        let Handler::Get(hits) = registry.handler("hits").unwrap() else {
            panic!("expected a get");
        };
        assert_eq!(decode_plain::<u32>(&hits(&ctx).unwrap()).unwrap(), 7);
    }

    #[test]
    fn test_duplicate_and_unknown_names() {
        let mut registry = Registry::<()>::new();
        registry.each("noop", |_| {}).unwrap();
        assert!(matches!(
            registry.each_context("noop", |_| {}),
            Err(Error::DuplicateOperation(name)) if name == "noop"
        ));
        assert!(matches!(
            registry.handler("missing"),
            Err(Error::UnknownOperation(name)) if name == "missing"
        ));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("noop"));
    }

    #[test]
    fn test_names_and_kinds() {
        let mut registry = Registry::<()>::new();
        registry.get("b", |_: &()| 1u8).unwrap();
        registry.map("a", |v: String| v.len()).unwrap();
        assert_eq!(registry.names(), vec!["a", "b"]);
        assert_eq!(registry.handler("a").unwrap().kind_name(), "map");
        assert_eq!(registry.handler("b").unwrap().kind_name(), "get");
    }

    #[test]
    fn test_bad_payload_is_a_codec_error() {
        let mut registry = Registry::<()>::new();
        registry.map("len", |v: String| v.len()).unwrap();
        let Handler::Map(f) = registry.handler("len").unwrap() else {
            panic!("expected a map handler");
        };
        assert!(matches!(f(&[0xff]), Err(Error::Codec(_))));
    }
}
