//! Worker loop: receive a task, run it, answer, repeat until stopped.

use serde::Serialize;

use crate::codec::encode_plain;
use crate::error::{Error, Result};
use crate::realm::{COORDINATOR, Realm, Source};
use crate::registry::{Handler, Registry};
use crate::task::{Response, Task};

/// State of one non-coordinator node.
///
/// The context is owned by this worker alone and only touched while one of
/// its tasks runs, so it needs no synchronization.
pub struct Worker<'a, C> {
    realm: &'a mut dyn Realm,
    registry: &'a Registry<C>,
    context: Option<C>,
    working: bool,
}

impl<'a, C> Worker<'a, C> {
    pub fn new(realm: &'a mut dyn Realm, registry: &'a Registry<C>) -> Self {
        Self {
            realm,
            registry,
            context: None,
            working: true,
        }
    }

    pub fn rank(&self) -> usize {
        self.realm.rank()
    }

    pub fn is_working(&self) -> bool {
        self.working
    }

    pub fn context(&self) -> Result<&C> {
        let rank = self.realm.rank();
        self.context.as_ref().ok_or(Error::MissingContext { rank })
    }

    pub fn context_mut(&mut self) -> Result<&mut C> {
        let rank = self.realm.rank();
        self.context.as_mut().ok_or(Error::MissingContext { rank })
    }

    /// Sends `result` for task `index` to the coordinator, blocking until
    /// the transport accepts it.
    pub fn response<R: Serialize + ?Sized>(&mut self, result: &R, index: usize) -> Result<()> {
        let data = encode_plain(result)?;
        self.respond(index, data)
    }

    pub fn barrier(&mut self) -> Result<()> {
        self.realm.barrier()
    }

    fn respond(&mut self, index: usize, data: Vec<u8>) -> Result<()> {
        let response = Response { index, data };
        self.realm.send_to_coordinator(&response, true)
    }

    /// Serves tasks until a `Stop` arrives.
    pub fn run(mut self) -> Result<()> {
        tracing::debug!(rank = self.rank(), "worker loop started");
        while self.working {
            let mail = self.realm.recv(Source::Any)?;
            tracing::trace!(
                rank = self.rank(),
                sender = mail.sender,
                len = mail.buffer.len(),
                "mail"
            );
            if mail.sender != COORDINATOR {
                return Err(Error::ProtocolViolation {
                    sender: mail.sender,
                    detail: "tasks may only come from the coordinator".to_string(),
                });
            }
            let task: Task = self
                .realm
                .codec()
                .decode(&mail.buffer)
                .map_err(|e| Error::ProtocolViolation {
                    sender: mail.sender,
                    detail: format!("expected a task: {}", e),
                })?;
            self.execute(task)?;
        }
        tracing::debug!(rank = self.rank(), "worker loop stopped");
        Ok(())
    }

    pub fn execute(&mut self, task: Task) -> Result<()> {
        match task {
            Task::Apply {
                index,
                operation,
                payload,
            } => self.apply(index, &operation, &payload),
            Task::Broadcast { operation, sync } => {
                self.broadcast(&operation)?;
                if sync {
                    self.barrier()?;
                }
                Ok(())
            }
            Task::Stop => {
                self.working = false;
                self.barrier()
            }
        }
    }

    fn apply(&mut self, index: usize, operation: &str, payload: &[u8]) -> Result<()> {
        let registry = self.registry;
        let data = match registry.handler(operation)? {
            Handler::Map(transform) => transform(payload)?,
            Handler::MapContext(transform) => transform(self.context_mut()?, payload)?,
            other => {
                return Err(Error::OperationKind {
                    name: operation.to_string(),
                    expected: "map or map-context",
                    found: other.kind_name(),
                });
            }
        };
        tracing::trace!(rank = self.rank(), index, operation, "applied");
        self.respond(index, data)
    }

    fn broadcast(&mut self, operation: &str) -> Result<()> {
        let registry = self.registry;
        let rank = self.rank();
        tracing::debug!(rank, operation, "broadcast task");
        match registry.handler(operation)? {
            Handler::Factory(factory) => self.context = Some(factory(rank)),
            Handler::Each(action) => action(rank),
            Handler::EachContext(action) => action(self.context_mut()?),
            Handler::Get(action) => {
                let data = action(self.context()?)?;
                self.respond(rank, data)?;
            }
            other => {
                return Err(Error::OperationKind {
                    name: operation.to_string(),
                    expected: "factory, each, each-context or get",
                    found: other.kind_name(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Codec, decode_plain};
    use crate::realm::Parcel;
    use crate::realm::threads::{ThreadRealm, create_realms};

    fn pair() -> (ThreadRealm, ThreadRealm) {
        let mut realms = create_realms(2, Codec::plain());
        let worker = realms.pop().unwrap();
        let root = realms.pop().unwrap();
        (root, worker)
    }

    fn registry() -> Registry<Vec<u32>> {
        let mut registry = Registry::new();
        registry.factory("init", |rank| vec![rank as u32]).unwrap();
        registry.map("square", |v: u32| v * v).unwrap();
        registry
            .map_context("push", |ctx: &mut Vec<u32>, v: u32| {
                ctx.push(v);
                ctx.len()
            })
            .unwrap();
        registry
            .get("snapshot", |ctx: &Vec<u32>| ctx.clone())
            .unwrap();
        registry
    }

    fn apply(index: usize, operation: &str, value: u32) -> Task {
        Task::Apply {
            index,
            operation: operation.to_string(),
            payload: encode_plain(&value).unwrap(),
        }
    }

    fn recv_response(root: &mut ThreadRealm) -> Parcel<Response> {
        let root: &mut dyn Realm = root;
        root.recv_parcel(Source::Any).unwrap()
    }

    #[test]
    fn test_apply_map_answers_with_index() {
        let (mut root, mut realm) = pair();
        let registry = registry();
        let mut worker = Worker::new(&mut realm, &registry);
        worker.execute(apply(5, "square", 7)).unwrap();

        let parcel = recv_response(&mut root);
        assert_eq!(parcel.sender, 1);
        assert_eq!(parcel.payload.index, 5);
        assert_eq!(decode_plain::<u32>(&parcel.payload.data).unwrap(), 49);
    }

    #[test]
    fn test_response_reaches_coordinator() {
        let (mut root, mut realm) = pair();
        let registry = registry();
        let mut worker = Worker::new(&mut realm, &registry);
        assert_eq!(worker.rank(), 1);
        worker.response("partial", 3).unwrap();

        let parcel = recv_response(&mut root);
        assert_eq!(parcel.payload.index, 3);
        assert_eq!(
            decode_plain::<String>(&parcel.payload.data).unwrap(),
            "partial"
        );
    }

    #[test]
    fn test_context_lifecycle() {
        let (mut root, mut realm) = pair();
        let registry = registry();
        let mut worker = Worker::new(&mut realm, &registry);

        assert!(matches!(
            worker.execute(apply(0, "push", 1)),
            Err(Error::MissingContext { rank: 1 })
        ));

        worker
            .execute(Task::Broadcast {
                operation: "init".into(),
                sync: false,
            })
            .unwrap();
        worker.execute(apply(0, "push", 9)).unwrap();
        worker
            .execute(Task::Broadcast {
                operation: "snapshot".into(),
                sync: false,
            })
            .unwrap();
        assert_eq!(worker.context().unwrap(), &vec![1, 9]);

        let pushed = recv_response(&mut root);
        assert_eq!(decode_plain::<usize>(&pushed.payload.data).unwrap(), 2);
        let snapshot = recv_response(&mut root);
        assert_eq!(snapshot.payload.index, 1);
        assert_eq!(
            decode_plain::<Vec<u32>>(&snapshot.payload.data).unwrap(),
            vec![1, 9]
        );
    }

    #[test]
    fn test_wrong_kind_and_unknown_operation() {
        let (_root, mut realm) = pair();
        let registry = registry();
        let mut worker = Worker::new(&mut realm, &registry);

        assert!(matches!(
            worker.execute(apply(0, "init", 0)),
            Err(Error::OperationKind {
                found: "factory",
                ..
            })
        ));
        assert!(matches!(
            worker.execute(Task::Broadcast {
                operation: "square".into(),
                sync: false,
            }),
            Err(Error::OperationKind { found: "map", .. })
        ));
        assert!(matches!(
            worker.execute(apply(0, "nope", 0)),
            Err(Error::UnknownOperation(_))
        ));
    }

    #[test]
    fn test_run_rejects_non_task_payload() {
        let (mut root, mut realm) = pair();
        root.send(vec![0xff; 3], 1, true).unwrap();
        let registry = registry();
        let result = Worker::new(&mut realm, &registry).run();
        assert!(matches!(
            result,
            Err(Error::ProtocolViolation { sender: 0, .. })
        ));
    }

    #[test]
    fn test_run_until_stop() {
        let registry = registry();
        let mut realms = create_realms::<thread_channel::StdMpsc>(2, Codec::plain());
        let mut realm = realms.pop().unwrap();
        let mut root = realms.pop().unwrap();

        std::thread::scope(|s| {
            let registry = &registry;
            let handle = s.spawn(move || Worker::new(&mut realm, registry).run());

            let root: &mut dyn Realm = &mut root;
            let frame = root.pack(&apply(0, "square", 3)).unwrap();
            root.send(frame, 1, true).unwrap();
            let response = root.recv_parcel::<Response>(Source::Rank(1)).unwrap();
            assert_eq!(decode_plain::<u32>(&response.payload.data).unwrap(), 9);

            let stop = root.pack(&Task::Stop).unwrap();
            root.send(stop, 1, true).unwrap();
            root.barrier().unwrap();
            handle.join().unwrap().unwrap();
        });
    }
}
