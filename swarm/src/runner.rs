//! Construction surface: pick a transport, start the nodes, run the
//! coordinator body on rank 0.

use std::fmt;

use crate::codec::{Codec, DEFAULT_COMPRESSION_LEVEL};
use crate::error::{Error, Result};
use crate::realm::threads::launch;
use crate::realm::{COORDINATOR, Realm};
use crate::registry::Registry;
use crate::swarm::Swarm;
use crate::worker::Worker;

#[cfg(feature = "crossbeam")]
type Backend = thread_channel::CrossbeamMpsc;
#[cfg(not(feature = "crossbeam"))]
type Backend = thread_channel::StdMpsc;

/// Outstanding non-blocking sends tolerated before completed ones are
/// reclaimed.
pub const DEFAULT_RECLAIM_THRESHOLD: usize = 1024 * 1024;

/// Which realm a run is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// One process, `workers` threads next to the calling one.
    Threads { workers: usize },
    /// One MPI rank per node, sized by the external launcher.
    Cluster,
}

impl Transport {
    pub fn from_name(name: &str, workers: usize) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "threads" => {
                if workers == 0 {
                    return Err(Error::InvalidArgument(
                        "thread transport needs at least one worker".to_string(),
                    ));
                }
                Ok(Transport::Threads { workers })
            }
            "cluster" | "mpi" => {
                if cfg!(feature = "cluster") {
                    Ok(Transport::Cluster)
                } else {
                    Err(Error::InvalidArgument(
                        "built without the `cluster` feature".to_string(),
                    ))
                }
            }
            _ => Err(Error::UnknownTransport(name.to_string())),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Threads { workers } => write!(f, "threads({})", workers),
            Transport::Cluster => write!(f, "cluster"),
        }
    }
}

/// Run-wide settings. Every node must use the same values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwarmConfig {
    /// zlib-compress every frame.
    pub compression: bool,
    pub compression_level: u32,
    /// Threads only: coordinator task sends wait for acceptance. The cluster
    /// transport always sends non-blocking.
    pub blocking_sends: bool,
    /// Cluster only: in-flight sends queued before completed ones are swept.
    pub reclaim_threshold: usize,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            compression: false,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            blocking_sends: true,
            reclaim_threshold: DEFAULT_RECLAIM_THRESHOLD,
        }
    }
}

impl SwarmConfig {
    pub fn validate(&self) -> Result<()> {
        if self.compression_level > 9 {
            return Err(Error::InvalidArgument(format!(
                "compression level must be 0-9, got {}",
                self.compression_level
            )));
        }
        if self.reclaim_threshold == 0 {
            return Err(Error::InvalidArgument(
                "reclaim threshold must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn codec(&self) -> Codec {
        if self.compression {
            Codec::compressed(self.compression_level)
        } else {
            Codec::plain()
        }
    }
}

/// Starts a run and executes `code` on the coordinator.
///
/// Returns `Some` with the body's value on rank 0 and `None` on cluster
/// workers once they have been stopped. Construction problems come back as
/// errors before any node starts; anything that fails after that ends the
/// process.
pub fn run<C, T, F>(
    transport: Transport,
    registry: &Registry<C>,
    config: SwarmConfig,
    code: F,
) -> Result<Option<T>>
where
    F: FnOnce(&mut Swarm<'_, C>) -> Result<T>,
{
    config.validate()?;
    match transport {
        Transport::Threads { workers } => run_threads(workers, registry, config, code).map(Some),
        Transport::Cluster => run_cluster(registry, config, code),
    }
}

/// In-process run with default settings.
pub fn threads<C, T, F>(workers: usize, registry: &Registry<C>, code: F) -> Result<T>
where
    F: FnOnce(&mut Swarm<'_, C>) -> Result<T>,
{
    run_threads(workers, registry, SwarmConfig::default(), code)
}

fn run_threads<C, T, F>(
    workers: usize,
    registry: &Registry<C>,
    config: SwarmConfig,
    code: F,
) -> Result<T>
where
    F: FnOnce(&mut Swarm<'_, C>) -> Result<T>,
{
    if workers == 0 {
        return Err(Error::InvalidArgument(
            "thread transport needs at least one worker".to_string(),
        ));
    }
    tracing::info!(
        workers,
        compression = config.compression,
        "starting thread swarm"
    );
    launch::<Backend, _, _, _>(
        workers + 1,
        config.codec(),
        |mut realm| serve(&mut realm, registry),
        |mut realm| coordinate(&mut realm, registry, &config, code),
    )
}

#[cfg(feature = "cluster")]
fn run_cluster<C, T, F>(registry: &Registry<C>, config: SwarmConfig, code: F) -> Result<Option<T>>
where
    F: FnOnce(&mut Swarm<'_, C>) -> Result<T>,
{
    use crate::realm::cluster::ClusterRealm;

    let mut realm = ClusterRealm::init(config.codec(), config.reclaim_threshold)?;
    let (rank, total) = (realm.rank(), realm.total());
    if total < 2 {
        return Err(Error::InvalidArgument(format!(
            "cluster run needs at least 2 ranks, launcher started {}",
            total
        )));
    }
    if rank == COORDINATOR {
        tracing::info!(
            total,
            compression = config.compression,
            "starting cluster swarm"
        );
        Ok(Some(coordinate(&mut realm, registry, &config, code)))
    } else {
        if let Err(e) = serve(&mut realm, registry) {
            fatal(rank, &e);
        }
        Ok(None)
    }
}

#[cfg(not(feature = "cluster"))]
fn run_cluster<C, T, F>(
    _registry: &Registry<C>,
    _config: SwarmConfig,
    _code: F,
) -> Result<Option<T>>
where
    F: FnOnce(&mut Swarm<'_, C>) -> Result<T>,
{
    Err(Error::InvalidArgument(
        "built without the `cluster` feature".to_string(),
    ))
}

fn serve<C>(realm: &mut dyn Realm, registry: &Registry<C>) -> Result<()> {
    Worker::new(realm, registry).run()
}

fn coordinate<C, T, F>(
    realm: &mut dyn Realm,
    registry: &Registry<C>,
    config: &SwarmConfig,
    code: F,
) -> T
where
    F: FnOnce(&mut Swarm<'_, C>) -> Result<T>,
{
    let mut swarm = Swarm::new(realm, registry, config.blocking_sends);
    let value = match code(&mut swarm) {
        Ok(value) => value,
        Err(e) => fatal(COORDINATOR, &e),
    };
    if let Err(e) = swarm.stop() {
        fatal(COORDINATOR, &e);
    }
    tracing::info!(pending_sends = swarm.pending_sends(), "swarm stopped");
    value
}

/// Logs `err` and terminates the process. Other nodes would block forever on
/// a node that is gone, so there is nothing to unwind to.
pub(crate) fn fatal(rank: usize, err: &dyn fmt::Display) -> ! {
    tracing::error!(rank, error = %err, "node failed, terminating");
    std::process::exit(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_from_name() {
        assert_eq!(
            Transport::from_name("threads", 3).unwrap(),
            Transport::Threads { workers: 3 }
        );
        assert_eq!(
            Transport::from_name("Threads", 1).unwrap(),
            Transport::Threads { workers: 1 }
        );
        assert!(matches!(
            Transport::from_name("threads", 0),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            Transport::from_name("carrier-pigeon", 2),
            Err(Error::UnknownTransport(name)) if name == "carrier-pigeon"
        ));
        assert_eq!(
            Transport::from_name("mpi", 0).is_ok(),
            cfg!(feature = "cluster")
        );
    }

    #[test]
    fn test_config_validation() {
        let config = SwarmConfig::default();
        config.validate().unwrap();
        assert!(!config.codec().is_compressed());

        let packed = SwarmConfig {
            compression: true,
            ..config
        };
        assert!(packed.codec().is_compressed());

        let bad = SwarmConfig {
            compression_level: 12,
            ..config
        };
        assert!(matches!(bad.validate(), Err(Error::InvalidArgument(_))));

        let bad = SwarmConfig {
            reclaim_threshold: 0,
            ..config
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_zero_workers_fails_before_start() {
        let registry = Registry::<()>::new();
        let result = threads(0, &registry, |_| Ok(()));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_empty_body_stops_cleanly() {
        let registry = Registry::<()>::new();
        let size = threads(2, &registry, |swarm| Ok(swarm.size())).unwrap();
        assert_eq!(size, 3);
    }
}
