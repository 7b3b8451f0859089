//! Distributed-memory reduction: one worker per process, combined with a collective sum over TCP.
//!
//! The process with rank 0 is the coordinator. The reduction has three phases:
//!
//! 1. *join*: every other rank connects to the coordinator and introduces itself with its rank.
//! Peers keep retrying until the coordinator listens, and the coordinator waits at most for its
//! timeout until all ranks have joined,
//! 2. *contribute*: every rank evaluates its share of the samples and sends its partial
//! statistics as a single line of JSON on the connection it joined with,
//! 3. *total*: the coordinator adds the contributions in rank order and sends the total back on
//! every connection, so that all ranks finish with the same result.
//!
//! There is no recovery: a rank that aborts, disconnects or does not join in time fails the
//! whole reduction, and the coordinator dropping its connections fails every rank still waiting
//! for the total.

use crate::core::error::Error;
use crate::core::estimators::PartialStatistics;
use crate::reduce::{sum_in_order, Reducer};

use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How long peers try to reach the coordinator, and how long the coordinator waits for all peers
/// to join, unless set otherwise with [`TcpReducer::with_timeout`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// A line on the wire.
#[derive(Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Message {
    /// Rank `rank` of a reduction over `size` ranks connects to the coordinator.
    Join { rank: u32, size: u32 },
    /// The partial statistics of the rank that joined on this connection.
    Contribution { partial: PartialStatistics<f64> },
    /// Rank `rank` gave up; the reduction must fail.
    Abort { rank: u32, reason: String },
    /// The coordinator's answer to every contribution.
    Total { total: PartialStatistics<f64> },
}

fn send<W: Write>(stream: &mut W, message: &Message) -> Result<(), Error> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    stream.write_all(&line)?;
    stream.flush()?;
    Ok(())
}

/// Returns `None` if the other side closed the connection.
fn receive<R: BufRead>(reader: &mut R) -> Result<Option<Message>, Error> {
    let mut line = String::new();

    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }

    Ok(Some(serde_json::from_str(&line)?))
}

/// Connect to `address`, retrying until `timeout` has passed. A zero timeout tries once.
fn connect<A>(address: &A, timeout: Duration) -> Result<TcpStream, Error>
where
    A: ToSocketAddrs + ?Sized,
{
    let deadline = Instant::now() + timeout;

    loop {
        match TcpStream::connect(address) {
            Ok(stream) => return Ok(stream),
            Err(err) if Instant::now() < deadline => {
                debug!(%err, "coordinator not reachable yet");
                thread::sleep(RETRY_INTERVAL);
            }
            Err(err) => return Err(err.into()),
        }
    }
}

#[derive(Debug)]
enum Role {
    Coordinator(TcpListener),
    Peer(String),
}

/// One rank of a reduction spread over several processes.
#[derive(Debug)]
pub struct TcpReducer {
    rank: u32,
    size: u32,
    timeout: Duration,
    role: Role,
}

impl TcpReducer {
    /// Make this process the coordinator (rank 0) of `size` ranks, accepting the other ranks on
    /// `listener`.
    ///
    /// # Errors
    ///
    /// Fails if `size` is zero.
    pub fn coordinator(listener: TcpListener, size: u32) -> Result<Self, Error> {
        if size == 0 {
            return Err(Error::InvalidWorkerCount(
                "at least one process is required".to_string(),
            ));
        }

        Ok(Self {
            rank: 0,
            size,
            timeout: DEFAULT_TIMEOUT,
            role: Role::Coordinator(listener),
        })
    }

    /// Bind a listener to `address` and make this process the coordinator of `size` ranks.
    ///
    /// # Errors
    ///
    /// Fails if `size` is zero or the address cannot be bound.
    pub fn bind<A: ToSocketAddrs>(address: A, size: u32) -> Result<Self, Error> {
        Self::coordinator(TcpListener::bind(address)?, size)
    }

    /// Make this process rank `rank` of `size` ranks, reporting to the coordinator listening on
    /// `coordinator`. Nothing is sent before [`Reducer::reduce`] is called.
    ///
    /// # Errors
    ///
    /// Fails unless `0 < rank < size`.
    pub fn peer<S: Into<String>>(coordinator: S, rank: u32, size: u32) -> Result<Self, Error> {
        if rank == 0 || rank >= size {
            return Err(Error::InvalidWorkerCount(format!(
                "rank {} is not a peer rank among {} processes",
                rank, size
            )));
        }

        Ok(Self {
            rank,
            size,
            timeout: DEFAULT_TIMEOUT,
            role: Role::Peer(coordinator.into()),
        })
    }

    /// For a peer, how long to keep trying to reach the coordinator; for the coordinator, how
    /// long to wait for all peers to join.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the rank of this process.
    pub const fn rank(&self) -> u32 {
        self.rank
    }

    /// Returns the address the coordinator listens on, or `None` for a peer.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.role {
            Role::Coordinator(listener) => listener.local_addr().ok(),
            Role::Peer(_) => None,
        }
    }

    /// Tell the coordinator at `coordinator` that rank `rank` cannot contribute, which makes the
    /// reduction fail on all ranks. Connecting is retried until `timeout` has passed.
    ///
    /// # Errors
    ///
    /// Fails if the coordinator cannot be reached.
    pub fn abort<A: ToSocketAddrs>(
        coordinator: A,
        rank: u32,
        reason: &str,
        timeout: Duration,
    ) -> Result<(), Error> {
        let mut stream = connect(&coordinator, timeout)?;
        send(
            &mut stream,
            &Message::Abort {
                rank,
                reason: reason.to_string(),
            },
        )
    }
}

impl Reducer for TcpReducer {
    fn workers(&self) -> u32 {
        self.size
    }

    fn reduce<F>(&mut self, worker: F) -> Result<PartialStatistics<f64>, Error>
    where
        F: Fn(u32) -> PartialStatistics<f64> + Sync,
    {
        match &self.role {
            Role::Coordinator(listener) => {
                let peers = join(listener, self.size, self.timeout)?;
                gather(peers, worker(self.rank))
            }
            Role::Peer(address) => {
                let mut stream = connect(address.as_str(), self.timeout)?;
                send(
                    &mut stream,
                    &Message::Join {
                        rank: self.rank,
                        size: self.size,
                    },
                )?;

                debug!(rank = self.rank, %address, "joined the reduction");

                contribute(stream, self.rank, worker(self.rank))
            }
        }
    }
}

/// The connection of a rank that has joined.
struct Peer {
    rank: u32,
    reader: BufReader<TcpStream>,
}

fn join(listener: &TcpListener, size: u32, timeout: Duration) -> Result<Vec<Peer>, Error> {
    let deadline = Instant::now() + timeout;
    let mut slots = (0..size).map(|_| None).collect::<Vec<Option<Peer>>>();
    let mut joined = 1;

    listener.set_nonblocking(true)?;

    while joined < size {
        let (stream, address) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    let missing = slots
                        .iter()
                        .skip(1)
                        .position(Option::is_none)
                        .map_or(0, |index| index as u32 + 1);

                    return Err(Error::WorkerFailure {
                        worker: missing,
                        reason: format!("did not join within {:?}", timeout),
                    });
                }

                thread::sleep(RETRY_INTERVAL);
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        // a connection that never introduces itself must not outlast the join phase
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(
            deadline
                .saturating_duration_since(Instant::now())
                .max(RETRY_INTERVAL),
        ))?;

        let mut reader = BufReader::new(stream);

        match receive(&mut reader)? {
            Some(Message::Join {
                rank,
                size: peer_size,
            }) => {
                if peer_size != size {
                    return Err(Error::Protocol(format!(
                        "rank {} reduces over {} processes, but the coordinator over {}",
                        rank, peer_size, size
                    )));
                }

                match slots.get_mut(rank as usize) {
                    Some(slot) if rank != 0 && slot.is_none() => {
                        reader.get_ref().set_read_timeout(None)?;
                        *slot = Some(Peer { rank, reader });
                    }
                    _ => {
                        return Err(Error::Protocol(format!(
                            "unexpected join of rank {}",
                            rank
                        )))
                    }
                }

                debug!(rank, %address, "rank joined");
                joined += 1;
            }
            Some(Message::Abort { rank, reason }) => {
                warn!(rank, %reason, "rank aborted the reduction");
                return Err(Error::WorkerFailure {
                    worker: rank,
                    reason,
                });
            }
            Some(other) => {
                return Err(Error::Protocol(format!(
                    "{} sent {:?} instead of joining",
                    address, other
                )));
            }
            None => {
                return Err(Error::Protocol(format!(
                    "{} disconnected before joining",
                    address
                )));
            }
        }
    }

    Ok(slots.into_iter().flatten().collect())
}

fn gather(
    mut peers: Vec<Peer>,
    local: PartialStatistics<f64>,
) -> Result<PartialStatistics<f64>, Error> {
    let mut partials = Vec::with_capacity(peers.len() + 1);
    partials.push(local);

    for peer in &mut peers {
        match receive(&mut peer.reader)? {
            Some(Message::Contribution { partial }) => {
                debug!(rank = peer.rank, "received contribution");
                partials.push(partial);
            }
            Some(Message::Abort { reason, .. }) => {
                warn!(rank = peer.rank, %reason, "rank aborted the reduction");
                return Err(Error::WorkerFailure {
                    worker: peer.rank,
                    reason,
                });
            }
            Some(other) => {
                return Err(Error::Protocol(format!(
                    "rank {} sent {:?} instead of its contribution",
                    peer.rank, other
                )));
            }
            None => {
                return Err(Error::WorkerFailure {
                    worker: peer.rank,
                    reason: "disconnected before contributing".to_string(),
                });
            }
        }
    }

    let total = sum_in_order(partials);

    for peer in &mut peers {
        send(peer.reader.get_mut(), &Message::Total { total })?;
    }

    Ok(total)
}

fn contribute(
    mut stream: TcpStream,
    rank: u32,
    partial: PartialStatistics<f64>,
) -> Result<PartialStatistics<f64>, Error> {
    send(&mut stream, &Message::Contribution { partial })?;

    debug!(rank, "sent contribution, waiting for the total");

    match receive(&mut BufReader::new(stream))? {
        Some(Message::Total { total }) => Ok(total),
        Some(other) => Err(Error::Protocol(format!(
            "expected the total, received {:?}",
            other
        ))),
        None => Err(Error::WorkerFailure {
            worker: 0,
            reason: "the coordinator closed the connection before sending the total".to_string(),
        }),
    }
}
