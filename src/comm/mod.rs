//! SPMD distribution layer.
//!
//! A fit may run across a fixed team of cooperating worker ranks, each owning
//! a contiguous slice of the flattened spatial extent for the whole run. The
//! reduced CSD matrix is the only cross-rank data dependency; it is formed by
//! an all-reduce (sum) so every rank holds the identical matrix before its
//! local eigendecomposition. Rank identity and the reduction primitives travel
//! in an explicit [`Communicator`] handle passed into the fit; there is no
//! global communicator state.
//!
//! Failure is collective: a rank that cannot continue calls
//! [`Communicator::abort`], and every teammate's next (or current) collective
//! returns a `Distribution` error instead of waiting forever. A team that has
//! faulted stays faulted; build a fresh team for the next fit.

use crate::error::SpodError;
use num_complex::Complex64;
use num_traits::Zero;
use std::ops::Range;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// Collective-communication context for one cooperating worker rank.
pub trait Communicator {
    /// This rank's id, in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of cooperating ranks.
    fn size(&self) -> usize;

    /// Element-wise sum across all ranks. Every rank contributes `buf` and,
    /// on success, ends with identical fully-reduced contents.
    fn all_reduce_sum(&self, buf: &mut [Complex64]) -> Result<(), SpodError>;

    /// Block until every rank reaches the same phase boundary, or until a
    /// teammate aborts.
    fn barrier(&self) -> Result<(), SpodError>;

    /// Mark the team as failed. Teammates parked in a collective wake with a
    /// `Distribution` error; later collectives fail on entry.
    fn abort(&self, reason: &str);
}

/// Single-rank communicator; all collectives are no-ops.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialComm;

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_reduce_sum(&self, _buf: &mut [Complex64]) -> Result<(), SpodError> {
        Ok(())
    }

    fn barrier(&self) -> Result<(), SpodError> {
        Ok(())
    }

    fn abort(&self, _reason: &str) {}
}

struct SyncState {
    arrived: usize,
    generation: u64,
}

struct TeamState {
    size: usize,
    sync: Mutex<SyncState>,
    arrivals: Condvar,
    accum: Mutex<Vec<Complex64>>,
    fault: Mutex<Option<String>>,
}

/// Shared-memory communicator for a fixed team of threads.
///
/// One handle per rank is produced by [`ThreadComm::split`]; each handle must
/// be moved onto its own worker thread. Collectives are synchronous: a rank
/// that enters `all_reduce_sum` blocks until the whole team has contributed
/// or a teammate has aborted.
pub struct ThreadComm {
    rank: usize,
    state: Arc<TeamState>,
}

impl ThreadComm {
    /// Create one communicator handle per rank of an `n`-rank team.
    pub fn split(n: usize) -> Vec<ThreadComm> {
        let size = n.max(1);
        let state = Arc::new(TeamState {
            size,
            sync: Mutex::new(SyncState {
                arrived: 0,
                generation: 0,
            }),
            arrivals: Condvar::new(),
            accum: Mutex::new(Vec::new()),
            fault: Mutex::new(None),
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                state: Arc::clone(&state),
            })
            .collect()
    }

    fn lock_sync(&self) -> MutexGuard<'_, SyncState> {
        match self.state.sync.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record_fault(&self, reason: String) {
        {
            let mut fault = match self.state.fault.lock() {
                Ok(fault) => fault,
                Err(poisoned) => poisoned.into_inner(),
            };
            fault.get_or_insert(reason);
        }
        // Notify under the sync lock so a rank between its fault check and
        // parking on the condvar cannot miss the wakeup.
        let _sync = self.lock_sync();
        self.state.arrivals.notify_all();
    }

    fn current_fault(&self) -> Option<String> {
        match self.state.fault.lock() {
            Ok(fault) => fault.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Barrier that doubles as the fault check; returns whether this rank
    /// completed the rendezvous last.
    fn wait_checked(&self) -> Result<bool, SpodError> {
        let mut sync = self.lock_sync();
        if let Some(reason) = self.current_fault() {
            return Err(SpodError::Distribution { reason });
        }
        sync.arrived += 1;
        if sync.arrived == self.state.size {
            sync.arrived = 0;
            sync.generation = sync.generation.wrapping_add(1);
            self.state.arrivals.notify_all();
            return Ok(true);
        }
        let generation = sync.generation;
        loop {
            sync = match self.state.arrivals.wait(sync) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if sync.generation != generation {
                return Ok(false);
            }
            if let Some(reason) = self.current_fault() {
                sync.arrived -= 1;
                return Err(SpodError::Distribution { reason });
            }
        }
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.state.size
    }

    fn all_reduce_sum(&self, buf: &mut [Complex64]) -> Result<(), SpodError> {
        {
            let mut accum = match self.state.accum.lock() {
                Ok(accum) => accum,
                Err(poisoned) => poisoned.into_inner(),
            };
            if accum.is_empty() {
                accum.resize(buf.len(), Complex64::zero());
            }
            if accum.len() == buf.len() {
                for (acc, contrib) in accum.iter_mut().zip(buf.iter()) {
                    *acc += *contrib;
                }
            } else {
                let reason = format!(
                    "all-reduce length mismatch: rank {} contributed {} elements, team buffer holds {}",
                    self.rank,
                    buf.len(),
                    accum.len()
                );
                drop(accum);
                self.record_fault(reason);
            }
        }
        self.wait_checked()?;

        {
            let accum = match self.state.accum.lock() {
                Ok(accum) => accum,
                Err(poisoned) => poisoned.into_inner(),
            };
            buf.copy_from_slice(&accum);
        }
        if self.wait_checked()? {
            let mut accum = match self.state.accum.lock() {
                Ok(accum) => accum,
                Err(poisoned) => poisoned.into_inner(),
            };
            accum.clear();
        }
        self.wait_checked()?;
        Ok(())
    }

    fn barrier(&self) -> Result<(), SpodError> {
        self.wait_checked().map(|_| ())
    }

    fn abort(&self, reason: &str) {
        self.record_fault(reason.to_string());
    }
}

/// Near-equal contiguous slice of `n_points` owned by `rank` out of `size`.
pub fn partition(n_points: usize, size: usize, rank: usize) -> Result<Range<usize>, SpodError> {
    if size == 0 {
        return Err(SpodError::Distribution {
            reason: "team size must be greater than zero".into(),
        });
    }
    if rank >= size {
        return Err(SpodError::Distribution {
            reason: format!("rank {rank} outside team of {size}"),
        });
    }
    let base = n_points / size;
    let extra = n_points % size;
    let start = rank * base + rank.min(extra);
    let len = base + usize::from(rank < extra);
    Ok(start..start + len)
}
