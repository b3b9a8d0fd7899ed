use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{mpsc, Arc, Barrier, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// How coupled patches exchange data during a boundary evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommsType {
    Blocking,
    NonBlocking,
    Scheduled,
}

impl CommsType {
    pub const NAMES: [&'static str; 3] = ["blocking", "nonBlocking", "scheduled"];

    pub fn name(self) -> &'static str {
        match self {
            CommsType::Blocking => "blocking",
            CommsType::NonBlocking => "nonBlocking",
            CommsType::Scheduled => "scheduled",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            CommsType::Blocking => 0,
            CommsType::NonBlocking => 1,
            CommsType::Scheduled => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => CommsType::Blocking,
            2 => CommsType::Scheduled,
            _ => CommsType::NonBlocking,
        }
    }
}

impl fmt::Display for CommsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CommsType {
    type Err = CommsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blocking" => Ok(CommsType::Blocking),
            "nonBlocking" => Ok(CommsType::NonBlocking),
            "scheduled" => Ok(CommsType::Scheduled),
            other => Err(CommsError::UnsupportedCommsType {
                name: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommsError {
    #[error("unsupported communications type '{name}', valid types are {:?}", CommsType::NAMES)]
    UnsupportedCommsType { name: String },
    #[error("rank {rank}: lost connection to rank {peer}")]
    Disconnected { rank: usize, peer: usize },
    #[error("rank {rank}: invalid peer rank {peer} in a run of {n_procs} processors")]
    InvalidRank {
        rank: usize,
        peer: usize,
        n_procs: usize,
    },
}

pub enum Message {
    Sum(f64),
    Patch { tag: usize, data: Vec<f64> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingRecv {
    from: usize,
    tag: usize,
}

/// Message passing between the partitions of a decomposed case.
///
/// One `Pstream` per partition. Channels are unbounded, so a send never
/// blocks; receives match on `(source, tag)` and park out-of-order arrivals.
/// Non-blocking receives are recorded as outstanding requests and completed
/// by [`Pstream::wait_requests`].
pub struct Pstream {
    rank: usize,
    n_procs: usize,
    txs: Vec<mpsc::Sender<Message>>,
    rxs: Vec<Mutex<mpsc::Receiver<Message>>>,
    parked: Vec<Mutex<VecDeque<Message>>>,
    barrier: Arc<Barrier>,
    default_comms_type: AtomicU8,
    requests: Mutex<Vec<PendingRecv>>,
    completed: Mutex<HashMap<(usize, usize), VecDeque<Vec<f64>>>>,
    wait_stats: Mutex<HashMap<String, Duration>>,
}

impl fmt::Debug for Pstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pstream")
            .field("rank", &self.rank)
            .field("n_procs", &self.n_procs)
            .field("default_comms_type", &self.default_comms_type())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Pstream {
    pub fn serial() -> Self {
        Self {
            rank: 0,
            n_procs: 1,
            txs: Vec::new(),
            rxs: Vec::new(),
            parked: Vec::new(),
            barrier: Arc::new(Barrier::new(1)),
            default_comms_type: AtomicU8::new(CommsType::NonBlocking.to_u8()),
            requests: Mutex::new(Vec::new()),
            completed: Mutex::new(HashMap::new()),
            wait_stats: Mutex::new(HashMap::new()),
        }
    }

    /// Creates `n_procs` fully connected endpoints, one per partition.
    pub fn connected(n_procs: usize) -> Vec<Pstream> {
        let barrier = Arc::new(Barrier::new(n_procs));

        let mut txs: Vec<Vec<mpsc::Sender<Message>>> = (0..n_procs).map(|_| Vec::new()).collect();
        let mut rxs: Vec<Vec<Mutex<mpsc::Receiver<Message>>>> =
            (0..n_procs).map(|_| Vec::new()).collect();
        for to in 0..n_procs {
            for from_txs in txs.iter_mut() {
                let (tx, rx) = mpsc::channel();
                from_txs.push(tx);
                rxs[to].push(Mutex::new(rx));
            }
        }

        txs.into_iter()
            .zip(rxs)
            .enumerate()
            .map(|(rank, (txs, rxs))| Self {
                rank,
                n_procs,
                txs,
                rxs,
                parked: (0..n_procs).map(|_| Mutex::new(VecDeque::new())).collect(),
                barrier: barrier.clone(),
                default_comms_type: AtomicU8::new(CommsType::NonBlocking.to_u8()),
                requests: Mutex::new(Vec::new()),
                completed: Mutex::new(HashMap::new()),
                wait_stats: Mutex::new(HashMap::new()),
            })
            .collect()
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn n_procs(&self) -> usize {
        self.n_procs
    }

    pub fn par_run(&self) -> bool {
        self.n_procs > 1
    }

    pub fn master(&self) -> bool {
        self.rank == 0
    }

    pub fn default_comms_type(&self) -> CommsType {
        CommsType::from_u8(self.default_comms_type.load(Ordering::Relaxed))
    }

    pub fn set_default_comms_type(&self, comms_type: CommsType) {
        log::debug!("rank {}: commsType set to {comms_type}", self.rank);
        self.default_comms_type
            .store(comms_type.to_u8(), Ordering::Relaxed);
    }

    pub fn with_comms_type(self, comms_type: CommsType) -> Self {
        self.set_default_comms_type(comms_type);
        self
    }

    fn check_peer(&self, peer: usize) -> Result<(), CommsError> {
        if peer < self.n_procs && peer != self.rank {
            Ok(())
        } else {
            Err(CommsError::InvalidRank {
                rank: self.rank,
                peer,
                n_procs: self.n_procs,
            })
        }
    }

    pub fn send(&self, to: usize, tag: usize, data: Vec<f64>) -> Result<(), CommsError> {
        self.check_peer(to)?;
        self.txs[to]
            .send(Message::Patch { tag, data })
            .map_err(|_| CommsError::Disconnected {
                rank: self.rank,
                peer: to,
            })
    }

    /// Non-blocking send. Channels are unbounded, so the request completes on
    /// posting and is not counted by `n_requests`.
    pub fn isend(&self, to: usize, tag: usize, data: Vec<f64>) -> Result<(), CommsError> {
        self.send(to, tag, data)
    }

    /// Posts a receive to be completed by the next `wait_requests`.
    pub fn irecv(&self, from: usize, tag: usize) -> Result<(), CommsError> {
        self.check_peer(from)?;
        lock(&self.requests).push(PendingRecv { from, tag });
        Ok(())
    }

    pub fn n_requests(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Blocks until every request issued at or after index `start` has completed.
    pub fn wait_requests(&self, start: usize) -> Result<(), CommsError> {
        let pending: Vec<PendingRecv> = {
            let mut requests = lock(&self.requests);
            let start = start.min(requests.len());
            requests.drain(start..).collect()
        };

        let begin = Instant::now();
        for request in pending {
            let data = self.recv_patch(request.from, request.tag)?;
            lock(&self.completed)
                .entry((request.from, request.tag))
                .or_default()
                .push_back(data);
        }
        self.record_wait("wait_requests", begin.elapsed());
        Ok(())
    }

    /// Returns data from a completed request if one exists, otherwise blocks.
    pub fn receive(&self, from: usize, tag: usize) -> Result<Vec<f64>, CommsError> {
        self.check_peer(from)?;
        if let Some(data) = lock(&self.completed)
            .get_mut(&(from, tag))
            .and_then(VecDeque::pop_front)
        {
            return Ok(data);
        }

        let begin = Instant::now();
        let data = self.recv_patch(from, tag)?;
        self.record_wait("receive", begin.elapsed());
        Ok(data)
    }

    fn recv_patch(&self, from: usize, tag: usize) -> Result<Vec<f64>, CommsError> {
        let message = self.recv_matching(from, |message| {
            matches!(message, Message::Patch { tag: t, .. } if *t == tag)
        })?;
        match message {
            Message::Patch { data, .. } => Ok(data),
            Message::Sum(_) => Ok(Vec::new()),
        }
    }

    fn recv_sum(&self, from: usize) -> Result<f64, CommsError> {
        match self.recv_matching(from, |message| matches!(message, Message::Sum(_)))? {
            Message::Sum(v) => Ok(v),
            Message::Patch { .. } => Ok(0.0),
        }
    }

    fn recv_matching(
        &self,
        from: usize,
        wanted: impl Fn(&Message) -> bool,
    ) -> Result<Message, CommsError> {
        {
            let mut parked = lock(&self.parked[from]);
            if let Some(pos) = parked.iter().position(&wanted) {
                if let Some(message) = parked.remove(pos) {
                    return Ok(message);
                }
            }
        }

        let rx = lock(&self.rxs[from]);
        loop {
            let message = rx.recv().map_err(|_| CommsError::Disconnected {
                rank: self.rank,
                peer: from,
            })?;
            if wanted(&message) {
                return Ok(message);
            }
            lock(&self.parked[from]).push_back(message);
        }
    }

    pub fn barrier(&self) {
        let begin = Instant::now();
        self.barrier.wait();
        self.record_wait("barrier", begin.elapsed());
    }

    pub fn all_reduce_sum(&self, value: f64) -> Result<f64, CommsError> {
        if !self.par_run() {
            return Ok(value);
        }

        // Gather on the master, then broadcast.
        if self.master() {
            let mut sum = value;
            for peer in 1..self.n_procs {
                sum += self.recv_sum(peer)?;
            }
            for peer in 1..self.n_procs {
                self.txs[peer]
                    .send(Message::Sum(sum))
                    .map_err(|_| CommsError::Disconnected {
                        rank: self.rank,
                        peer,
                    })?;
            }
            Ok(sum)
        } else {
            self.txs[0]
                .send(Message::Sum(value))
                .map_err(|_| CommsError::Disconnected {
                    rank: self.rank,
                    peer: 0,
                })?;
            self.recv_sum(0)
        }
    }

    /// Logical AND over all partitions.
    pub fn reduce_and(&self, value: bool) -> Result<bool, CommsError> {
        let failures = self.all_reduce_sum(if value { 0.0 } else { 1.0 })?;
        Ok(failures == 0.0)
    }

    fn record_wait(&self, label: &str, duration: Duration) {
        *lock(&self.wait_stats)
            .entry(label.to_string())
            .or_default() += duration;
        if duration.as_millis() > 2 {
            log::debug!("rank {} slow {label}: {duration:?}", self.rank);
        }
    }

    pub fn wait_time(&self, label: &str) -> Duration {
        lock(&self.wait_stats)
            .get(label)
            .copied()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn comms_type_names_round_trip() {
        for name in CommsType::NAMES {
            assert_eq!(name.parse::<CommsType>().unwrap().name(), name);
        }
        let err = "eager".parse::<CommsType>().unwrap_err();
        assert!(err.to_string().contains("eager"));
    }

    #[test]
    fn serial_stream_is_not_parallel() {
        let serial = Pstream::serial();
        assert!(!serial.par_run());
        assert_eq!(serial.all_reduce_sum(3.0).unwrap(), 3.0);
        assert!(serial.send(1, 0, vec![1.0]).is_err());
    }

    #[test]
    fn tagged_receive_parks_out_of_order_messages() {
        let mut streams = Pstream::connected(2);
        let p1 = streams.pop().unwrap();
        let p0 = streams.pop().unwrap();

        p1.send(0, 7, vec![7.0]).unwrap();
        p1.send(0, 3, vec![3.0]).unwrap();

        assert_eq!(p0.receive(1, 3).unwrap(), vec![3.0]);
        assert_eq!(p0.receive(1, 7).unwrap(), vec![7.0]);
    }

    #[test]
    fn wait_requests_completes_posted_receives() {
        let mut streams = Pstream::connected(2);
        let p1 = streams.pop().unwrap();
        let p0 = streams.pop().unwrap();

        let start = p0.n_requests();
        p0.irecv(1, 5).unwrap();
        assert_eq!(p0.n_requests(), start + 1);

        let sender = thread::spawn(move || {
            p1.send(0, 5, vec![1.0, 2.0]).unwrap();
            p1
        });
        p0.wait_requests(start).unwrap();
        assert_eq!(p0.n_requests(), start);
        assert_eq!(p0.receive(1, 5).unwrap(), vec![1.0, 2.0]);
        sender.join().unwrap();
    }

    #[test]
    fn reductions_agree_across_ranks() {
        let handles: Vec<_> = Pstream::connected(3)
            .into_iter()
            .map(|stream| {
                thread::spawn(move || {
                    let sum = stream.all_reduce_sum(stream.rank() as f64 + 1.0).unwrap();
                    let all = stream.reduce_and(stream.rank() != 1).unwrap();
                    (sum, all)
                })
            })
            .collect();

        for handle in handles {
            let (sum, all) = handle.join().unwrap();
            assert_eq!(sum, 6.0);
            assert!(!all);
        }
    }
}
