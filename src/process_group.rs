use std::sync::mpsc::channel as mpsc_channel;
use std::sync::mpsc::Receiver as MpscReceiver;
use std::sync::mpsc::Sender as MpscSender;
use std::thread;

use bus::{Bus, BusReader};
use core_affinity::CoreId;
use simple_error::try_with;

use crate::error::{Error, Result};
use crate::params::{self, GroupParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Min,
    Max,
}

impl ReduceOp {
    // folds in the given order, callers pass values by rank
    pub fn apply(self, values: impl IntoIterator<Item = f64>) -> f64 {
        let mut values = values.into_iter();
        let first = match values.next() {
            Some(first) => first,
            None => return 0.0,
        };

        values.fold(first, |acc, value| match self {
            ReduceOp::Sum => acc + value,
            ReduceOp::Min => acc.min(value),
            ReduceOp::Max => acc.max(value),
        })
    }
}

pub trait ProcessGroup {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    fn reduce(&mut self, value: f64, op: ReduceOp) -> Result<f64>;
    fn abort(&mut self, reason: &str);
}

#[derive(Debug, Default)]
pub struct SingleProcess;

impl ProcessGroup for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn reduce(&mut self, value: f64, _op: ReduceOp) -> Result<f64> {
        Ok(value)
    }

    fn abort(&mut self, reason: &str) {
        log::error!("aborting: {}", reason);
    }
}

enum Request {
    Contribute { rank: usize, value: f64, op: ReduceOp },
    Abort { rank: usize, reason: String },
    Leave { rank: usize },
}

#[derive(Debug, Clone)]
enum Collective {
    Value(f64),
    Abort(String),
}

pub struct LocalMember {
    rank: usize,
    size: usize,
    request_tx: MpscSender<Request>,
    collective_rx: BusReader<Collective>,
    aborted: Option<String>,
}

impl LocalMember {
    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    fn group_aborted(&self) -> Error {
        Error::GroupAborted(self.aborted.clone().unwrap_or_default())
    }
}

impl ProcessGroup for LocalMember {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn reduce(&mut self, value: f64, op: ReduceOp) -> Result<f64> {
        if self.aborted.is_some() {
            return Err(self.group_aborted());
        }

        let request = Request::Contribute {
            rank: self.rank,
            value,
            op,
        };
        if self.request_tx.send(request).is_err() {
            self.aborted = Some("reducer stopped".to_string());
            return Err(self.group_aborted());
        }

        match self.collective_rx.recv() {
            Ok(Collective::Value(result)) => Ok(result),
            Ok(Collective::Abort(reason)) => {
                self.aborted = Some(reason);
                Err(self.group_aborted())
            }
            Err(_) => {
                self.aborted = Some("reducer stopped".to_string());
                Err(self.group_aborted())
            }
        }
    }

    fn abort(&mut self, reason: &str) {
        if self.aborted.is_some() {
            return;
        }

        log::error!("rank {} aborting the group: {}", self.rank, reason);
        self.request_tx
            .send(Request::Abort {
                rank: self.rank,
                reason: reason.to_string(),
            })
            .ok();
        self.aborted = Some(reason.to_string());
    }
}

impl Drop for LocalMember {
    fn drop(&mut self) {
        self.request_tx.send(Request::Leave { rank: self.rank }).ok();
    }
}

pub fn get_num_workers(params: &GroupParams) -> usize {
    params.num_workers.unwrap_or_else(num_cpus::get)
}

// runs one worker per rank on its own thread, results are returned by rank
pub fn run_local_group<R, F>(params: &GroupParams, f: F) -> Result<Vec<Result<R>>>
where
    R: Send,
    F: Fn(&mut LocalMember) -> Result<R> + Sync,
{
    try_with!(
        params::validate_group_params(params),
        "invalid group parameters"
    );

    let num_workers = get_num_workers(params);
    let mut broadcast_tx = Bus::new(num_workers.max(1));
    let (request_tx, request_rx) = mpsc_channel();

    let members: Vec<LocalMember> = (0..num_workers)
        .map(|rank| LocalMember {
            rank,
            size: num_workers,
            request_tx: request_tx.clone(),
            collective_rx: broadcast_tx.add_rx(),
            aborted: None,
        })
        .collect();
    drop(request_tx);

    let f = &f;
    let pin_threads = params.pin_threads;

    let results = thread::scope(|scope| {
        scope.spawn(move || run_reducer(num_workers, request_rx, broadcast_tx));

        let join_handles: Vec<_> = members
            .into_iter()
            .map(|mut member| {
                scope.spawn(move || {
                    if pin_threads {
                        core_affinity::set_for_current(CoreId { id: member.rank });
                    }

                    let result = f(&mut member);
                    if let Err(err) = &result {
                        member.abort(&err.to_string());
                    }
                    result
                })
            })
            .collect();

        join_handles
            .into_iter()
            .enumerate()
            .map(|(rank, join_handle)| {
                join_handle.join().unwrap_or_else(|_| {
                    Err(Error::GroupAborted(format!("rank {} panicked", rank)))
                })
            })
            .collect::<Vec<_>>()
    });

    Ok(results)
}

fn run_reducer(size: usize, request_rx: MpscReceiver<Request>, mut broadcast_tx: Bus<Collective>) {
    let mut pending: Vec<Option<(f64, ReduceOp)>> = vec![None; size];
    let mut left = vec![false; size];

    while let Ok(request) = request_rx.recv() {
        match request {
            Request::Contribute { rank, value, op } => pending[rank] = Some((value, op)),
            Request::Abort { rank, reason } => {
                broadcast_tx.broadcast(Collective::Abort(format!("rank {}: {}", rank, reason)));
                return;
            }
            Request::Leave { rank } => left[rank] = true,
        }

        let num_left = left.iter().filter(|left| **left).count();
        if num_left == size {
            return;
        }

        let num_pending = pending.iter().filter(|pending| pending.is_some()).count();
        if num_pending == 0 {
            continue;
        }

        if num_pending + num_left == size && num_left > 0 {
            broadcast_tx.broadcast(Collective::Abort(
                "a rank left the group during a collective".to_string(),
            ));
            return;
        }

        if num_pending < size {
            continue;
        }

        let contributions: Vec<(f64, ReduceOp)> =
            pending.iter_mut().filter_map(Option::take).collect();
        let op = contributions[0].1;

        if contributions.iter().any(|(_, other)| *other != op) {
            broadcast_tx.broadcast(Collective::Abort(
                "ranks disagree on the reduce operation".to_string(),
            ));
            return;
        }

        let result = op.apply(contributions.iter().map(|(value, _)| *value));
        broadcast_tx.broadcast(Collective::Value(result));
    }
}
