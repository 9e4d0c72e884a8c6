//! In-memory multi-rank communication.
//!
//! `LocalComm` implements the `Comm` collectives over `std::sync::mpsc`
//! channels and a shared barrier, so a set of threads can stand in for a set
//! of MPI ranks. A single-rank `LocalComm` short-circuits every collective,
//! which is also the serial execution path when the crate is used without a
//! distributed runtime.

use super::Comm;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Barrier};

enum Packet {
    Ints(Vec<i64>),
    Reals(Vec<f64>),
}

/// One rank of an in-memory communicator group.
pub struct LocalComm {
    rank: usize,
    size: usize,
    barrier: Arc<Barrier>,
    /// senders[dest] delivers into dest's inbox for this rank.
    senders: Vec<Sender<Packet>>,
    /// receivers[src] yields packets sent by src, in send order.
    receivers: Vec<Receiver<Packet>>,
}

impl LocalComm {
    /// A single-rank communicator for serial execution.
    pub fn solo() -> Self {
        Self::split(1).pop().unwrap()
    }

    /// Create a group of `size` connected ranks. Each returned communicator
    /// is meant to be moved onto its own thread.
    pub fn split(size: usize) -> Vec<LocalComm> {
        assert!(size >= 1);
        let barrier = Arc::new(Barrier::new(size));
        // channel[src][dest]
        let mut senders: Vec<Vec<Option<Sender<Packet>>>> = Vec::with_capacity(size);
        let mut receivers: Vec<Vec<Option<Receiver<Packet>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
        for src in 0..size {
            let mut row = Vec::with_capacity(size);
            for dest in 0..size {
                let (tx, rx) = channel();
                row.push(Some(tx));
                receivers[dest][src] = Some(rx);
            }
            senders.push(row);
        }
        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (tx_row, rx_row))| LocalComm {
                rank,
                size,
                barrier: Arc::clone(&barrier),
                senders: tx_row.into_iter().map(|s| s.unwrap()).collect(),
                receivers: rx_row.into_iter().map(|r| r.unwrap()).collect(),
            })
            .collect()
    }

    fn send_packet(&self, packet: Packet, dest: usize) {
        // Failure means the peer thread is gone; the collective cannot complete.
        self.senders[dest]
            .send(packet)
            .expect("peer rank disconnected");
    }

    fn recv_ints(&self, src: usize) -> Vec<i64> {
        match self.receivers[src].recv().expect("peer rank disconnected") {
            Packet::Ints(v) => v,
            Packet::Reals(_) => panic!("collective ordering violated between ranks"),
        }
    }

    fn recv_reals(&self, src: usize) -> Vec<f64> {
        match self.receivers[src].recv().expect("peer rank disconnected") {
            Packet::Reals(v) => v,
            Packet::Ints(_) => panic!("collective ordering violated between ranks"),
        }
    }
}

impl Comm for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) {
        if self.size > 1 {
            self.barrier.wait();
        }
    }

    fn all_reduce_min(&self, local: &[i64], global: &mut [i64]) {
        if self.size == 1 {
            global.copy_from_slice(local);
            return;
        }
        if self.rank == 0 {
            let mut acc = local.to_vec();
            for src in 1..self.size {
                for (a, x) in acc.iter_mut().zip(self.recv_ints(src)) {
                    *a = (*a).min(x);
                }
            }
            for dest in 1..self.size {
                self.send_packet(Packet::Ints(acc.clone()), dest);
            }
            global.copy_from_slice(&acc);
        } else {
            self.send_packet(Packet::Ints(local.to_vec()), 0);
            global.copy_from_slice(&self.recv_ints(0));
        }
    }

    fn gather_varied(&self, local: &[f64], root: usize) -> Option<Vec<Vec<f64>>> {
        if self.rank == root {
            let mut out: Vec<Vec<f64>> = (0..self.size).map(|_| Vec::new()).collect();
            out[root] = local.to_vec();
            for src in (0..self.size).filter(|&s| s != root) {
                out[src] = self.recv_reals(src);
            }
            Some(out)
        } else {
            self.send_packet(Packet::Reals(local.to_vec()), root);
            None
        }
    }

    fn broadcast(&self, buf: &mut Vec<f64>, root: usize) {
        if self.size == 1 {
            return;
        }
        if self.rank == root {
            for dest in (0..self.size).filter(|&d| d != root) {
                self.send_packet(Packet::Reals(buf.clone()), dest);
            }
        } else {
            *buf = self.recv_reals(root);
        }
    }

    fn send(&self, buf: &[f64], dest: usize) {
        self.send_packet(Packet::Reals(buf.to_vec()), dest);
    }

    fn recv(&self, src: usize) -> Vec<f64> {
        self.recv_reals(src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn solo_short_circuits() {
        let comm = LocalComm::solo();
        let mut out = vec![0; 2];
        comm.all_reduce_min(&[3, 7], &mut out);
        assert_eq!(out, vec![3, 7]);
        assert!(comm.gather_varied(&[1.0], 0).is_some());
    }

    #[test]
    fn min_reduction_across_ranks() {
        let comms = LocalComm::split(3);
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let local = [comm.rank() as i64 + 1, 10 - comm.rank() as i64];
                    let mut global = [0i64; 2];
                    comm.all_reduce_min(&local, &mut global);
                    global
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), [1, 8]);
        }
    }

    #[test]
    fn gather_and_fan_out() {
        let comms = LocalComm::split(2);
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let local = vec![comm.rank() as f64];
                    match comm.gather_varied(&local, 0) {
                        Some(all) => {
                            assert_eq!(all, vec![vec![0.0], vec![1.0]]);
                            comm.send(&[42.0], 1);
                        }
                        None => {
                            assert_eq!(comm.recv(0), vec![42.0]);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}
