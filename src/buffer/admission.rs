//! HyMem-style admission set: a bounded FIFO of recently seen SSD-sourced
//! page ids. A page's SSD→NVM promotion only happens on its *second*
//! observed touch; the first touch just records the pid and serves the
//! read straight from SSD.

use crate::common::PageId;
use crossbeam::queue::ArrayQueue;
use dashmap::DashSet;

pub struct AdmissionSet {
    order: ArrayQueue<PageId>,
    members: DashSet<PageId>,
}

impl AdmissionSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: ArrayQueue::new(capacity.max(1)),
            members: DashSet::new(),
        }
    }

    /// Record a touch of `pid`. Returns `true` if `pid` was already in the
    /// set (this is the second touch, so the caller should promote it),
    /// `false` if this is the first touch (just recorded, serve from SSD).
    pub fn observe(&self, pid: PageId) -> bool {
        if self.members.contains(&pid) {
            return true;
        }
        if self.order.push(pid).is_err() {
            if let Some(evicted) = self.order.pop() {
                self.members.remove(&evicted);
            }
            let _ = self.order.push(pid);
        }
        self.members.insert(pid);
        false
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
