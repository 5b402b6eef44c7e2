//! Sequenced request queue
//!
//! Requests leave a stream in packet-number order but their replies come
//! back from the work queue in whatever order the work items finished. The
//! queue indexes slots by `packet_number - first` so entries can be stored in
//! any order and are only released from the front once the front slot is
//! filled.

use std::collections::VecDeque;

use crate::errors::{PipelineError, Result};

use super::topology::StreamId;
use super::types::RequestPacket;

/// Anything carrying a packet number.
pub trait Sequenced {
    fn packet_number(&self) -> u64;
}

/// A request held by a node until it can be answered in order.
#[derive(Debug, Clone)]
pub struct Request<S, P> {
    /// Stream that owns the request.
    pub stream: S,
    /// Stream the payload came from, if any.
    pub prev_stream: Option<StreamId>,
    pub rp: RequestPacket,
    pub payload: Option<P>,
}

impl<S, P> Request<S, P> {
    pub fn new(stream: S, rp: RequestPacket) -> Self {
        Self {
            stream,
            prev_stream: None,
            rp,
            payload: None,
        }
    }
}

impl<S, P> Sequenced for Request<S, P> {
    fn packet_number(&self) -> u64 {
        self.rp.packet_number
    }
}

/// Window of slots `[first, first + len)` keyed by packet number.
#[derive(Debug)]
pub struct RequestQueue<T> {
    slots: VecDeque<Option<T>>,
    first: u64,
    opened: bool,
    /// Lowest packet number that may still be pushed. Everything below it
    /// has already been popped.
    floor: Option<u64>,
}

impl<T: Sequenced> RequestQueue<T> {
    /// Queue whose window opens at the first pushed packet.
    pub fn new() -> Self {
        Self {
            slots: VecDeque::new(),
            first: 0,
            opened: false,
            floor: None,
        }
    }

    /// Queue whose window opens at `first`.
    pub fn with_first(first: u64) -> Self {
        let mut queue = Self::new();
        queue.ensure_open(first);
        queue
    }

    /// Open the window at `first` unless it is already open.
    pub fn ensure_open(&mut self, first: u64) {
        if !self.opened {
            self.first = first;
            self.opened = true;
        }
    }

    /// Store `entry` in the slot of its packet number.
    ///
    /// Fails if the packet was already popped or is already queued; either
    /// means the producer reused a packet number.
    pub fn push(&mut self, entry: T) -> Result<()> {
        let packet_number = entry.packet_number();

        if let Some(floor) = self.floor {
            if packet_number < floor {
                return Err(PipelineError::SequenceViolation {
                    packet_number,
                    first: self.first,
                });
            }
        }

        if !self.opened {
            self.ensure_open(packet_number);
        }

        if self.slots.is_empty() {
            self.first = packet_number.min(self.first);
            if packet_number == self.first {
                self.slots.push_back(Some(entry));
                return Ok(());
            }
        }

        if packet_number < self.first {
            // Extend the window downward.
            for _ in packet_number..self.first {
                self.slots.push_front(None);
            }
            self.first = packet_number;
        } else {
            let index = (packet_number - self.first) as usize;
            while self.slots.len() <= index {
                self.slots.push_back(None);
            }
        }

        let slot = &mut self.slots[(packet_number - self.first) as usize];
        if slot.is_some() {
            return Err(PipelineError::DuplicatePacket(packet_number));
        }
        *slot = Some(entry);
        Ok(())
    }

    /// Remove the front entry if its slot is filled.
    pub fn pop(&mut self) -> Option<T> {
        if !matches!(self.slots.front(), Some(Some(_))) {
            return None;
        }
        let entry = self.slots.pop_front().flatten();
        self.first += 1;
        self.floor = Some(self.first);
        entry
    }

    /// Front entry without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.slots.front().and_then(Option::as_ref)
    }

    /// Number of slots in the window, filled or not.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn first_packet_number(&self) -> u64 {
        self.first
    }

    pub fn last_packet_number(&self) -> Option<u64> {
        match self.slots.len() {
            0 => None,
            len => Some(self.first + len as u64 - 1),
        }
    }
}

impl<T: Sequenced> Default for RequestQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
