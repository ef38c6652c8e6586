//! Communicator - Synchronous Word Exchange
//!
//! A communicator pairs speaking threads with listening threads, one pair
//! per word. Any number of threads may be waiting to speak or to listen;
//! each word a speaker deposits is withdrawn by exactly one listener.
//!
//! The mailbox is a single slot guarded by one [`Lock`]. Speakers and
//! listeners wait on separate conditions bound to that lock. How long a
//! speaker stays blocked depends on the [`HandoffMode`]:
//!
//! - [`HandoffMode::Rendezvous`]: the speaker keeps the slot claimed after
//!   depositing and sleeps on an acknowledgement condition until a listener
//!   has withdrawn its word. `speak` therefore returns only once paired.
//!   Only the claiming speaker ever waits for the acknowledgement, so a
//!   single wake always reaches the right thread.
//! - [`HandoffMode::Slot`]: the speaker returns as soon as its word is in the
//!   free slot. The word waits there for the next listener; the next speaker
//!   blocks until it is taken.

use alloc::sync::Arc;
use core::fmt;
use log::{debug, trace};

use super::condition::Condition;
use super::counters::{C_WORDS_HEARD, C_WORDS_SPOKEN};
use super::lock::Lock;
use super::machine::Machine;
use crate::config::{Config, HandoffMode};

/// Single-slot mailbox state
#[derive(Debug, Default)]
struct Mailbox {
    word: i32,
    /// A word has been deposited and not yet withdrawn
    occupied: bool,
    /// A rendezvous speaker owns the slot until its word is withdrawn
    claimed: bool,
}

/// Pairs speakers with listeners to hand over one `i32` at a time
pub struct Communicator<M: Machine> {
    mailbox: Lock<M, Mailbox>,
    speakers: Condition<M>,
    listeners: Condition<M>,
    /// Rendezvous speaker waiting for its word to be taken
    delivered: Condition<M>,
    mode: HandoffMode,
}

impl<M: Machine> Communicator<M> {
    /// Create a rendezvous communicator
    pub fn new(machine: Arc<M>) -> Self {
        Self::with_mode(machine, HandoffMode::Rendezvous)
    }

    /// Create a communicator with the given handoff mode
    pub fn with_mode(machine: Arc<M>, mode: HandoffMode) -> Self {
        let mailbox = Lock::new(machine, Mailbox::default());
        let speakers = Condition::new(&mailbox);
        let listeners = Condition::new(&mailbox);
        let delivered = Condition::new(&mailbox);
        debug!("communicator {:?} created ({:?})", mailbox.id(), mode);
        Self {
            mailbox,
            speakers,
            listeners,
            delivered,
            mode,
        }
    }

    /// Create a communicator using the configured handoff mode
    pub fn from_config(machine: Arc<M>, config: &Config) -> Self {
        Self::with_mode(machine, config.handoff)
    }

    /// Hand `word` to exactly one listener
    pub fn speak(&self, word: i32) {
        match self.mode {
            HandoffMode::Rendezvous => self.speak_rendezvous(word),
            HandoffMode::Slot => self.speak_slot(word),
        }
    }

    fn speak_rendezvous(&self, word: i32) {
        let mut mailbox = self.mailbox.acquire();
        while mailbox.claimed {
            mailbox = self.speakers.sleep(mailbox);
        }

        mailbox.claimed = true;
        mailbox.word = word;
        mailbox.occupied = true;
        C_WORDS_SPOKEN.inc();
        trace!("spoke {}", word);
        self.listeners.wake(&mailbox);

        while mailbox.occupied {
            mailbox = self.delivered.sleep(mailbox);
        }

        mailbox.claimed = false;
        self.speakers.wake(&mailbox);
    }

    fn speak_slot(&self, word: i32) {
        let mut mailbox = self.mailbox.acquire();
        while mailbox.occupied {
            mailbox = self.speakers.sleep(mailbox);
        }

        self.listeners.wake(&mailbox);
        mailbox.word = word;
        mailbox.occupied = true;
        C_WORDS_SPOKEN.inc();
        trace!("spoke {}", word);
    }

    /// Wait for a speaker and return the word it spoke
    pub fn listen(&self) -> i32 {
        let mut mailbox = self.mailbox.acquire();
        while !mailbox.occupied {
            mailbox = self.listeners.sleep(mailbox);
        }

        match self.mode {
            HandoffMode::Rendezvous => self.delivered.wake(&mailbox),
            HandoffMode::Slot => self.speakers.wake(&mailbox),
        }
        let word = mailbox.word;
        mailbox.occupied = false;
        C_WORDS_HEARD.inc();
        trace!("heard {}", word);
        word
    }

    /// Handoff mode
    pub fn mode(&self) -> HandoffMode {
        self.mode
    }

    /// Speakers blocked waiting for the slot
    pub fn waiting_speakers(&self) -> usize {
        self.speakers.sleepers()
    }

    /// Listeners blocked waiting for a word
    pub fn waiting_listeners(&self) -> usize {
        self.listeners.sleepers()
    }
}

impl<M: Machine> fmt::Debug for Communicator<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Communicator")
            .field("mode", &self.mode)
            .field("waiting_speakers", &self.waiting_speakers())
            .field("waiting_listeners", &self.waiting_listeners())
            .finish()
    }
}
