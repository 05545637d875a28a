//! Software transmit queue: named queues of pending transmissions drained
//! onto the one physical radio by a background thread.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use radio_lt8900::bus::Bus;
use radio_lt8900::engine::{FormatOverride, PacketEngine};
use radio_lt8900::error::RadioError;
use radio_lt8900::logger::LogPolicy;

/// Queue used when the caller does not name one.
pub const DEFAULT_QUEUE: &str = "__DEFAULT__";

/// Sleep between drain cycles when every queue is empty.
const IDLE_SLEEP: Duration = Duration::from_millis(500);
/// First backoff step when items exist but none are eligible yet.
const BACKOFF_START: Duration = Duration::from_millis(1);
const BACKOFF_CEILING: Duration = Duration::from_millis(500);

/// One pending transmission. An item with no message or no channel is a
/// syncword priming marker: it advances the queue's inherited syncword but
/// puts nothing on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransmitItem {
    pub syncword: Option<Vec<u8>>,
    pub message: Option<Vec<u8>>,
    pub channel: Option<u8>,
    pub post_delay: Duration,
    pub format: Option<FormatOverride>,
}

struct QueueState {
    queues: HashMap<String, VecDeque<TransmitItem>>,
    next_eligible: HashMap<String, Instant>,
    enabled: bool,
}

struct Drained {
    queue: String,
    item: TransmitItem,
}

/// Shared core of the scheduler: the named-queue map (owned exclusively,
/// behind one lock) and the bus-owner handle everything flushes through.
pub(crate) struct QueueCore<I: Bus> {
    engine: Arc<Mutex<PacketEngine<I>>>,
    state: Mutex<QueueState>,
    log: LogPolicy,
}

impl<I: Bus> QueueCore<I> {
    pub(crate) fn new(engine: Arc<Mutex<PacketEngine<I>>>, log: LogPolicy) -> Self {
        Self {
            engine,
            state: Mutex::new(QueueState {
                queues: HashMap::new(),
                next_eligible: HashMap::new(),
                enabled: false,
            }),
            log,
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.state.lock().unwrap().enabled
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.state.lock().unwrap().enabled = enabled;
    }

    pub(crate) fn pending_items(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.queues.values().map(|queue| queue.len()).sum()
    }

    /// Appends an item to a named queue, creating the queue on first use.
    pub(crate) fn enqueue(&self, queue: &str, item: TransmitItem) -> Result<(), RadioError> {
        let mut state = self.state.lock().unwrap();

        if !state.enabled {
            return Err(RadioError::QueueDisabled);
        }

        state
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(item);

        Ok(())
    }

    /// One drain cycle. Returns (items consumed, items still queued).
    pub(crate) fn run_once(&self) -> (usize, usize) {
        let now = Instant::now();
        let mut drained: Vec<Drained> = Vec::new();
        let mut remaining = 0usize;

        {
            let mut state = self.state.lock().unwrap();
            let names: Vec<String> = state.queues.keys().cloned().collect();

            for name in names {
                let eligible = *state.next_eligible.entry(name.clone()).or_insert(now);
                if now < eligible {
                    remaining += state.queues[&name].len();
                    continue;
                }

                let queue = match state.queues.get_mut(&name) {
                    Some(queue) => queue,
                    None => continue,
                };

                // Pop a contiguous run from the head; an item bearing a
                // delay always ends its queue's run for this cycle
                let mut pop_items = 0;
                for item in queue.iter() {
                    pop_items += 1;
                    if !item.post_delay.is_zero() {
                        break;
                    }
                }

                if pop_items != 0 {
                    self.log.debug(&format!(
                        "Found {} items to transmit in the {} queue",
                        pop_items, name
                    ));
                }

                for _ in 0..pop_items {
                    if let Some(item) = queue.pop_front() {
                        drained.push(Drained {
                            queue: name.clone(),
                            item,
                        });
                    }
                }

                remaining += queue.len();
            }
        }

        let consumed = drained.len();

        // Stamp inherited syncwords in collection order, drop priming
        // markers, and group what is left by (syncword, channel) keeping
        // first-encountered order.
        let mut default_syncword: Option<Vec<u8>> = None;
        let mut groups: Vec<((Option<Vec<u8>>, u8), Vec<Drained>)> = Vec::new();

        for mut entry in drained {
            match &entry.item.syncword {
                Some(syncword) => default_syncword = Some(syncword.clone()),
                None => entry.item.syncword = default_syncword.clone(),
            }

            let channel = match (&entry.item.message, entry.item.channel) {
                (Some(_), Some(channel)) => channel,
                _ => continue,
            };

            let key = (entry.item.syncword.clone(), channel);
            match groups.iter_mut().find(|(existing, _)| *existing == key) {
                Some((_, items)) => items.push(entry),
                None => groups.push((key, vec![entry])),
            }
        }

        let flush: Vec<Drained> = groups
            .into_iter()
            .flat_map(|(_, items)| items)
            .collect();

        self.log
            .debug(&format!("Getting ready to transmit {} items", consumed));

        // Flush the batch with the bus owner held throughout, so at most
        // one physical transmit is in flight. The queue-state lock is only
        // taken in short sections here; nothing acquires the engine lock
        // while holding it.
        let mut engine = self.engine.lock().unwrap();

        for (index, entry) in flush.iter().enumerate() {
            let item = &entry.item;
            self.log.debug(&format!("Transmitting item {:?}", item));

            let result = match (&item.message, item.channel) {
                (Some(message), Some(_)) => engine.transmit(
                    message,
                    item.channel,
                    item.syncword.as_deref(),
                    item.format.as_ref(),
                    Duration::ZERO,
                ),
                _ => Ok(true),
            };

            if let Err(error) = result {
                self.log
                    .error(&format!("Failed to run queue: {}", error));
                drop(engine);

                // Retain the unflushed remainder, current item included,
                // at the front of their source queues for the next cycle
                let retained = &flush[index..];
                let mut state = self.state.lock().unwrap();
                for entry in retained.iter().rev() {
                    state
                        .queues
                        .entry(entry.queue.clone())
                        .or_default()
                        .push_front(entry.item.clone());
                }

                return (consumed - retained.len(), remaining + retained.len());
            }

            let mut state = self.state.lock().unwrap();
            state
                .next_eligible
                .insert(entry.queue.clone(), Instant::now() + item.post_delay);
        }

        (consumed, remaining)
    }

    /// Drain loop body run by the background thread.
    pub(crate) fn run_loop(&self) {
        self.log.debug("Started transmit queue drain loop");

        let mut sleep_time = Duration::ZERO;

        loop {
            if !sleep_time.is_zero() {
                self.log.debug(&format!("Sleeping for {:?}", sleep_time));
                std::thread::sleep(sleep_time);
            }

            {
                let state = self.state.lock().unwrap();
                for (name, queue) in state.queues.iter() {
                    if !queue.is_empty() {
                        self.log.debug(&format!(
                            "Running the queue named {}: {} items left",
                            name,
                            queue.len()
                        ));
                    }
                }
            }

            let (consumed, remaining) = self.run_once();

            self.log.debug(&format!(
                "Completed running the queue, did {} items and {} items left",
                consumed, remaining
            ));

            if remaining == 0 {
                // Drained dry and no longer queueing: exit (the owner
                // joins us). Checking both under one lock acquisition
                // guarantees an item enqueued before queueing was disabled
                // is still seen and flushed.
                {
                    let state = self.state.lock().unwrap();
                    if !state.enabled && state.queues.values().all(|queue| queue.is_empty()) {
                        drop(state);
                        self.log.debug("Request to stop the drain loop, exiting");
                        return;
                    }
                }

                sleep_time = IDLE_SLEEP;
                continue;
            }

            if consumed == 0 {
                // Items exist but none were eligible: back off
                sleep_time = if sleep_time.is_zero() {
                    BACKOFF_START
                } else {
                    (sleep_time * 2).min(BACKOFF_CEILING)
                };
                continue;
            }

            sleep_time = Duration::ZERO;
        }
    }
}

/// Owns the drain thread and the queue core.
pub struct TxScheduler<I: Bus + Send + 'static> {
    core: Arc<QueueCore<I>>,
    worker: Option<JoinHandle<()>>,
}

impl<I: Bus + Send + 'static> TxScheduler<I> {
    pub fn new(engine: Arc<Mutex<PacketEngine<I>>>, log: LogPolicy) -> Self {
        Self {
            core: Arc::new(QueueCore::new(engine, log)),
            worker: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.core.is_enabled()
    }

    pub fn enqueue(&self, queue: &str, item: TransmitItem) -> Result<(), RadioError> {
        self.core.enqueue(queue, item)
    }

    /// Items waiting across all named queues.
    pub fn pending_items(&self) -> usize {
        self.core.pending_items()
    }

    /// Starts the drain thread when queueing flips on; on flipping off,
    /// waits for the thread to flush everything and exit.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.core.set_enabled(enabled);

        if enabled {
            if self.worker.is_none() {
                let core = self.core.clone();
                self.worker = Some(std::thread::spawn(move || core.run_loop()));
            }
        } else if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radio_lt8900::mock::MockBus;

    fn core() -> Arc<QueueCore<MockBus>> {
        let engine = Arc::new(Mutex::new(PacketEngine::new(
            MockBus::new(),
            LogPolicy::default(),
        )));
        let core = Arc::new(QueueCore::new(engine, LogPolicy::default()));
        core.set_enabled(true);
        core
    }

    fn message_item(message: &[u8], channel: u8) -> TransmitItem {
        TransmitItem {
            message: Some(message.to_vec()),
            channel: Some(channel),
            ..TransmitItem::default()
        }
    }

    fn fifo_fills(core: &QueueCore<MockBus>) -> Vec<Vec<u8>> {
        let mut engine = core.engine.lock().unwrap();
        engine
            .port_mut()
            .bus_mut()
            .frames
            .iter()
            .filter(|frame| frame[0] == 50)
            .cloned()
            .collect()
    }

    #[test]
    fn test_enqueue_requires_queueing_enabled() {
        let core = core();
        core.set_enabled(false);

        assert_eq!(
            core.enqueue(DEFAULT_QUEUE, message_item(b"AA", 1))
                .unwrap_err(),
            RadioError::QueueDisabled
        );
    }

    #[test]
    fn test_drain_preserves_fifo_order_and_inherits_syncword() {
        let core = core();

        let mut first = message_item(b"AA", 1);
        first.syncword = Some(vec![0x12, 0x34]);
        core.enqueue(DEFAULT_QUEUE, first).expect("enqueue");
        core.enqueue(DEFAULT_QUEUE, message_item(b"BB", 1))
            .expect("enqueue");
        core.enqueue(DEFAULT_QUEUE, message_item(b"CC", 1))
            .expect("enqueue");

        assert_eq!(core.run_once(), (3, 0));

        let fills = fifo_fills(&core);
        assert_eq!(fills.len(), 3);
        assert_eq!(&fills[0][2..], b"AA");
        assert_eq!(&fills[1][2..], b"BB");
        assert_eq!(&fills[2][2..], b"CC");

        // The syncword was applied once; the inherited copies hit the cache
        let mut engine = core.engine.lock().unwrap();
        assert_eq!(engine.port_mut().bus_mut().writes_to(36).len(), 1);
        assert_eq!(engine.last_syncword(), Some(&[0x12, 0x34][..]));
    }

    #[test]
    fn test_syncword_priming_marker_emits_nothing() {
        let core = core();

        core.enqueue(
            DEFAULT_QUEUE,
            TransmitItem {
                syncword: Some(vec![0xaa]),
                ..TransmitItem::default()
            },
        )
        .expect("enqueue");
        core.enqueue(DEFAULT_QUEUE, message_item(b"XY", 2))
            .expect("enqueue");

        assert_eq!(core.run_once(), (2, 0));

        assert_eq!(fifo_fills(&core).len(), 1);
        let mut engine = core.engine.lock().unwrap();
        assert_eq!(engine.port_mut().bus_mut().writes_to(36), vec![0xaa]);
    }

    #[test]
    fn test_post_delay_rate_limits_its_queue() {
        let core = core();

        let mut item = message_item(b"AA", 1);
        item.post_delay = Duration::from_millis(200);
        core.enqueue(DEFAULT_QUEUE, item).expect("enqueue");

        assert_eq!(core.run_once(), (1, 0));

        core.enqueue(DEFAULT_QUEUE, message_item(b"BB", 1))
            .expect("enqueue");
        core.enqueue(DEFAULT_QUEUE, message_item(b"CC", 1))
            .expect("enqueue");

        // The queue is ineligible until the delay elapses, no matter how
        // many cycles run
        assert_eq!(core.run_once(), (0, 2));
        assert_eq!(core.run_once(), (0, 2));
        assert_eq!(fifo_fills(&core).len(), 1);
    }

    #[test]
    fn test_delay_bearing_item_ends_the_run() {
        let core = core();

        let mut first = message_item(b"AA", 1);
        first.post_delay = Duration::from_millis(200);
        core.enqueue(DEFAULT_QUEUE, first).expect("enqueue");
        core.enqueue(DEFAULT_QUEUE, message_item(b"BB", 1))
            .expect("enqueue");

        // Only the delay-bearing head is popped this cycle
        assert_eq!(core.run_once(), (1, 1));
    }

    #[test]
    fn test_items_group_by_syncword_and_channel() {
        let core = core();

        core.enqueue("north", message_item(b"AA", 1)).expect("enqueue");
        core.enqueue("north", message_item(b"BB", 2)).expect("enqueue");
        core.enqueue("north", message_item(b"CC", 1)).expect("enqueue");

        assert_eq!(core.run_once(), (3, 0));

        // Channel-1 items flush together, in the order first encountered
        let fills = fifo_fills(&core);
        assert_eq!(&fills[0][2..], b"AA");
        assert_eq!(&fills[1][2..], b"CC");
        assert_eq!(&fills[2][2..], b"BB");
    }

    #[test]
    fn test_failed_flush_retains_unflushed_items() {
        let core = core();

        core.enqueue(DEFAULT_QUEUE, message_item(b"AA", 1))
            .expect("enqueue");
        core.enqueue(DEFAULT_QUEUE, message_item(b"BB", 1))
            .expect("enqueue");

        {
            let mut engine = core.engine.lock().unwrap();
            engine.port_mut().bus_mut().fail_transfers = 100;
        }

        assert_eq!(core.run_once(), (0, 2));
        assert_eq!(core.pending_items(), 2);

        {
            let mut engine = core.engine.lock().unwrap();
            engine.port_mut().bus_mut().fail_transfers = 0;
        }

        assert_eq!(core.run_once(), (2, 0));
        assert_eq!(fifo_fills(&core).len(), 2);
    }

    #[test]
    fn test_scheduler_joins_after_flushing() {
        let engine = Arc::new(Mutex::new(PacketEngine::new(
            MockBus::new(),
            LogPolicy::default(),
        )));
        let mut scheduler = TxScheduler::new(engine.clone(), LogPolicy::default());

        scheduler.set_enabled(true);
        scheduler
            .enqueue(DEFAULT_QUEUE, message_item(b"AA", 1))
            .expect("enqueue");
        scheduler.set_enabled(false);

        assert_eq!(scheduler.core.pending_items(), 0);
        let fills: usize = {
            let mut engine = engine.lock().unwrap();
            engine
                .port_mut()
                .bus_mut()
                .frames
                .iter()
                .filter(|frame| frame[0] == 50)
                .count()
        };
        assert_eq!(fills, 1);
    }
}
