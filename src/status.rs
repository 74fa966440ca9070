//! Known groups, the outbound message queue, and uptime statistics.
//!
//! All outbound group traffic goes through one drain task per process. The
//! drain rescans every queue until none has entries, so a message queued
//! while a drain is running is picked up by that same drain.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use sysinfo::{ProcessesToUpdate, System};
use tokio::sync::{Mutex, oneshot};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::telegram::Transport;

/// Delay after each successful send, to stay under Telegram's rate limit.
pub const DEFAULT_PACING: Duration = Duration::from_secs(1);

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
struct Group {
    name: String,
    joined_at: DateTime<Utc>,
    message_count: u64,
}

struct Outbound {
    text: String,
    /// Receives the delivery result once the drain has attempted the send.
    ack: Option<oneshot::Sender<bool>>,
}

#[derive(Default)]
struct Inner {
    groups: BTreeMap<i64, Group>,
    queues: BTreeMap<i64, VecDeque<Outbound>>,
    transport: Option<Arc<dyn Transport>>,
    closed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupStatus {
    pub id: i64,
    pub name: String,
    pub joined_at: DateTime<Utc>,
    pub message_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStatus {
    pub group_id: i64,
    pub pending: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uptime {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
    pub total: Duration,
}

impl Uptime {
    pub fn from_duration(total: Duration) -> Self {
        let secs = total.as_secs();
        Self {
            days: secs / 86_400,
            hours: secs % 86_400 / 3_600,
            minutes: secs % 3_600 / 60,
            seconds: secs % 60,
            total,
        }
    }

    /// `1d 2h 3m`
    pub fn short(&self) -> String {
        format!("{}d {}h {}m", self.days, self.hours, self.minutes)
    }

    /// `1d 2h 3m 4s`
    pub fn long(&self) -> String {
        format!("{}d {}h {}m {}s", self.days, self.hours, self.minutes, self.seconds)
    }
}

/// Memory figures in MiB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    pub process_resident: u64,
    pub process_virtual: u64,
    pub system_used: u64,
    pub system_total: u64,
}

impl MemoryUsage {
    pub fn current() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();

        let (resident, virtual_mem) = match sysinfo::get_current_pid() {
            Ok(pid) => {
                sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
                sys.process(pid)
                    .map(|p| (p.memory(), p.virtual_memory()))
                    .unwrap_or((0, 0))
            }
            Err(e) => {
                debug!("Cannot resolve own pid: {e}");
                (0, 0)
            }
        };

        Self {
            process_resident: resident / MIB,
            process_virtual: virtual_mem / MIB,
            system_used: sys.used_memory() / MIB,
            system_total: sys.total_memory() / MIB,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub started_at: DateTime<Utc>,
    pub uptime: Uptime,
    pub groups: Vec<GroupStatus>,
    pub queues: Vec<QueueStatus>,
    pub memory: MemoryUsage,
}

impl StatusSnapshot {
    pub fn total_messages(&self) -> u64 {
        self.groups.iter().map(|g| g.message_count).sum()
    }

    pub fn total_pending(&self) -> usize {
        self.queues.iter().map(|q| q.pending).sum()
    }
}

/// Pending delivery result for a message queued with an acknowledgement.
pub struct Delivery(oneshot::Receiver<bool>);

impl Delivery {
    /// Wait for the drain to attempt the send. `false` if it failed or the
    /// service shut down first.
    pub async fn outcome(self) -> bool {
        self.0.await.unwrap_or(false)
    }
}

pub struct StatusService {
    started: Instant,
    started_at: DateTime<Utc>,
    pacing: Duration,
    inner: Mutex<Inner>,
    /// Single-flight guard for the drain task.
    draining: AtomicBool,
}

impl StatusService {
    pub fn new(pacing: Duration) -> Arc<Self> {
        Arc::new(Self {
            started: Instant::now(),
            started_at: Utc::now(),
            pacing,
            inner: Mutex::new(Inner::default()),
            draining: AtomicBool::new(false),
        })
    }

    /// Connect the outbound transport. Messages queued earlier start draining now.
    pub async fn attach_transport(self: &Arc<Self>, transport: Arc<dyn Transport>) {
        {
            let mut inner = self.inner.lock().await;
            inner.transport = Some(transport);
            inner.closed = false;
        }
        self.trigger_drain().await;
    }

    /// Stop delivering. Queued entries stay queued; waiters get `false`.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        inner.transport = None;

        let mut abandoned = 0;
        for queue in inner.queues.values_mut() {
            for entry in queue.iter_mut() {
                if let Some(ack) = entry.ack.take() {
                    let _ = ack.send(false);
                    abandoned += 1;
                }
            }
        }
        info!("🛑 Status service shut down ({abandoned} waiting deliveries released)");
    }

    /// Record that the bot joined a group. Re-adding resets join time and counter.
    pub async fn add_group(&self, id: i64, name: &str) {
        let mut inner = self.inner.lock().await;
        inner.groups.insert(
            id,
            Group {
                name: name.to_string(),
                joined_at: Utc::now(),
                message_count: 0,
            },
        );
        info!("🆕 Bot joined group: {} ({})", name, id);
    }

    /// Forget a group. Its queued messages are dropped when the drain reaches them.
    pub async fn remove_group(&self, id: i64) {
        let mut inner = self.inner.lock().await;
        if let Some(group) = inner.groups.remove(&id) {
            info!("👋 Bot left group: {} ({})", group.name, id);
        }
    }

    /// Queue a message and return without waiting for delivery.
    pub async fn queue_message(self: &Arc<Self>, group_id: i64, text: &str) {
        self.push(group_id, text, None).await;
        self.trigger_drain().await;
    }

    /// Queue a message and get a handle to its delivery result.
    pub async fn queue_message_with_ack(self: &Arc<Self>, group_id: i64, text: &str) -> Delivery {
        let (tx, rx) = oneshot::channel();
        self.push(group_id, text, Some(tx)).await;
        self.trigger_drain().await;
        Delivery(rx)
    }

    pub async fn queue_message_and_wait(self: &Arc<Self>, group_id: i64, text: &str) -> bool {
        self.queue_message_with_ack(group_id, text).await.outcome().await
    }

    /// Send directly to a known group, bumping its counter on success.
    pub async fn send_one(&self, group_id: i64, text: &str) -> bool {
        let transport = {
            let inner = self.inner.lock().await;
            if !inner.groups.contains_key(&group_id) {
                warn!("Dropping message for unknown group {}", group_id);
                return false;
            }
            match inner.transport.clone() {
                Some(t) => t,
                None => {
                    warn!("No transport attached, cannot send to group {}", group_id);
                    return false;
                }
            }
        };

        match transport.send_text(group_id, text).await {
            Ok(()) => {
                let mut inner = self.inner.lock().await;
                if let Some(group) = inner.groups.get_mut(&group_id) {
                    group.message_count += 1;
                }
                true
            }
            Err(e) => {
                error!("Error sending message to group {}: {}", group_id, e);
                false
            }
        }
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    pub fn uptime(&self) -> Uptime {
        Uptime::from_duration(self.started.elapsed())
    }

    pub async fn groups(&self) -> Vec<GroupStatus> {
        let inner = self.inner.lock().await;
        inner
            .groups
            .iter()
            .map(|(id, g)| GroupStatus {
                id: *id,
                name: g.name.clone(),
                joined_at: g.joined_at,
                message_count: g.message_count,
            })
            .collect()
    }

    /// Non-empty queues only.
    pub async fn pending(&self) -> Vec<QueueStatus> {
        let inner = self.inner.lock().await;
        inner
            .queues
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(id, q)| QueueStatus { group_id: *id, pending: q.len() })
            .collect()
    }

    pub async fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            started_at: self.started_at,
            uptime: self.uptime(),
            groups: self.groups().await,
            queues: self.pending().await,
            memory: MemoryUsage::current(),
        }
    }

    async fn push(&self, group_id: i64, text: &str, mut ack: Option<oneshot::Sender<bool>>) {
        let mut inner = self.inner.lock().await;
        // Nothing drains after shutdown, so a waiter would never be answered
        if inner.closed {
            if let Some(ack) = ack.take() {
                let _ = ack.send(false);
                debug!("Queued for group {} after shutdown, delivery released", group_id);
            }
        }
        inner
            .queues
            .entry(group_id)
            .or_default()
            .push_back(Outbound { text: text.to_string(), ack });
    }

    async fn trigger_drain(self: &Arc<Self>) {
        {
            let inner = self.inner.lock().await;
            if inner.closed || inner.transport.is_none() {
                return;
            }
        }
        if !self.try_begin_drain() {
            debug!("Drain already running");
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move { this.drain().await });
    }

    fn try_begin_drain(&self) -> bool {
        self.draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    async fn drain(self: Arc<Self>) {
        debug!("Drain started");
        loop {
            while let Some((group_id, entry)) = self.next_pending().await {
                let sent = self.send_one(group_id, &entry.text).await;
                if let Some(ack) = entry.ack {
                    let _ = ack.send(sent);
                }
                if sent {
                    sleep(self.pacing).await;
                }
            }

            self.draining.store(false, Ordering::SeqCst);
            // An enqueue may have seen the guard set after our last scan.
            if !self.has_pending().await || !self.try_begin_drain() {
                break;
            }
        }
        debug!("Drain finished");
    }

    /// Pop the next entry, scanning queues from the start every time.
    async fn next_pending(&self) -> Option<(i64, Outbound)> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return None;
        }
        inner
            .queues
            .iter_mut()
            .find_map(|(id, q)| q.pop_front().map(|entry| (*id, entry)))
    }

    async fn has_pending(&self) -> bool {
        let inner = self.inner.lock().await;
        !inner.closed && inner.queues.values().any(|q| !q.is_empty())
    }
}
