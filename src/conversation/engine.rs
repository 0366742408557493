//! Conversation engine: refuse blocked senders, load the session, run one
//! transition, execute its side effect, then commit.
//!
//! A session is saved only after its effect succeeds. A failed store call
//! leaves the previous state in place and answers with a generic apology,
//! so the sender can simply resend.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::admin::sender_block_keys;
use super::machine::{self, Context, Effect, EffectOutput, Outcome};
use super::replies;
use super::session::{SenderLocks, SessionStore};
use super::state::SessionState;
use crate::config::IntakeConfig;
use crate::error::{DatabaseError, IntakeError};
use crate::intake::{DuplicateChecker, RawMessage, UniquenessPolicy};
use crate::schedule::{ClosingWindow, day_key};
use crate::store::{AdminDesk, BlockList, BlockedEntry, RegistrationStore};

/// Settings key holding the admin-configured closing window.
pub const CLOSING_WINDOW_KEY: &str = "closing_window";

pub struct Conversation {
    config: IntakeConfig,
    policy: UniquenessPolicy,
    store: Arc<dyn RegistrationStore>,
    desk: Arc<dyn AdminDesk>,
    sessions: Arc<dyn SessionStore>,
    locks: SenderLocks,
    /// Held across duplicate check and persist so two senders cannot both
    /// pass the per-day check for the same card.
    register_lock: Mutex<()>,
}

impl Conversation {
    pub fn new(
        config: IntakeConfig,
        store: Arc<dyn RegistrationStore>,
        desk: Arc<dyn AdminDesk>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            config,
            policy: UniquenessPolicy::default(),
            store,
            desk,
            sessions,
            locks: SenderLocks::new(),
            register_lock: Mutex::new(()),
        }
    }

    /// Replace the default uniqueness rules.
    pub fn with_policy(mut self, policy: UniquenessPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &IntakeConfig {
        &self.config
    }

    /// Handle one inbound message and return the reply parts, in order.
    pub async fn handle(&self, msg: &RawMessage) -> Vec<String> {
        let _guard = self.locks.acquire(&msg.sender).await;

        let mut msg = msg.clone();
        msg.is_admin |= self.config.is_admin(&msg.sender);

        let blocked = if msg.is_admin {
            None
        } else {
            self.sender_block(&msg.sender).await
        };
        if let Some(entry) = blocked {
            info!(sender = %msg.sender, message_id = %msg.id, "Message from blocked sender refused");
            return vec![replies::sender_blocked(entry.reason.as_deref())];
        }

        let state = self.sessions.load(&msg.sender).await;
        let closing = self.closing_window().await;
        let undo_minutes = self.config.undo_window.as_secs() / 60;
        let ctx = Context {
            now: msg.received_at,
            day_key: day_key(msg.received_at),
            closing,
            card_prefix: &self.config.card_prefix,
            undo_minutes,
            policy: &self.policy,
        };

        let step = machine::dispatch(&state, &msg, &ctx);
        let (next, replies) = match step.outcome {
            Outcome::Reply(parts) => (step.next, parts),
            Outcome::Effect(effect) => match self.run(&effect, &msg, &ctx).await {
                Ok(output) => machine::settle(step.next, &effect, output, &ctx),
                Err(e) => {
                    warn!(
                        sender = %msg.sender,
                        message_id = %msg.id,
                        error = %e,
                        "Side effect failed, session left unchanged"
                    );
                    return vec![replies::generic_failure()];
                }
            },
        };

        log_transition(&msg.sender, &state, &next);
        self.sessions.save(&msg.sender, next).await;
        replies
    }

    /// The sender's blocklist entry, if any. A failed lookup lets the
    /// message through.
    async fn sender_block(&self, sender: &str) -> Option<BlockedEntry> {
        let keys = sender_block_keys(sender);
        match self.store.find_blocked(BlockList::Sender, &keys).await {
            Ok(entries) => entries.into_iter().next(),
            Err(e) => {
                warn!(sender = %sender, error = %e, "Failed to read sender blocklist");
                None
            }
        }
    }

    /// Admin override if one is stored, else the configured window.
    async fn closing_window(&self) -> ClosingWindow {
        match self.desk.get_setting(CLOSING_WINDOW_KEY).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(window) => window,
                Err(e) => {
                    warn!(error = %e, "Stored closing window is malformed, using config");
                    self.config.closing_window
                }
            },
            Ok(None) => self.config.closing_window,
            Err(e) => {
                warn!(error = %e, "Failed to read closing window, using config");
                self.config.closing_window
            }
        }
    }

    async fn run(
        &self,
        effect: &Effect,
        msg: &RawMessage,
        ctx: &Context<'_>,
    ) -> Result<EffectOutput, IntakeError> {
        let sender = msg.sender.as_str();
        let output = match effect {
            Effect::Register { result, raw_text } => {
                let mut result = result.clone();
                let _registering = self.register_lock.lock().await;
                DuplicateChecker::new(self.store.as_ref(), &self.policy)
                    .check(&mut result)
                    .await?;
                let written = self.store.persist(&result, raw_text).await?;
                info!(
                    sender = %sender,
                    message_id = %result.message_id,
                    total = result.stats.total,
                    ok = result.stats.ok,
                    skip_format = result.stats.skip_format,
                    skip_duplicate = result.stats.skip_duplicate,
                    written,
                    "Registration processed"
                );
                EffectOutput::Registered { result, written }
            }
            Effect::FetchRecords { day, .. } => {
                EffectOutput::Records(self.store.records_for_day(sender, *day).await?)
            }
            Effect::DeleteRecords { ids } => {
                EffectOutput::Deleted(self.store.delete_records(sender, ids).await?)
            }
            Effect::DeleteByPositions { day, positions } => EffectOutput::Deleted(
                self.store
                    .delete_by_positions(sender, *day, positions)
                    .await?,
            ),
            Effect::UpdateField {
                record,
                field,
                value,
            } => {
                self.store
                    .update_field(sender, record.id, *field, value)
                    .await?;
                EffectOutput::Updated
            }
            Effect::UndoLast => EffectOutput::Deleted(
                self.store
                    .undo_last(sender, ctx.day_key, ctx.now, self.config.undo_window)
                    .await?,
            ),
            Effect::Recap { from, to } => EffectOutput::Recap(self.desk.recap(*from, *to).await?),
            Effect::ListContacts(_) => EffectOutput::Contacts(self.desk.list_contacts().await?),
            Effect::UpsertContact(contact) => {
                self.desk.upsert_contact(contact).await?;
                EffectOutput::ContactSaved
            }
            Effect::DeleteContact(contact) => {
                EffectOutput::ContactDeleted(self.desk.delete_contact(&contact.phone).await?)
            }
            Effect::QueueBroadcast(request) => {
                self.desk.queue_broadcast(request).await?;
                info!(
                    broadcast_id = %request.id,
                    target = request.target.as_str(),
                    send_at = %request.send_at,
                    "Broadcast queued"
                );
                EffectOutput::BroadcastQueued
            }
            Effect::Export { day } => {
                EffectOutput::Exported(self.desk.request_export(*day, sender).await?)
            }
            Effect::SetClosingWindow(window) => {
                let value = serde_json::to_value(window)
                    .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
                self.desk.set_setting(CLOSING_WINDOW_KEY, &value).await?;
                info!(start = %window.start, end = %window.end, "Closing window updated");
                EffectOutput::SettingSaved
            }
            Effect::ListBlocked(list) => {
                let mut entries = self.desk.list_blocked(*list).await?;
                entries.retain(|e| e.in_force(ctx.now));
                EffectOutput::Blocked(entries)
            }
            Effect::Block(entry) => {
                self.desk.block(entry).await?;
                info!(admin = %sender, list = entry.list.as_str(), "Blocklist entry saved");
                EffectOutput::BlockSaved
            }
            Effect::Unblock { list, value } => {
                EffectOutput::Unblocked(self.desk.unblock(*list, value).await?)
            }
            Effect::ListSenders { day } => {
                EffectOutput::Senders(self.desk.senders_for_day(*day).await?)
            }
            Effect::FetchSenderRecords { sender: owner, day } => {
                EffectOutput::Records(self.store.records_for_day(owner, *day).await?)
            }
            Effect::DeleteSenderRecords { sender: owner, ids } => {
                let names = self.store.delete_records(owner, ids).await?;
                info!(
                    admin = %sender,
                    owner = %owner,
                    deleted = names.len(),
                    "Admin deleted sender records"
                );
                EffectOutput::Deleted(names)
            }
        };
        Ok(output)
    }
}

fn log_transition(sender: &str, from: &SessionState, to: &SessionState) {
    if from.flow != to.flow {
        if from.flow.can_transition_to(to.flow) {
            debug!(sender = %sender, from = %from.flow, to = %to.flow, "User flow transition");
        } else {
            warn!(sender = %sender, from = %from.flow, to = %to.flow, "Unexpected user flow transition");
        }
    }
    if from.admin_flow != to.admin_flow {
        if from.admin_flow.can_transition_to(to.admin_flow) {
            debug!(sender = %sender, from = %from.admin_flow, to = %to.admin_flow, "Admin flow transition");
        } else {
            warn!(sender = %sender, from = %from.admin_flow, to = %to.admin_flow, "Unexpected admin flow transition");
        }
    }
    if !to.is_consistent() {
        warn!(sender = %sender, flow = %to.flow, "Pending text held outside site selection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::session::InMemorySessionStore;
    use crate::conversation::state::{AdminFlow, UserFlow};
    use crate::schedule::ClockTime;
    use crate::store::MemoryStore;
    use chrono::{DateTime, TimeZone, Utc};

    const FOUR: &str = "Budi Santoso\n5049488500001111\n3173010101010001\n3173010101010009";

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        // WIB wall-clock on 2026-03-02
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap() - chrono::TimeDelta::hours(7)
    }

    fn setup() -> (Conversation, Arc<MemoryStore>, Arc<InMemorySessionStore>) {
        let store = MemoryStore::new();
        let sessions = InMemorySessionStore::new();
        let config = IntakeConfig {
            admin_senders: vec!["boss".to_string()],
            ..IntakeConfig::default()
        };
        let conv = Conversation::new(config, store.clone(), store.clone(), sessions.clone());
        (conv, store, sessions)
    }

    async fn say(conv: &Conversation, sender: &str, text: &str, when: DateTime<Utc>) -> String {
        conv.handle(&RawMessage::new(sender, text).at(when))
            .await
            .join("\n")
    }

    #[tokio::test]
    async fn buffered_text_is_committed_after_site_choice() {
        let (conv, store, sessions) = setup();
        let now = at(10, 0);

        say(&conv, "alice", FOUR, now).await;
        assert_eq!(sessions.load("alice").await.flow, UserFlow::AwaitingSite);
        say(&conv, "alice", "2", now).await;
        let reply = say(&conv, "alice", "1", now).await;

        assert!(reply.contains("BERHASIL TERSIMPAN (1)"), "{reply}");
        let records = store.records_for_day("alice", day_key(now)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(store.logged().await, 1);
    }

    #[tokio::test]
    async fn failed_write_keeps_previous_state() {
        let (conv, store, sessions) = setup();
        let now = at(10, 0);
        say(&conv, "alice", FOUR, now).await;
        say(&conv, "alice", "2", now).await;
        let before = sessions.load("alice").await;

        store.set_fail_writes(true);
        let reply = say(&conv, "alice", "1", now).await;
        assert_eq!(reply, replies::generic_failure());
        assert_eq!(sessions.load("alice").await, before);
        assert_eq!(store.logged().await, 0);

        store.set_fail_writes(false);
        let reply = say(&conv, "alice", "1", now).await;
        assert!(reply.contains("BERHASIL TERSIMPAN (1)"), "{reply}");
    }

    #[tokio::test]
    async fn second_sender_hits_per_day_duplicate() {
        let (conv, store, _) = setup();
        let now = at(10, 0);
        for sender in ["alice", "bob"] {
            say(&conv, sender, "1", now).await;
            say(&conv, sender, "2", now).await;
            say(&conv, sender, "1", now).await;
        }

        say(&conv, "alice", FOUR, now).await;
        let reply = say(&conv, "bob", FOUR, now).await;
        assert!(reply.contains("TIDAK TERSIMPAN (1)"), "{reply}");
        assert!(!reply.contains("alice"));
        assert!(store.records_for_day("bob", day_key(now)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn admin_closing_window_applies_to_next_message() {
        let (conv, store, _) = setup();
        let now = at(10, 0);

        say(&conv, "boss", "admin", now).await;
        say(&conv, "boss", "9", now).await;
        say(&conv, "boss", "09.00", now).await;
        let reply = say(&conv, "boss", "11.00", now).await;
        assert!(reply.contains("09.00"), "{reply}");

        let stored = store.get_setting(CLOSING_WINDOW_KEY).await.unwrap().unwrap();
        let window: ClosingWindow = serde_json::from_value(stored).unwrap();
        assert_eq!(window.start, ClockTime::new(9, 0).unwrap());

        let reply = say(&conv, "alice", FOUR, now).await;
        assert!(reply.contains("tutup"), "{reply}");
    }

    #[tokio::test]
    async fn configured_admin_enters_admin_track() {
        let (conv, _, sessions) = setup();
        say(&conv, "boss", "ADMIN", at(10, 0)).await;
        assert_eq!(sessions.load("boss").await.admin_flow, AdminFlow::Menu);

        say(&conv, "mallory", "ADMIN", at(10, 0)).await;
        assert_eq!(sessions.load("mallory").await.admin_flow, AdminFlow::None);
    }

    #[tokio::test]
    async fn blocked_sender_is_refused_without_state_change() {
        let (conv, store, sessions) = setup();
        for value in ["6281234567890", "boss"] {
            store
                .block(&BlockedEntry {
                    list: BlockList::Sender,
                    value: value.to_string(),
                    reason: Some("spam".to_string()),
                    created_at: at(9, 0),
                })
                .await
                .unwrap();
        }

        let reply = say(&conv, "081234567890", FOUR, at(10, 0)).await;
        assert!(reply.contains("DIBLOKIR"), "{reply}");
        assert!(reply.contains("spam"), "{reply}");
        assert_eq!(sessions.load("081234567890").await, SessionState::default());
        assert_eq!(store.logged().await, 0);

        let reply = say(&conv, "6289999999999", "menu", at(10, 0)).await;
        assert!(!reply.contains("DIBLOKIR"), "{reply}");

        say(&conv, "boss", "admin", at(10, 0)).await;
        assert_eq!(sessions.load("boss").await.admin_flow, AdminFlow::Menu);
    }

    #[tokio::test]
    async fn admin_prunes_another_senders_records() {
        let (conv, store, sessions) = setup();
        let now = at(10, 0);
        say(&conv, "alice", "1", now).await;
        say(&conv, "alice", "2", now).await;
        say(&conv, "alice", "4", now).await;
        say(&conv, "alice", FOUR, now).await;
        assert_eq!(store.records_for_day("alice", day_key(now)).await.unwrap().len(), 1);

        say(&conv, "boss", "admin", now).await;
        let listing = say(&conv, "boss", "13", now).await;
        assert!(listing.contains("1. alice (1 data)"), "{listing}");
        let records = say(&conv, "boss", "1", now).await;
        assert!(records.contains("BUDI SANTOSO"), "{records}");
        let reply = say(&conv, "boss", "1", now).await;
        assert!(reply.contains("Data dihapus (1)"), "{reply}");

        assert!(store.records_for_day("alice", day_key(now)).await.unwrap().is_empty());
        assert_eq!(sessions.load("boss").await.admin_flow, AdminFlow::Menu);
    }
}
