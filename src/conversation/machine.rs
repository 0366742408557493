//! Pure transition functions for the user track.
//!
//! [`dispatch`] turns `(state, message)` into the next state plus either a
//! reply or a side effect for the engine to run. When the effect succeeds,
//! [`settle`] builds the reply from its output. Nothing here awaits, so
//! every transition can be tested without a store.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use super::admin;
use super::command::{
    Command, CommandParser, is_cancel, is_select_all, parse_choice, parse_confirmation,
    parse_positions,
};
use super::replies;
use super::state::{AdminFlow, EditSession, SessionState, UserFlow};
use crate::intake::blocks::{MIN_RECORD_LINES, check_structure, looks_like_registration};
use crate::intake::date::parse_flexible_date;
use crate::intake::fields::{clean_sub_site, revalidate_field};
use crate::intake::normalize::{extract_digits, normalize};
use crate::intake::{
    Field, IngestRequest, IngestionResult, RawMessage, Site, StructureError, UniquenessPolicy,
    ingest,
};
use crate::schedule::{ClosingWindow, day_key_minus};
use crate::store::{
    BlockList, BlockedEntry, BroadcastRequest, Contact, DayRecap, ExportReceipt, SenderTally,
    StoredRecord,
};

/// Everything a transition may look at besides the session itself.
#[derive(Debug, Clone)]
pub struct Context<'a> {
    pub now: DateTime<Utc>,
    pub day_key: NaiveDate,
    pub closing: ClosingWindow,
    pub card_prefix: &'a str,
    pub undo_minutes: u64,
    pub policy: &'a UniquenessPolicy,
}

/// Why records are being fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingPurpose {
    Check,
    Delete,
    Edit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactPurpose {
    Rename,
    Delete,
}

/// A collaborator call requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Run the per-day duplicate check, then persist.
    Register {
        result: IngestionResult,
        raw_text: String,
    },
    FetchRecords {
        day: NaiveDate,
        purpose: ListingPurpose,
    },
    DeleteRecords {
        ids: Vec<Uuid>,
    },
    DeleteByPositions {
        day: NaiveDate,
        positions: Vec<usize>,
    },
    UpdateField {
        record: StoredRecord,
        field: Field,
        value: String,
    },
    UndoLast,
    Recap {
        from: NaiveDate,
        to: NaiveDate,
    },
    ListContacts(ContactPurpose),
    UpsertContact(Contact),
    DeleteContact(Contact),
    QueueBroadcast(BroadcastRequest),
    Export {
        day: NaiveDate,
    },
    SetClosingWindow(ClosingWindow),
    ListBlocked(BlockList),
    Block(BlockedEntry),
    Unblock {
        list: BlockList,
        value: String,
    },
    ListSenders {
        day: NaiveDate,
    },
    /// Another sender's records, for an admin to prune.
    FetchSenderRecords {
        sender: String,
        day: NaiveDate,
    },
    DeleteSenderRecords {
        sender: String,
        ids: Vec<Uuid>,
    },
}

/// What a successful effect produced.
#[derive(Debug, Clone, PartialEq)]
pub enum EffectOutput {
    Registered {
        result: IngestionResult,
        written: usize,
    },
    Records(Vec<StoredRecord>),
    Deleted(Vec<String>),
    Updated,
    Recap(Vec<DayRecap>),
    Contacts(Vec<Contact>),
    ContactSaved,
    ContactDeleted(bool),
    BroadcastQueued,
    Exported(ExportReceipt),
    SettingSaved,
    Blocked(Vec<BlockedEntry>),
    BlockSaved,
    Unblocked(bool),
    Senders(Vec<SenderTally>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Reply(Vec<String>),
    Effect(Effect),
}

/// Result of one transition. `next` is committed only if the effect, when
/// there is one, succeeds.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub next: SessionState,
    pub outcome: Outcome,
}

impl Step {
    pub(crate) fn reply(next: SessionState, text: String) -> Self {
        Self {
            next,
            outcome: Outcome::Reply(vec![text]),
        }
    }

    pub(crate) fn effect(next: SessionState, effect: Effect) -> Self {
        Self {
            next,
            outcome: Outcome::Effect(effect),
        }
    }
}

/// Route one message. Precedence: active admin flow (admins only), then the
/// active user flow, then menu commands, then registration detection.
pub fn dispatch(state: &SessionState, msg: &RawMessage, ctx: &Context<'_>) -> Step {
    if msg.is_admin && state.admin_flow != AdminFlow::None {
        return admin::handle(state, msg, ctx);
    }

    let text = msg.text.trim();
    if state.flow == UserFlow::None {
        return idle(state, msg, ctx);
    }
    if !state.flow.is_protected() && is_cancel(text) {
        let mut next = state.clone();
        next.reset_user_flow();
        return Step::reply(next, replies::cancelled());
    }

    match state.flow {
        UserFlow::None => idle(state, msg, ctx),
        UserFlow::AwaitingSite => on_site(state, text, ctx),
        UserFlow::AwaitingSubSite => on_sub_site(state, text, msg, ctx),
        UserFlow::AwaitingManualSite => on_manual_site(state, text, msg, ctx),
        UserFlow::CheckMenu => on_check_menu(state, text, ctx),
        UserFlow::CheckSpecificDate => on_check_date(state, text),
        UserFlow::DeleteData => on_delete(state, text),
        UserFlow::EditPickRecord => on_edit_pick_record(state, text),
        UserFlow::EditPickField => on_edit_pick_field(state, text),
        UserFlow::EditPickLocation => on_edit_pick_location(state, text),
        UserFlow::EditInputValue => on_edit_input(state, text, ctx),
        UserFlow::EditConfirm => on_edit_confirm(state, text),
    }
}

// ── Idle ────────────────────────────────────────────────────────────

fn idle(state: &SessionState, msg: &RawMessage, ctx: &Context<'_>) -> Step {
    let mut next = state.clone();
    match CommandParser::parse(&msg.text) {
        Some(Command::Register) => {
            next.chosen_site = None;
            next.chosen_sub_site = None;
            next.pending_raw_text = None;
            next.flow = UserFlow::AwaitingSite;
            Step::reply(next, replies::site_menu())
        }
        Some(Command::Check) => {
            next.flow = UserFlow::CheckMenu;
            Step::reply(next, replies::check_menu())
        }
        Some(Command::Delete) => {
            next.flow = UserFlow::DeleteData;
            Step::effect(
                next,
                Effect::FetchRecords {
                    day: ctx.day_key,
                    purpose: ListingPurpose::Delete,
                },
            )
        }
        Some(Command::DeletePositions(positions)) => Step::effect(
            next,
            Effect::DeleteByPositions {
                day: ctx.day_key,
                positions,
            },
        ),
        Some(Command::Edit) => {
            next.flow = UserFlow::EditPickRecord;
            Step::effect(
                next,
                Effect::FetchRecords {
                    day: ctx.day_key,
                    purpose: ListingPurpose::Edit,
                },
            )
        }
        Some(Command::Help) => Step::reply(next, replies::help(&ctx.closing, ctx.undo_minutes)),
        Some(Command::Menu) => Step::reply(next, replies::main_menu()),
        Some(Command::Undo) => Step::effect(next, Effect::UndoLast),
        Some(Command::Admin) if msg.is_admin => {
            next.admin_flow = AdminFlow::Menu;
            next.reset_admin_draft();
            Step::reply(next, replies::admin_menu())
        }
        Some(Command::Admin) | None => free_text(next, msg, ctx),
    }
}

/// Multi-line text carrying at least one card-sized digit run.
fn is_registration_attempt(lines: &[String]) -> bool {
    looks_like_registration(lines)
        || (lines.len() >= MIN_RECORD_LINES - 2
            && lines.iter().any(|l| extract_digits(l).len() >= 16))
}

fn free_text(mut next: SessionState, msg: &RawMessage, ctx: &Context<'_>) -> Step {
    let lines = normalize(&msg.text);
    if !is_registration_attempt(&lines) {
        return Step::reply(next, replies::main_menu());
    }
    if ctx.closing.is_closed(ctx.now) {
        return Step::reply(next, replies::closed(&ctx.closing.reopens_at(ctx.now)));
    }

    match next.resolved_site() {
        Some((site, sub_site)) => {
            let sub_site = sub_site.to_string();
            register(next, &msg.text, site, &sub_site, msg, ctx)
        }
        None => {
            next.pending_raw_text = Some(msg.text.clone());
            next.flow = UserFlow::AwaitingSite;
            Step::reply(next, replies::buffered_prompt())
        }
    }
}

/// Run the pipeline on `text` for a resolved site. A structural failure
/// rejects the whole text; otherwise the records go to the engine.
fn register(
    next: SessionState,
    text: &str,
    site: Site,
    sub_site: &str,
    msg: &RawMessage,
    ctx: &Context<'_>,
) -> Step {
    if ctx.closing.is_closed(ctx.now) {
        return Step::reply(next, replies::closed(&ctx.closing.reopens_at(ctx.now)));
    }

    let req = IngestRequest {
        message: msg,
        text,
        site,
        sub_site,
        card_prefix: ctx.card_prefix,
    };
    match ingest(&req, ctx.policy) {
        Ok(result) => Step::effect(
            next,
            Effect::Register {
                result,
                raw_text: text.to_string(),
            },
        ),
        Err(err) => Step::reply(next, replies::structure_rejected(&err, site)),
    }
}

// ── Site selection ──────────────────────────────────────────────────

fn parse_site(text: &str) -> Option<Site> {
    match text.to_uppercase().as_str() {
        "1" | "PASARJAYA" => Some(Site::Pasarjaya),
        "2" | "DHARMAJAYA" => Some(Site::Dharmajaya),
        _ => None,
    }
}

fn on_site(state: &SessionState, text: &str, ctx: &Context<'_>) -> Step {
    let Some(site) = parse_site(text) else {
        return Step::reply(
            state.clone(),
            format!("{}\n\n{}", replies::invalid_choice(), replies::site_menu()),
        );
    };

    let mut next = state.clone();
    if let Some(pending) = &state.pending_raw_text {
        if ctx.closing.is_closed(ctx.now) {
            next.reset_user_flow();
            return Step::reply(next, replies::closed(&ctx.closing.reopens_at(ctx.now)));
        }
        // Keep the buffer so the sender can pick the site that fits.
        if let Err(err @ StructureError::ModeMismatch { .. }) =
            check_structure(&normalize(pending), site.mode())
        {
            return Step::reply(
                next,
                format!(
                    "{}\n\n{}",
                    replies::structure_rejected(&err, site),
                    replies::site_menu()
                ),
            );
        }
    }

    next.chosen_site = Some(site);
    next.chosen_sub_site = None;
    next.flow = UserFlow::AwaitingSubSite;
    Step::reply(next, replies::sub_site_menu(site))
}

fn on_sub_site(state: &SessionState, text: &str, msg: &RawMessage, ctx: &Context<'_>) -> Step {
    let mut next = state.clone();
    let Some(site) = state.chosen_site else {
        next.flow = UserFlow::AwaitingSite;
        return Step::reply(next, replies::site_menu());
    };

    let subs = site.sub_sites();
    match parse_choice(text) {
        Some(n) if n <= subs.len() => resolve_sub_site(next, site, subs[n - 1], msg, ctx),
        Some(n) if site.allows_manual_sub_site() && n == subs.len() + 1 => {
            next.flow = UserFlow::AwaitingManualSite;
            Step::reply(next, replies::manual_site_prompt())
        }
        _ => Step::reply(
            next,
            format!("{}\n\n{}", replies::invalid_choice(), replies::sub_site_menu(site)),
        ),
    }
}

fn on_manual_site(state: &SessionState, text: &str, msg: &RawMessage, ctx: &Context<'_>) -> Step {
    let mut next = state.clone();
    let Some(site) = state.chosen_site else {
        next.flow = UserFlow::AwaitingSite;
        return Step::reply(next, replies::site_menu());
    };

    let Some(name) = clean_sub_site(text) else {
        return Step::reply(next, replies::manual_site_too_short());
    };
    resolve_sub_site(next, site, &name, msg, ctx)
}

/// Sub-site chosen: the site is now sticky. Buffered text is replayed once
/// and the buffer cleared whatever the outcome.
fn resolve_sub_site(
    mut next: SessionState,
    site: Site,
    sub_site: &str,
    msg: &RawMessage,
    ctx: &Context<'_>,
) -> Step {
    next.chosen_site = Some(site);
    next.chosen_sub_site = Some(sub_site.to_string());
    next.flow = UserFlow::None;

    match next.pending_raw_text.take() {
        None => Step::reply(next, replies::site_ready(site, sub_site)),
        Some(text) => register(next, &text, site, sub_site, msg, ctx),
    }
}

// ── Check ───────────────────────────────────────────────────────────

fn on_check_menu(state: &SessionState, text: &str, ctx: &Context<'_>) -> Step {
    let mut next = state.clone();
    let day = match parse_choice(text) {
        Some(1) => ctx.day_key,
        Some(2) => day_key_minus(ctx.now, 1),
        Some(3) => {
            next.flow = UserFlow::CheckSpecificDate;
            return Step::reply(next, replies::ask_date());
        }
        _ => {
            return Step::reply(
                next,
                format!("{}\n\n{}", replies::invalid_choice(), replies::check_menu()),
            );
        }
    };
    next.reset_user_flow();
    Step::effect(
        next,
        Effect::FetchRecords {
            day,
            purpose: ListingPurpose::Check,
        },
    )
}

fn on_check_date(state: &SessionState, text: &str) -> Step {
    let mut next = state.clone();
    match parse_flexible_date(text) {
        Some(day) => {
            next.reset_user_flow();
            Step::effect(
                next,
                Effect::FetchRecords {
                    day,
                    purpose: ListingPurpose::Check,
                },
            )
        }
        None => Step::reply(next, replies::invalid_date()),
    }
}

// ── Delete ──────────────────────────────────────────────────────────

fn on_delete(state: &SessionState, text: &str) -> Step {
    let ids: Vec<Uuid> = if is_select_all(text) {
        state.listing.iter().map(|r| r.id).collect()
    } else {
        parse_positions(text)
            .unwrap_or_default()
            .iter()
            .filter_map(|&p| state.listing.get(p - 1))
            .map(|r| r.id)
            .collect()
    };

    let mut next = state.clone();
    if ids.is_empty() {
        return Step::reply(next, replies::invalid_choice());
    }
    next.reset_user_flow();
    Step::effect(next, Effect::DeleteRecords { ids })
}

// ── Edit ────────────────────────────────────────────────────────────

fn on_edit_pick_record(state: &SessionState, text: &str) -> Step {
    let mut next = state.clone();
    let Some(record) = parse_choice(text).and_then(|n| state.listing.get(n - 1)) else {
        return Step::reply(next, replies::invalid_choice());
    };
    next.edit = Some(EditSession {
        record: record.clone(),
        field: None,
        new_value: None,
    });
    next.flow = UserFlow::EditPickField;
    Step::reply(next, replies::edit_pick_field(record))
}

fn on_edit_pick_field(state: &SessionState, text: &str) -> Step {
    let mut next = state.clone();
    let Some(edit) = next.edit.as_mut() else {
        next.reset_user_flow();
        return Step::reply(next, replies::main_menu());
    };

    let fields = Field::editable(edit.record.fields.mode());
    let Some(&field) = parse_choice(text).and_then(|n| fields.get(n - 1)) else {
        return Step::reply(next, replies::invalid_choice());
    };
    if field == Field::Location {
        let Some(site) = record_site(&edit.record) else {
            return Step::reply(next, replies::location_unknown());
        };
        edit.field = Some(field);
        next.flow = UserFlow::EditPickLocation;
        return Step::reply(next, replies::edit_location_menu(site));
    }
    edit.field = Some(field);
    let current = edit.record.fields.value(field);
    next.flow = UserFlow::EditInputValue;
    Step::reply(next, replies::edit_input(field, current.as_deref()))
}

fn record_site(record: &StoredRecord) -> Option<Site> {
    record.fields.site_context.as_deref().and_then(Site::from_context)
}

/// Pick a new pickup point under the record's site. The free-text entry
/// continues through the normal value input.
fn on_edit_pick_location(state: &SessionState, text: &str) -> Step {
    let mut next = state.clone();
    let Some((edit, site)) = next
        .edit
        .as_mut()
        .and_then(|e| record_site(&e.record).map(|s| (e, s)))
    else {
        next.reset_user_flow();
        return Step::reply(next, replies::main_menu());
    };

    let subs = site.sub_sites();
    match parse_choice(text) {
        Some(n) if n <= subs.len() => {
            let value = site.context(subs[n - 1]);
            let reply = replies::edit_confirm(
                Field::Location,
                edit.record.fields.site_context.as_deref(),
                &value,
            );
            edit.field = Some(Field::Location);
            edit.new_value = Some(value);
            next.flow = UserFlow::EditConfirm;
            Step::reply(next, reply)
        }
        Some(n) if site.allows_manual_sub_site() && n == subs.len() + 1 => {
            next.flow = UserFlow::EditInputValue;
            Step::reply(next, replies::manual_site_prompt())
        }
        _ => Step::reply(
            next,
            format!("{}\n\n{}", replies::invalid_choice(), replies::edit_location_menu(site)),
        ),
    }
}

fn on_edit_input(state: &SessionState, text: &str, ctx: &Context<'_>) -> Step {
    let mut next = state.clone();
    let Some((edit, field)) = next
        .edit
        .as_mut()
        .and_then(|e| e.field.map(|f| (e, f)))
    else {
        next.reset_user_flow();
        return Step::reply(next, replies::main_menu());
    };

    match revalidate_field(field, text, &edit.record.fields, ctx.card_prefix) {
        Ok(value) => {
            let reply =
                replies::edit_confirm(field, edit.record.fields.value(field).as_deref(), &value);
            edit.new_value = Some(value);
            next.flow = UserFlow::EditConfirm;
            Step::reply(next, reply)
        }
        Err(errors) => Step::reply(next, replies::edit_invalid(&errors)),
    }
}

fn on_edit_confirm(state: &SessionState, text: &str) -> Step {
    let mut next = state.clone();
    let draft = next.edit.take();
    let Some(EditSession {
        record,
        field: Some(field),
        new_value: Some(value),
    }) = draft
    else {
        next.reset_user_flow();
        return Step::reply(next, replies::main_menu());
    };

    match parse_confirmation(text) {
        Some(true) => {
            next.reset_user_flow();
            Step::effect(
                next,
                Effect::UpdateField {
                    record,
                    field,
                    value,
                },
            )
        }
        Some(false) => {
            next.reset_user_flow();
            Step::reply(next, replies::edit_discarded())
        }
        None => {
            let reply = replies::edit_confirm(field, record.fields.value(field).as_deref(), &value);
            next.edit = Some(EditSession {
                record,
                field: Some(field),
                new_value: Some(value),
            });
            Step::reply(next, reply)
        }
    }
}

// ── Settling effects ────────────────────────────────────────────────

/// Build the reply for a successful effect and apply what it returned to
/// the pending state.
pub fn settle(
    mut next: SessionState,
    effect: &Effect,
    output: EffectOutput,
    ctx: &Context<'_>,
) -> (SessionState, Vec<String>) {
    let reply = match (effect, output) {
        (Effect::Register { .. }, EffectOutput::Registered { result, written }) => {
            replies::ingestion_summary(&result, written)
        }
        (Effect::FetchRecords { day, purpose }, EffectOutput::Records(records)) => {
            match purpose {
                ListingPurpose::Check => replies::record_listing(*day, &records),
                _ if records.is_empty() => {
                    next.reset_user_flow();
                    replies::no_records(*day)
                }
                ListingPurpose::Delete => {
                    let reply = replies::delete_prompt(*day, &records);
                    next.listing = records;
                    reply
                }
                ListingPurpose::Edit => {
                    let reply = replies::edit_pick_record(*day, &records);
                    next.listing = records;
                    reply
                }
            }
        }
        (
            Effect::DeleteRecords { .. } | Effect::DeleteByPositions { .. },
            EffectOutput::Deleted(names),
        ) => replies::deleted(&names),
        (Effect::UpdateField { field, value, .. }, EffectOutput::Updated) => {
            replies::edit_saved(*field, value)
        }
        (Effect::UndoLast, EffectOutput::Deleted(names)) if names.is_empty() => {
            replies::undo_nothing(ctx.undo_minutes)
        }
        (Effect::UndoLast, EffectOutput::Deleted(names)) => replies::undo_done(&names),
        (effect, output) => return admin::settle(next, effect, output),
    };
    (next, vec![reply])
}
