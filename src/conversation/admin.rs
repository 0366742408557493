//! Admin track: menu, recap, contacts, broadcast, export, closing-window
//! configuration, blocklists and pruning another sender's records. Same
//! discipline as the user track: pure transitions that either reply or
//! request one collaborator call.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use uuid::Uuid;

use super::command::{is_cancel, is_select_all, parse_choice, parse_positions};
use super::machine::{Context, ContactPurpose, Effect, EffectOutput, Step};
use super::replies;
use super::state::{AdminFlow, SessionState};
use crate::intake::RawMessage;
use crate::intake::date::parse_flexible_date;
use crate::intake::normalize::extract_digits;
use crate::intake::pattern;
use crate::schedule::{ClockTime, ClosingWindow, day_key_minus, from_wib, to_wib};
use crate::store::{BlockList, BlockedEntry, BroadcastRequest, BroadcastTarget, Contact};

static DATE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"\d{1,2}\s*[-/.]\s*\d{1,2}\s*[-/.]\s*\d{2,4}"));

const MIN_PHONE_DIGITS: usize = 9;
const MAX_PHONE_DIGITS: usize = 15;

/// ID and family numbers on a blocklist are always this long.
const BLOCKED_NUMBER_DIGITS: usize = 16;

/// Typed at the reason prompt to block without a reason.
const NO_REASON: &str = "-";

/// Normalize a typed phone number to the `62…` form.
pub fn normalize_phone(input: &str) -> Option<String> {
    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
    let phone = if let Some(rest) = digits.strip_prefix('0') {
        format!("62{rest}")
    } else if digits.starts_with('8') {
        format!("62{digits}")
    } else {
        digits
    };
    (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS)
        .contains(&phone.len())
        .then_some(phone)
}

/// Keys a sender may be listed under on the sender blocklist: the id as
/// received and, when it reads as a phone number, its `62…` form.
pub fn sender_block_keys(sender: &str) -> Vec<String> {
    let raw = sender.trim().to_string();
    match normalize_phone(&raw) {
        Some(phone) if phone != raw => vec![raw, phone],
        _ => vec![raw],
    }
}

/// A typed blocklist value in its stored form.
fn normalize_block_value(list: BlockList, input: &str) -> Option<String> {
    match list {
        BlockList::Id | BlockList::Family => {
            let digits = extract_digits(input);
            (digits.len() == BLOCKED_NUMBER_DIGITS).then_some(digits)
        }
        BlockList::Sender => normalize_phone(input),
    }
}

/// `DD-MM-YYYY s/d DD-MM-YYYY`, any separator between the two dates.
/// Returned in ascending order.
fn parse_range(text: &str) -> Option<(chrono::NaiveDate, chrono::NaiveDate)> {
    let dates: Vec<_> = DATE_TOKEN
        .find_iter(text)
        .filter_map(|m| parse_flexible_date(m.as_str()))
        .collect();
    match dates.as_slice() {
        [a, b] => Some((*a.min(b), *a.max(b))),
        _ => None,
    }
}

/// `HH.MM` today, or `DD-MM-YYYY HH.MM`, both in WIB.
fn parse_send_time(text: &str, ctx: &Context<'_>) -> Option<DateTime<Utc>> {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    let time = ClockTime::parse(tokens.pop()?)?;
    let date = if tokens.is_empty() {
        ctx.day_key
    } else {
        parse_flexible_date(&tokens.join(" "))?
    };
    Some(from_wib(date, time))
}

fn clean_contact_name(text: &str) -> Option<String> {
    let name = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (name.chars().count() >= 2).then_some(name)
}

fn back_to_menu(mut next: SessionState, text: String) -> Step {
    next.admin_flow = AdminFlow::Menu;
    next.reset_admin_draft();
    Step::reply(next, text)
}

fn effect_to_menu(mut next: SessionState, effect: Effect) -> Step {
    next.admin_flow = AdminFlow::Menu;
    next.reset_admin_draft();
    Step::effect(next, effect)
}

fn retry(next: SessionState, text: String) -> Step {
    Step::reply(next, text)
}

/// Back to the current blocklist's menu once the effect succeeds.
fn effect_to_block_menu(mut next: SessionState, effect: Effect) -> Step {
    next.admin_flow = AdminFlow::BlockMenu;
    next.admin_draft.block_value = None;
    Step::effect(next, effect)
}

pub fn handle(state: &SessionState, msg: &RawMessage, ctx: &Context<'_>) -> Step {
    let text = msg.text.trim();
    let next = state.clone();

    if !state.admin_flow.is_protected() && is_cancel(text) {
        return back_to_menu(next, replies::admin_menu());
    }

    match state.admin_flow {
        AdminFlow::None => back_to_menu(next, replies::admin_menu()),
        AdminFlow::Menu => on_menu(next, text, ctx),
        AdminFlow::AskDate => match parse_flexible_date(text) {
            Some(day) => effect_to_menu(next, Effect::Recap { from: day, to: day }),
            None => retry(next, replies::invalid_date()),
        },
        AdminFlow::AskRange => match parse_range(text) {
            Some((from, to)) => effect_to_menu(next, Effect::Recap { from, to }),
            None => retry(next, replies::ask_range()),
        },
        AdminFlow::ContactAddName => on_contact_name(next, text, AdminFlow::ContactAddPhone),
        AdminFlow::ContactAddPhone => on_contact_phone(next, text),
        AdminFlow::ContactEditPick => on_contact_pick(next, text, AdminFlow::ContactEditName),
        AdminFlow::ContactEditName => on_contact_rename(next, text),
        AdminFlow::ContactDeletePick => on_contact_pick(next, text, AdminFlow::ContactDeletePick),
        AdminFlow::BroadcastSelect => on_broadcast_select(next, text),
        AdminFlow::BroadcastCompose => on_broadcast_compose(next, text),
        AdminFlow::BroadcastPreview => on_broadcast_preview(next, text, msg, ctx),
        AdminFlow::BroadcastSchedule => on_broadcast_schedule(next, text, msg, ctx),
        AdminFlow::ExportSelectDate => on_export(next, text, ctx),
        AdminFlow::CloseTimeStart => on_close_start(next, text),
        AdminFlow::CloseTimeEnd => on_close_end(next, text, ctx),
        AdminFlow::BlockMenu => on_block_menu(next, text),
        AdminFlow::BlockAddValue => on_block_value(next, text),
        AdminFlow::BlockAddReason => on_block_reason(next, text, ctx),
        AdminFlow::BlockRemoveValue => on_unblock_value(next, text),
        AdminFlow::DeleteUserPick => on_delete_user_pick(next, text, ctx),
        AdminFlow::DeleteUserRecords => on_delete_user_records(next, text),
    }
}

fn on_menu(mut next: SessionState, text: &str, ctx: &Context<'_>) -> Step {
    if text == "0" {
        next.admin_flow = AdminFlow::None;
        next.reset_admin_draft();
        return Step::reply(next, replies::admin_exit());
    }

    let (flow, reply) = match parse_choice(text) {
        Some(1) => {
            return Step::effect(
                next,
                Effect::Recap {
                    from: ctx.day_key,
                    to: ctx.day_key,
                },
            );
        }
        Some(2) => (AdminFlow::AskDate, replies::ask_date()),
        Some(3) => (AdminFlow::AskRange, replies::ask_range()),
        Some(4) => (AdminFlow::ContactAddName, replies::ask_contact_name()),
        Some(5) => {
            next.admin_flow = AdminFlow::ContactEditPick;
            return Step::effect(next, Effect::ListContacts(ContactPurpose::Rename));
        }
        Some(6) => {
            next.admin_flow = AdminFlow::ContactDeletePick;
            return Step::effect(next, Effect::ListContacts(ContactPurpose::Delete));
        }
        Some(7) => (AdminFlow::BroadcastSelect, replies::broadcast_select()),
        Some(8) => (AdminFlow::ExportSelectDate, replies::export_prompt()),
        Some(9) => (AdminFlow::CloseTimeStart, replies::ask_close_start(&ctx.closing)),
        Some(10) => open_block_list(&mut next, BlockList::Id),
        Some(11) => open_block_list(&mut next, BlockList::Family),
        Some(12) => open_block_list(&mut next, BlockList::Sender),
        Some(13) => {
            next.admin_flow = AdminFlow::DeleteUserPick;
            return Step::effect(next, Effect::ListSenders { day: ctx.day_key });
        }
        _ => {
            return Step::reply(
                next,
                format!("{}\n\n{}", replies::invalid_choice(), replies::admin_menu()),
            );
        }
    };
    next.admin_flow = flow;
    Step::reply(next, reply)
}

// ── Contacts ────────────────────────────────────────────────────────

fn on_contact_name(mut next: SessionState, text: &str, then: AdminFlow) -> Step {
    let Some(name) = clean_contact_name(text) else {
        return retry(next, replies::ask_contact_name());
    };
    next.admin_draft.contact_name = Some(name);
    next.admin_flow = then;
    Step::reply(next, replies::ask_contact_phone())
}

fn on_contact_phone(next: SessionState, text: &str) -> Step {
    let Some(phone) = normalize_phone(text) else {
        return retry(next, replies::invalid_phone());
    };
    let Some(name) = next.admin_draft.contact_name.clone() else {
        return back_to_menu(next, replies::admin_menu());
    };
    effect_to_menu(next, Effect::UpsertContact(Contact { phone, name }))
}

/// Pick from the listed contacts. Renaming asks for the new name next;
/// deleting runs immediately.
fn on_contact_pick(mut next: SessionState, text: &str, then: AdminFlow) -> Step {
    let Some(contact) = parse_choice(text).and_then(|n| next.admin_draft.contacts.get(n - 1))
    else {
        return retry(next, replies::invalid_choice());
    };
    let contact = contact.clone();

    if then == AdminFlow::ContactDeletePick {
        return effect_to_menu(next, Effect::DeleteContact(contact));
    }
    next.admin_draft.contact = Some(contact);
    next.admin_flow = then;
    Step::reply(next, replies::ask_contact_name())
}

fn on_contact_rename(next: SessionState, text: &str) -> Step {
    let Some(name) = clean_contact_name(text) else {
        return retry(next, replies::ask_contact_name());
    };
    let Some(contact) = next.admin_draft.contact.clone() else {
        return back_to_menu(next, replies::admin_menu());
    };
    effect_to_menu(
        next,
        Effect::UpsertContact(Contact {
            phone: contact.phone,
            name,
        }),
    )
}

// ── Broadcast ───────────────────────────────────────────────────────

fn on_broadcast_select(mut next: SessionState, text: &str) -> Step {
    let target = match parse_choice(text) {
        Some(1) => BroadcastTarget::AllContacts,
        Some(2) => BroadcastTarget::TodaysSenders,
        _ => return retry(next, replies::broadcast_select()),
    };
    next.admin_draft.broadcast_target = Some(target);
    next.admin_flow = AdminFlow::BroadcastCompose;
    Step::reply(next, replies::broadcast_compose())
}

fn on_broadcast_compose(mut next: SessionState, text: &str) -> Step {
    if text.is_empty() {
        return retry(next, replies::broadcast_compose());
    }
    next.admin_draft.broadcast_text = Some(text.to_string());
    next.admin_flow = AdminFlow::BroadcastPreview;
    Step::reply(next, replies::broadcast_preview(text))
}

fn queue_broadcast(next: SessionState, msg: &RawMessage, send_at: DateTime<Utc>) -> Step {
    let draft = &next.admin_draft;
    let (Some(target), Some(text)) = (draft.broadcast_target, draft.broadcast_text.clone()) else {
        return back_to_menu(next, replies::admin_menu());
    };
    let request = BroadcastRequest {
        id: Uuid::new_v4(),
        target,
        text,
        send_at,
        requested_by: msg.sender.clone(),
    };
    effect_to_menu(next, Effect::QueueBroadcast(request))
}

fn on_broadcast_preview(
    mut next: SessionState,
    text: &str,
    msg: &RawMessage,
    ctx: &Context<'_>,
) -> Step {
    match parse_choice(text) {
        Some(1) => queue_broadcast(next, msg, ctx.now),
        Some(2) => {
            next.admin_flow = AdminFlow::BroadcastSchedule;
            Step::reply(next, replies::broadcast_schedule_prompt())
        }
        _ => {
            let preview = next.admin_draft.broadcast_text.clone().unwrap_or_default();
            retry(next, replies::broadcast_preview(&preview))
        }
    }
}

fn on_broadcast_schedule(
    next: SessionState,
    text: &str,
    msg: &RawMessage,
    ctx: &Context<'_>,
) -> Step {
    match parse_send_time(text, ctx) {
        Some(at) if at <= ctx.now => retry(next, replies::broadcast_time_passed()),
        Some(at) => queue_broadcast(next, msg, at),
        None => retry(next, replies::broadcast_schedule_prompt()),
    }
}

// ── Blocklists ──────────────────────────────────────────────────────

fn open_block_list(next: &mut SessionState, list: BlockList) -> (AdminFlow, String) {
    next.admin_draft.block_list = Some(list);
    next.admin_draft.block_value = None;
    (AdminFlow::BlockMenu, replies::block_menu(list))
}

fn on_block_menu(mut next: SessionState, text: &str) -> Step {
    let Some(list) = next.admin_draft.block_list else {
        return back_to_menu(next, replies::admin_menu());
    };
    match parse_choice(text) {
        Some(1) => {
            next.admin_flow = AdminFlow::BlockAddValue;
            Step::reply(next, replies::ask_block_value(list))
        }
        Some(2) => Step::effect(next, Effect::ListBlocked(list)),
        Some(3) => {
            next.admin_flow = AdminFlow::BlockRemoveValue;
            Step::reply(next, replies::ask_unblock_value(list))
        }
        _ => retry(
            next,
            format!("{}\n\n{}", replies::invalid_choice(), replies::block_menu(list)),
        ),
    }
}

fn on_block_value(mut next: SessionState, text: &str) -> Step {
    let Some(list) = next.admin_draft.block_list else {
        return back_to_menu(next, replies::admin_menu());
    };
    let Some(value) = normalize_block_value(list, text) else {
        return retry(next, replies::invalid_block_value(list));
    };
    next.admin_draft.block_value = Some(value);
    next.admin_flow = AdminFlow::BlockAddReason;
    Step::reply(next, replies::ask_block_reason())
}

fn on_block_reason(next: SessionState, text: &str, ctx: &Context<'_>) -> Step {
    let draft = &next.admin_draft;
    let (Some(list), Some(value)) = (draft.block_list, draft.block_value.clone()) else {
        return back_to_menu(next, replies::admin_menu());
    };
    let reason = (!text.is_empty() && text != NO_REASON).then(|| text.to_string());
    let entry = BlockedEntry {
        list,
        value,
        reason,
        created_at: ctx.now,
    };
    effect_to_block_menu(next, Effect::Block(entry))
}

fn on_unblock_value(next: SessionState, text: &str) -> Step {
    let Some(list) = next.admin_draft.block_list else {
        return back_to_menu(next, replies::admin_menu());
    };
    match normalize_block_value(list, text) {
        Some(value) => effect_to_block_menu(next, Effect::Unblock { list, value }),
        None => retry(next, replies::invalid_block_value(list)),
    }
}

// ── Pruning a sender's records ──────────────────────────────────────

fn on_delete_user_pick(mut next: SessionState, text: &str, ctx: &Context<'_>) -> Step {
    let Some(tally) = parse_choice(text).and_then(|n| next.admin_draft.senders.get(n - 1)) else {
        return retry(next, replies::invalid_choice());
    };
    let sender = tally.sender.clone();
    next.admin_flow = AdminFlow::DeleteUserRecords;
    Step::effect(
        next,
        Effect::FetchSenderRecords {
            sender,
            day: ctx.day_key,
        },
    )
}

fn on_delete_user_records(next: SessionState, text: &str) -> Step {
    let records = &next.admin_draft.sender_records;
    let Some(sender) = records.first().map(|r| r.sender.clone()) else {
        return back_to_menu(next, replies::admin_menu());
    };
    let ids: Vec<Uuid> = if is_select_all(text) {
        records.iter().map(|r| r.id).collect()
    } else {
        parse_positions(text)
            .unwrap_or_default()
            .iter()
            .filter_map(|&p| records.get(p - 1))
            .map(|r| r.id)
            .collect()
    };
    if ids.is_empty() {
        return retry(next, replies::invalid_choice());
    }
    effect_to_menu(next, Effect::DeleteSenderRecords { sender, ids })
}

// ── Export and closing window ───────────────────────────────────────

fn on_export(next: SessionState, text: &str, ctx: &Context<'_>) -> Step {
    let day = match text {
        "1" => Some(ctx.day_key),
        "2" => Some(day_key_minus(ctx.now, 1)),
        other => parse_flexible_date(other),
    };
    match day {
        Some(day) => effect_to_menu(next, Effect::Export { day }),
        None => retry(next, replies::invalid_date()),
    }
}

fn on_close_start(mut next: SessionState, text: &str) -> Step {
    let Some(start) = ClockTime::parse(text) else {
        return retry(next, replies::invalid_time());
    };
    next.admin_draft.close_start = Some(start);
    next.admin_flow = AdminFlow::CloseTimeEnd;
    Step::reply(next, replies::ask_close_end())
}

fn on_close_end(next: SessionState, text: &str, ctx: &Context<'_>) -> Step {
    let Some(end) = ClockTime::parse(text) else {
        return retry(next, replies::invalid_time());
    };
    let Some(start) = next.admin_draft.close_start else {
        return back_to_menu(next, replies::admin_menu());
    };
    let window = ClosingWindow {
        start,
        end,
        manual: ctx.closing.manual,
    };
    effect_to_menu(next, Effect::SetClosingWindow(window))
}

// ── Settling ────────────────────────────────────────────────────────

/// Reply for a successful admin effect.
pub fn settle(
    mut next: SessionState,
    effect: &Effect,
    output: EffectOutput,
) -> (SessionState, Vec<String>) {
    let reply = match (effect, output) {
        (Effect::Recap { .. }, EffectOutput::Recap(rows)) => replies::recap(&rows),
        (Effect::ListContacts(_), EffectOutput::Contacts(contacts)) if contacts.is_empty() => {
            next.admin_flow = AdminFlow::Menu;
            replies::no_contacts()
        }
        (Effect::ListContacts(purpose), EffectOutput::Contacts(contacts)) => {
            let action = match purpose {
                ContactPurpose::Rename => "diubah",
                ContactPurpose::Delete => "dihapus",
            };
            let reply = replies::contact_list(&contacts, action);
            next.admin_draft.contacts = contacts;
            reply
        }
        (Effect::UpsertContact(contact), EffectOutput::ContactSaved) => {
            replies::contact_saved(contact)
        }
        (Effect::DeleteContact(contact), EffectOutput::ContactDeleted(removed)) => {
            replies::contact_deleted(contact, removed)
        }
        (Effect::QueueBroadcast(request), EffectOutput::BroadcastQueued) => {
            let local = to_wib(request.send_at);
            replies::broadcast_queued(&local.format("%d-%m-%Y %H.%M WIB").to_string())
        }
        (Effect::Export { .. }, EffectOutput::Exported(receipt)) => {
            replies::export_queued(&receipt)
        }
        (Effect::SetClosingWindow(window), EffectOutput::SettingSaved) => {
            replies::closing_saved(window)
        }
        (Effect::ListBlocked(list), EffectOutput::Blocked(entries)) => format!(
            "{}\n\n{}",
            replies::blocked_list(*list, &entries),
            replies::block_menu(*list)
        ),
        (Effect::Block(entry), EffectOutput::BlockSaved) => format!(
            "{}\n\n{}",
            replies::block_saved(entry),
            replies::block_menu(entry.list)
        ),
        (Effect::Unblock { list, value }, EffectOutput::Unblocked(removed)) => format!(
            "{}\n\n{}",
            replies::unblocked(*list, value, removed),
            replies::block_menu(*list)
        ),
        (Effect::ListSenders { day }, EffectOutput::Senders(senders)) if senders.is_empty() => {
            next.admin_flow = AdminFlow::Menu;
            replies::no_senders(*day)
        }
        (Effect::ListSenders { day }, EffectOutput::Senders(senders)) => {
            let reply = replies::sender_list(*day, &senders);
            next.admin_draft.senders = senders;
            reply
        }
        (Effect::FetchSenderRecords { day, .. }, EffectOutput::Records(records))
            if records.is_empty() =>
        {
            next.admin_flow = AdminFlow::Menu;
            next.reset_admin_draft();
            replies::no_records(*day)
        }
        (Effect::FetchSenderRecords { sender, day }, EffectOutput::Records(records)) => {
            let reply = replies::sender_records_prompt(sender, *day, &records);
            next.admin_draft.sender_records = records;
            reply
        }
        (Effect::DeleteSenderRecords { .. }, EffectOutput::Deleted(names)) => {
            replies::deleted(&names)
        }
        _ => replies::generic_failure(),
    };
    (next, vec![reply])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::machine::{Outcome, dispatch};
    use crate::intake::{ParsedFields, UniquenessPolicy};
    use crate::store::{SenderTally, StoredRecord};
    use chrono::{NaiveDate, TimeZone};

    fn now() -> DateTime<Utc> {
        // 10:00 WIB
        Utc.with_ymd_and_hms(2026, 3, 2, 3, 0, 0).unwrap()
    }

    fn ctx(policy: &UniquenessPolicy) -> Context<'_> {
        Context {
            now: now(),
            day_key: crate::schedule::day_key(now()),
            closing: ClosingWindow::default(),
            card_prefix: "504948",
            undo_minutes: 30,
            policy,
        }
    }

    fn admin_msg(text: &str) -> RawMessage {
        RawMessage::new("boss", text).at(now()).admin()
    }

    fn in_flow(flow: AdminFlow) -> SessionState {
        SessionState {
            admin_flow: flow,
            ..Default::default()
        }
    }

    #[test]
    fn admin_keyword_opens_menu() {
        let policy = UniquenessPolicy::default();
        let step = dispatch(&SessionState::default(), &admin_msg("admin"), &ctx(&policy));
        assert_eq!(step.next.admin_flow, AdminFlow::Menu);
    }

    #[test]
    fn cancel_returns_to_menu_and_zero_at_menu_exits() {
        let policy = UniquenessPolicy::default();
        let ctx = ctx(&policy);
        let mut state = in_flow(AdminFlow::BroadcastCompose);
        state.admin_draft.broadcast_target = Some(BroadcastTarget::AllContacts);

        let back = dispatch(&state, &admin_msg("0"), &ctx).next;
        assert_eq!(back.admin_flow, AdminFlow::Menu);
        assert!(back.admin_draft.broadcast_target.is_none());

        let out = dispatch(&back, &admin_msg("0"), &ctx).next;
        assert_eq!(out.admin_flow, AdminFlow::None);
    }

    #[test]
    fn admin_flow_wins_over_user_flow() {
        let policy = UniquenessPolicy::default();
        let mut state = in_flow(AdminFlow::Menu);
        state.flow = crate::conversation::state::UserFlow::CheckMenu;
        let step = dispatch(&state, &admin_msg("1"), &ctx(&policy));
        assert!(matches!(step.outcome, Outcome::Effect(Effect::Recap { .. })));
    }

    #[test]
    fn range_recap_is_ordered() {
        let policy = UniquenessPolicy::default();
        let step = dispatch(
            &in_flow(AdminFlow::AskRange),
            &admin_msg("07-08-2026 s/d 01-08-2026"),
            &ctx(&policy),
        );
        assert_eq!(
            step.outcome,
            Outcome::Effect(Effect::Recap {
                from: NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
                to: NaiveDate::from_ymd_opt(2026, 8, 7).unwrap(),
            })
        );
        assert_eq!(step.next.admin_flow, AdminFlow::Menu);
    }

    #[test]
    fn contact_add_normalizes_phone() {
        let policy = UniquenessPolicy::default();
        let ctx = ctx(&policy);
        let s1 = dispatch(&in_flow(AdminFlow::ContactAddName), &admin_msg("Bu  Ani"), &ctx).next;
        assert_eq!(s1.admin_flow, AdminFlow::ContactAddPhone);

        let step = dispatch(&s1, &admin_msg("0812-3456-7890"), &ctx);
        assert_eq!(
            step.outcome,
            Outcome::Effect(Effect::UpsertContact(Contact {
                phone: "6281234567890".to_string(),
                name: "Bu Ani".to_string(),
            }))
        );
    }

    #[test]
    fn scheduled_broadcast_must_be_in_future() {
        let policy = UniquenessPolicy::default();
        let ctx = ctx(&policy);
        let mut state = in_flow(AdminFlow::BroadcastSchedule);
        state.admin_draft.broadcast_target = Some(BroadcastTarget::TodaysSenders);
        state.admin_draft.broadcast_text = Some("Besok libur".to_string());

        let past = dispatch(&state, &admin_msg("09.00"), &ctx);
        assert_eq!(past.next.admin_flow, AdminFlow::BroadcastSchedule);

        let step = dispatch(&state, &admin_msg("17.30"), &ctx);
        match step.outcome {
            Outcome::Effect(Effect::QueueBroadcast(req)) => {
                assert_eq!(req.target, BroadcastTarget::TodaysSenders);
                assert_eq!(req.send_at, Utc.with_ymd_and_hms(2026, 3, 2, 10, 30, 0).unwrap());
                assert_eq!(req.requested_by, "boss");
            }
            other => panic!("expected broadcast, got {other:?}"),
        }
    }

    #[test]
    fn closing_window_keeps_manual_closure() {
        let policy = UniquenessPolicy::default();
        let mut ctx = ctx(&policy);
        let manual = crate::schedule::ManualClosure {
            start: now(),
            end: now() + chrono::TimeDelta::days(1),
        };
        ctx.closing.manual = Some(manual);

        let s1 = dispatch(&in_flow(AdminFlow::CloseTimeStart), &admin_msg("22.00"), &ctx).next;
        let step = dispatch(&s1, &admin_msg("05.00"), &ctx);
        match step.outcome {
            Outcome::Effect(Effect::SetClosingWindow(window)) => {
                assert_eq!(window.start, ClockTime::new(22, 0).unwrap());
                assert_eq!(window.end, ClockTime::new(5, 0).unwrap());
                assert_eq!(window.manual, Some(manual));
            }
            other => panic!("expected window, got {other:?}"),
        }
    }

    #[test]
    fn empty_contact_list_returns_to_menu() {
        let state = in_flow(AdminFlow::ContactDeletePick);
        let (next, replies) = settle(
            state,
            &Effect::ListContacts(ContactPurpose::Delete),
            EffectOutput::Contacts(vec![]),
        );
        assert_eq!(next.admin_flow, AdminFlow::Menu);
        assert_eq!(replies[0], replies::no_contacts());
    }

    #[test]
    fn phone_normalization() {
        assert_eq!(normalize_phone("+62 812 3456 789").as_deref(), Some("628123456789"));
        assert_eq!(normalize_phone("812345678").as_deref(), Some("62812345678"));
        assert_eq!(normalize_phone("123"), None);
    }

    fn in_block_menu(list: BlockList) -> SessionState {
        let mut state = in_flow(AdminFlow::BlockMenu);
        state.admin_draft.block_list = Some(list);
        state
    }

    #[test]
    fn menu_opens_each_blocklist() {
        let policy = UniquenessPolicy::default();
        let ctx = ctx(&policy);
        for (choice, list) in [
            ("10", BlockList::Id),
            ("11", BlockList::Family),
            ("12", BlockList::Sender),
        ] {
            let next = dispatch(&in_flow(AdminFlow::Menu), &admin_msg(choice), &ctx).next;
            assert_eq!(next.admin_flow, AdminFlow::BlockMenu);
            assert_eq!(next.admin_draft.block_list, Some(list));
        }
    }

    #[test]
    fn block_family_with_reason() {
        let policy = UniquenessPolicy::default();
        let ctx = ctx(&policy);
        let s1 = dispatch(&in_block_menu(BlockList::Family), &admin_msg("1"), &ctx).next;
        assert_eq!(s1.admin_flow, AdminFlow::BlockAddValue);

        let short = dispatch(&s1, &admin_msg("3173"), &ctx);
        assert_eq!(short.next.admin_flow, AdminFlow::BlockAddValue);

        let s2 = dispatch(&s1, &admin_msg("KK 3173 0101 0101 0009"), &ctx).next;
        assert_eq!(s2.admin_flow, AdminFlow::BlockAddReason);

        let step = dispatch(&s2, &admin_msg("tunggakan"), &ctx);
        assert_eq!(
            step.outcome,
            Outcome::Effect(Effect::Block(BlockedEntry {
                list: BlockList::Family,
                value: "3173010101010009".to_string(),
                reason: Some("tunggakan".to_string()),
                created_at: now(),
            }))
        );
        assert_eq!(step.next.admin_flow, AdminFlow::BlockMenu);
        assert_eq!(step.next.admin_draft.block_list, Some(BlockList::Family));
        assert!(step.next.admin_draft.block_value.is_none());
    }

    #[test]
    fn block_phone_without_reason_and_unblock() {
        let policy = UniquenessPolicy::default();
        let ctx = ctx(&policy);
        let s1 = dispatch(&in_block_menu(BlockList::Sender), &admin_msg("1"), &ctx).next;
        let s2 = dispatch(&s1, &admin_msg("0812 3456 7890"), &ctx).next;
        let step = dispatch(&s2, &admin_msg("-"), &ctx);
        match step.outcome {
            Outcome::Effect(Effect::Block(entry)) => {
                assert_eq!(entry.value, "6281234567890");
                assert_eq!(entry.reason, None);
            }
            other => panic!("expected block, got {other:?}"),
        }

        let s3 = dispatch(&in_block_menu(BlockList::Sender), &admin_msg("3"), &ctx).next;
        assert_eq!(s3.admin_flow, AdminFlow::BlockRemoveValue);
        let step = dispatch(&s3, &admin_msg("081234567890"), &ctx);
        assert_eq!(
            step.outcome,
            Outcome::Effect(Effect::Unblock {
                list: BlockList::Sender,
                value: "6281234567890".to_string(),
            })
        );
        assert_eq!(step.next.admin_flow, AdminFlow::BlockMenu);
    }

    #[test]
    fn delete_user_data_walks_sender_then_records() {
        let policy = UniquenessPolicy::default();
        let ctx = ctx(&policy);
        let step = dispatch(&in_flow(AdminFlow::Menu), &admin_msg("13"), &ctx);
        assert_eq!(step.next.admin_flow, AdminFlow::DeleteUserPick);
        assert_eq!(step.outcome, Outcome::Effect(Effect::ListSenders { day: ctx.day_key }));

        let tallies = vec![SenderTally {
            sender: "alice".to_string(),
            records: 2,
        }];
        let (s1, _) = settle(
            step.next,
            &Effect::ListSenders { day: ctx.day_key },
            EffectOutput::Senders(tallies),
        );

        let step = dispatch(&s1, &admin_msg("1"), &ctx);
        assert_eq!(step.next.admin_flow, AdminFlow::DeleteUserRecords);
        let fetch = Effect::FetchSenderRecords {
            sender: "alice".to_string(),
            day: ctx.day_key,
        };
        assert_eq!(step.outcome, Outcome::Effect(fetch.clone()));

        let records: Vec<StoredRecord> = ["BUDI", "SITI"]
            .iter()
            .map(|name| StoredRecord {
                id: Uuid::new_v4(),
                message_id: Uuid::new_v4(),
                sender: "alice".to_string(),
                day_key: ctx.day_key,
                received_at: now(),
                fields: ParsedFields {
                    name: name.to_string(),
                    ..Default::default()
                },
                card_type: "KJP".to_string(),
            })
            .collect();
        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        let (s2, replies) = settle(step.next, &fetch, EffectOutput::Records(records));
        assert!(replies[0].contains("DATA MILIK alice"), "{}", replies[0]);

        let step = dispatch(&s2, &admin_msg("semua"), &ctx);
        assert_eq!(
            step.outcome,
            Outcome::Effect(Effect::DeleteSenderRecords {
                sender: "alice".to_string(),
                ids,
            })
        );
        assert_eq!(step.next.admin_flow, AdminFlow::Menu);
        assert!(step.next.admin_draft.sender_records.is_empty());
    }

    #[test]
    fn sender_keys_include_normalized_phone() {
        assert_eq!(
            sender_block_keys("081234567890"),
            vec!["081234567890".to_string(), "6281234567890".to_string()]
        );
        assert_eq!(sender_block_keys("6281234567890"), vec!["6281234567890".to_string()]);
        assert_eq!(sender_block_keys("alice"), vec!["alice".to_string()]);
    }
}
