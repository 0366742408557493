//! Per-sender session state: the user flow, the admin flow and the data
//! each flow carries between messages.

use serde::{Deserialize, Serialize};

use crate::intake::{Field, Site};
use crate::schedule::ClockTime;
use crate::store::{BlockList, BroadcastTarget, Contact, SenderTally, StoredRecord};

/// Where the sender is in the user conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserFlow {
    #[default]
    None,
    AwaitingSite,
    AwaitingSubSite,
    AwaitingManualSite,
    CheckMenu,
    CheckSpecificDate,
    DeleteData,
    EditPickRecord,
    EditPickField,
    EditPickLocation,
    EditInputValue,
    EditConfirm,
}

impl UserFlow {
    /// Check if a transition from `self` to `target` is valid. Every active
    /// flow may fall back to `None` (cancel or completion).
    pub fn can_transition_to(&self, target: UserFlow) -> bool {
        use UserFlow::*;
        matches!(
            (self, target),
            (None, AwaitingSite)
                | (None, CheckMenu)
                | (None, DeleteData)
                | (None, EditPickRecord)
                | (AwaitingSite, AwaitingSubSite)
                | (AwaitingSubSite, AwaitingManualSite)
                | (CheckMenu, CheckSpecificDate)
                | (EditPickRecord, EditPickField)
                | (EditPickField, EditInputValue)
                | (EditPickField, EditPickLocation)
                | (EditPickLocation, EditInputValue)
                | (EditPickLocation, EditConfirm)
                | (EditInputValue, EditConfirm)
        ) || (*self != None && target == None)
    }

    /// States where the cancel token means something else and must not
    /// reset the flow.
    pub fn is_protected(&self) -> bool {
        matches!(self, Self::EditConfirm)
    }

    /// States allowed to hold buffered registration text.
    pub fn holds_pending(&self) -> bool {
        matches!(
            self,
            Self::AwaitingSite | Self::AwaitingSubSite | Self::AwaitingManualSite
        )
    }
}

impl std::fmt::Display for UserFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::AwaitingSite => "awaiting_site",
            Self::AwaitingSubSite => "awaiting_sub_site",
            Self::AwaitingManualSite => "awaiting_manual_site",
            Self::CheckMenu => "check_menu",
            Self::CheckSpecificDate => "check_specific_date",
            Self::DeleteData => "delete_data",
            Self::EditPickRecord => "edit_pick_record",
            Self::EditPickField => "edit_pick_field",
            Self::EditPickLocation => "edit_pick_location",
            Self::EditInputValue => "edit_input_value",
            Self::EditConfirm => "edit_confirm",
        };
        write!(f, "{s}")
    }
}

/// Where an admin is in the admin menu.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminFlow {
    #[default]
    None,
    Menu,
    AskDate,
    AskRange,
    ContactAddName,
    ContactAddPhone,
    ContactEditPick,
    ContactEditName,
    ContactDeletePick,
    BroadcastSelect,
    BroadcastCompose,
    BroadcastPreview,
    BroadcastSchedule,
    ExportSelectDate,
    CloseTimeStart,
    CloseTimeEnd,
    /// Add, list or remove entries of the list in `AdminDraft::block_list`.
    BlockMenu,
    BlockAddValue,
    BlockAddReason,
    BlockRemoveValue,
    DeleteUserPick,
    DeleteUserRecords,
}

impl AdminFlow {
    /// Every sub-state returns to `Menu`; only `Menu` leaves the admin track.
    /// Blocklist steps also return to their own `BlockMenu`.
    pub fn can_transition_to(&self, target: AdminFlow) -> bool {
        use AdminFlow::*;
        let entered_from_menu = *self == Menu
            && !matches!(
                target,
                Menu | ContactAddPhone
                    | ContactEditName
                    | BroadcastCompose
                    | BroadcastPreview
                    | BroadcastSchedule
                    | CloseTimeEnd
                    | BlockAddValue
                    | BlockAddReason
                    | BlockRemoveValue
                    | DeleteUserRecords
            );
        entered_from_menu
            || matches!(
                (self, target),
                (None, Menu)
                    | (ContactAddName, ContactAddPhone)
                    | (ContactEditPick, ContactEditName)
                    | (BroadcastSelect, BroadcastCompose)
                    | (BroadcastCompose, BroadcastPreview)
                    | (BroadcastPreview, BroadcastSchedule)
                    | (CloseTimeStart, CloseTimeEnd)
                    | (BlockMenu, BlockAddValue)
                    | (BlockMenu, BlockRemoveValue)
                    | (BlockAddValue, BlockAddReason)
                    | (BlockAddReason, BlockMenu)
                    | (BlockRemoveValue, BlockMenu)
                    | (DeleteUserPick, DeleteUserRecords)
            )
            || (!matches!(self, None | Menu) && target == Menu)
    }

    pub fn is_protected(&self) -> bool {
        matches!(self, Self::Menu)
    }
}

impl std::fmt::Display for AdminFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Menu => "menu",
            Self::AskDate => "ask_date",
            Self::AskRange => "ask_range",
            Self::ContactAddName => "contact_add_name",
            Self::ContactAddPhone => "contact_add_phone",
            Self::ContactEditPick => "contact_edit_pick",
            Self::ContactEditName => "contact_edit_name",
            Self::ContactDeletePick => "contact_delete_pick",
            Self::BroadcastSelect => "broadcast_select",
            Self::BroadcastCompose => "broadcast_compose",
            Self::BroadcastPreview => "broadcast_preview",
            Self::BroadcastSchedule => "broadcast_schedule",
            Self::ExportSelectDate => "export_select_date",
            Self::CloseTimeStart => "close_time_start",
            Self::CloseTimeEnd => "close_time_end",
            Self::BlockMenu => "block_menu",
            Self::BlockAddValue => "block_add_value",
            Self::BlockAddReason => "block_add_reason",
            Self::BlockRemoveValue => "block_remove_value",
            Self::DeleteUserPick => "delete_user_pick",
            Self::DeleteUserRecords => "delete_user_records",
        };
        write!(f, "{s}")
    }
}

/// Draft of an in-progress edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditSession {
    pub record: StoredRecord,
    pub field: Option<Field>,
    pub new_value: Option<String>,
}

/// Scratch data for the admin sub-flows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminDraft {
    /// Contacts as last listed, for picking by position.
    pub contacts: Vec<Contact>,
    pub contact: Option<Contact>,
    pub contact_name: Option<String>,
    pub broadcast_target: Option<BroadcastTarget>,
    pub broadcast_text: Option<String>,
    pub close_start: Option<ClockTime>,
    /// Survives the steps of one blocklist menu visit.
    pub block_list: Option<BlockList>,
    pub block_value: Option<String>,
    /// Today's senders as last listed, for picking by position.
    pub senders: Vec<SenderTally>,
    /// Records of the picked sender, for picking by position.
    pub sender_records: Vec<StoredRecord>,
}

/// One sender's conversation state. Replaced wholesale after every message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub flow: UserFlow,
    pub admin_flow: AdminFlow,
    /// Sticky until the sender re-enters registration.
    pub chosen_site: Option<Site>,
    pub chosen_sub_site: Option<String>,
    /// Registration text received before a site was chosen.
    pub pending_raw_text: Option<String>,
    /// Records as last shown to the sender, for picking by position.
    pub listing: Vec<StoredRecord>,
    pub edit: Option<EditSession>,
    pub admin_draft: AdminDraft,
}

impl SessionState {
    /// Pending text only lives in the site-selection states.
    pub fn is_consistent(&self) -> bool {
        self.pending_raw_text.is_none() || self.flow.holds_pending()
    }

    /// Site and sub-site, when registration can run without asking.
    pub fn resolved_site(&self) -> Option<(Site, &str)> {
        Some((self.chosen_site?, self.chosen_sub_site.as_deref()?))
    }

    /// Back to `None`, dropping every transient buffer but keeping the
    /// chosen site.
    pub fn reset_user_flow(&mut self) {
        self.flow = UserFlow::None;
        self.pending_raw_text = None;
        self.listing.clear();
        self.edit = None;
    }

    pub fn reset_admin_draft(&mut self) {
        self.admin_draft = AdminDraft::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_user_transitions() {
        use UserFlow::*;
        let transitions = [
            (None, AwaitingSite),
            (AwaitingSite, AwaitingSubSite),
            (AwaitingSubSite, AwaitingManualSite),
            (AwaitingManualSite, None),
            (None, CheckMenu),
            (CheckMenu, CheckSpecificDate),
            (None, EditPickRecord),
            (EditPickRecord, EditPickField),
            (EditPickField, EditInputValue),
            (EditPickField, EditPickLocation),
            (EditPickLocation, EditConfirm),
            (EditInputValue, EditConfirm),
            (EditConfirm, None),
            (DeleteData, None),
        ];
        for (from, to) in transitions {
            assert!(from.can_transition_to(to), "{from} should transition to {to}");
        }
    }

    #[test]
    fn invalid_user_transitions() {
        use UserFlow::*;
        // Skip steps
        assert!(!EditPickRecord.can_transition_to(EditConfirm));
        assert!(!None.can_transition_to(AwaitingSubSite));
        assert!(!EditPickRecord.can_transition_to(EditPickLocation));
        // Go backward
        assert!(!EditConfirm.can_transition_to(EditInputValue));
        // Self-transition
        assert!(!None.can_transition_to(None));
    }

    #[test]
    fn admin_sub_states_return_to_menu() {
        use AdminFlow::*;
        for flow in [AskDate, ContactEditName, BroadcastSchedule, CloseTimeEnd] {
            assert!(flow.can_transition_to(Menu), "{flow} should transition to menu");
            assert!(!flow.can_transition_to(None), "{flow} should NOT leave admin");
        }
        assert!(Menu.can_transition_to(None));
        assert!(Menu.can_transition_to(BroadcastSelect));
        assert!(!Menu.can_transition_to(BroadcastPreview));
        assert!(!None.can_transition_to(AskDate));
    }

    #[test]
    fn blocklist_steps_return_to_block_menu() {
        use AdminFlow::*;
        assert!(Menu.can_transition_to(BlockMenu));
        assert!(Menu.can_transition_to(DeleteUserPick));
        assert!(!Menu.can_transition_to(BlockAddReason));
        assert!(!Menu.can_transition_to(DeleteUserRecords));
        assert!(BlockAddValue.can_transition_to(BlockAddReason));
        assert!(BlockAddReason.can_transition_to(BlockMenu));
        assert!(BlockRemoveValue.can_transition_to(Menu));
        assert!(DeleteUserPick.can_transition_to(DeleteUserRecords));
        assert!(!DeleteUserRecords.can_transition_to(DeleteUserPick));
    }

    #[test]
    fn display_matches_serde() {
        use UserFlow::*;
        for flow in [None, AwaitingManualSite, EditConfirm] {
            let json = serde_json::to_string(&flow).unwrap();
            assert_eq!(json, format!("\"{flow}\""));
        }
        let json = serde_json::to_string(&AdminFlow::CloseTimeStart).unwrap();
        assert_eq!(json, "\"close_time_start\"");
    }

    #[test]
    fn pending_text_requires_site_selection() {
        let mut state = SessionState {
            pending_raw_text: Some("data".to_string()),
            flow: UserFlow::AwaitingSite,
            ..Default::default()
        };
        assert!(state.is_consistent());
        state.flow = UserFlow::CheckMenu;
        assert!(!state.is_consistent());
        state.reset_user_flow();
        assert!(state.is_consistent());
        assert!(state.pending_raw_text.is_none());
    }
}
