//! Keyword parsing for menu commands and flow answers.

/// A stateless command recognised when no flow is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Re-enter registration: forget the chosen site and ask again.
    Register,
    Check,
    Delete,
    /// `HAPUS 1,2`: delete today's records at these positions directly.
    DeletePositions(Vec<usize>),
    Edit,
    Help,
    Menu,
    /// Remove the latest submission if it is still within the undo window.
    Undo,
    Admin,
}

/// Parses menu input into commands.
pub struct CommandParser;

impl CommandParser {
    /// Parse a message into a command. `None` means free text, which may be
    /// registration data.
    pub fn parse(content: &str) -> Option<Command> {
        let trimmed = content.trim();
        let upper = trimmed.to_uppercase();

        match upper.as_str() {
            "1" | "DAFTAR" => Some(Command::Register),
            "2" | "CEK" | "CEK DATA" => Some(Command::Check),
            "3" | "HAPUS" | "HAPUS DATA" => Some(Command::Delete),
            "4" | "EDIT" | "UBAH" | "EDIT DATA" => Some(Command::Edit),
            "5" | "BANTUAN" | "HELP" | "?" => Some(Command::Help),
            "MENU" | "HALO" | "HALLO" | "HAI" | "HI" | "P" | "PING" | "START"
            | "ASSALAMUALAIKUM" | "PAGI" | "SIANG" | "SORE" | "MALAM" => Some(Command::Menu),
            "BATAL" | "CANCEL" | "UNDO" => Some(Command::Undo),
            "ADMIN" => Some(Command::Admin),
            _ => parse_delete_positions(&upper),
        }
    }
}

/// `HAPUS 1,2` or `HAPUS 1 3`.
fn parse_delete_positions(upper: &str) -> Option<Command> {
    let rest = upper.strip_prefix("HAPUS ")?;
    let positions = parse_positions(rest)?;
    Some(Command::DeletePositions(positions))
}

/// Positions separated by commas or whitespace, deduplicated in input
/// order. `None` if any token is not a positive number.
pub fn parse_positions(input: &str) -> Option<Vec<usize>> {
    let mut positions = Vec::new();
    for token in input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        let n: usize = token.trim_end_matches('.').parse().ok()?;
        if n == 0 {
            return None;
        }
        if !positions.contains(&n) {
            positions.push(n);
        }
    }
    (!positions.is_empty()).then_some(positions)
}

/// A single 1-based menu choice.
pub fn parse_choice(input: &str) -> Option<usize> {
    match parse_positions(input)?.as_slice() {
        [n] => Some(*n),
        _ => None,
    }
}

/// Cancel tokens honoured by every non-protected flow state.
pub fn is_cancel(input: &str) -> bool {
    matches!(
        input.trim().to_uppercase().as_str(),
        "0" | "BATAL" | "CANCEL" | "KEMBALI"
    )
}

/// Answer to a yes/no confirmation.
pub fn parse_confirmation(input: &str) -> Option<bool> {
    match input.trim().to_uppercase().as_str() {
        "1" | "Y" | "YA" | "OK" | "OKE" | "SIAP" | "SIMPAN" => Some(true),
        "0" | "N" | "TIDAK" | "BATAL" | "CANCEL" => Some(false),
        _ => None,
    }
}

/// `SEMUA` selects every listed record.
pub fn is_select_all(input: &str) -> bool {
    matches!(input.trim().to_uppercase().as_str(), "SEMUA" | "ALL")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_menu_keywords() {
        let cases = [
            ("1", Command::Register),
            (" daftar ", Command::Register),
            ("cek", Command::Check),
            ("3", Command::Delete),
            ("Edit", Command::Edit),
            ("bantuan", Command::Help),
            ("halo", Command::Menu),
            ("batal", Command::Undo),
            ("UNDO", Command::Undo),
            ("admin", Command::Admin),
        ];
        for (input, expected) in cases {
            assert_eq!(CommandParser::parse(input), Some(expected), "input {input:?}");
        }
    }

    #[test]
    fn parse_stateless_delete() {
        assert_eq!(
            CommandParser::parse("hapus 1,2"),
            Some(Command::DeletePositions(vec![1, 2]))
        );
        assert_eq!(
            CommandParser::parse("HAPUS 3 1 3"),
            Some(Command::DeletePositions(vec![3, 1]))
        );
        assert_eq!(CommandParser::parse("hapus semuanya"), None);
    }

    #[test]
    fn free_text_is_not_a_command() {
        assert_eq!(CommandParser::parse("Budi Santoso\n5049488500001111"), None);
        assert_eq!(CommandParser::parse("6"), None);
    }

    #[test]
    fn positions_reject_zero_and_garbage() {
        assert_eq!(parse_positions("0"), None);
        assert_eq!(parse_positions("1,x"), None);
        assert_eq!(parse_positions(""), None);
        assert_eq!(parse_positions("2., 4"), Some(vec![2, 4]));
        assert_eq!(parse_choice("2"), Some(2));
        assert_eq!(parse_choice("1,2"), None);
    }

    #[test]
    fn cancel_and_confirmation_tokens() {
        for token in ["0", "batal", "CANCEL", "kembali"] {
            assert!(is_cancel(token), "{token:?} should cancel");
        }
        assert!(!is_cancel("1"));
        assert_eq!(parse_confirmation("ya"), Some(true));
        assert_eq!(parse_confirmation("0"), Some(false));
        assert_eq!(parse_confirmation("mungkin"), None);
    }
}
