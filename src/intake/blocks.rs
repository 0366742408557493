//! Block grouping and the structural gate in front of it.

use std::fmt;

use super::date::looks_like_date;
use super::types::SiteMode;

/// Smallest line count that can hold one record.
pub const MIN_RECORD_LINES: usize = 4;

/// Lines partitioned into fixed-size records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blocks {
    pub blocks: Vec<Vec<String>>,
    /// Trailing lines that do not fill a whole block.
    pub remainder: Vec<String>,
}

/// Consecutive, non-overlapping chunks of `block_size` lines.
pub fn group_into_blocks(lines: &[String], block_size: usize) -> Blocks {
    if block_size == 0 {
        return Blocks {
            blocks: Vec::new(),
            remainder: lines.to_vec(),
        };
    }
    let full = lines.len() / block_size * block_size;
    Blocks {
        blocks: lines[..full].chunks(block_size).map(<[String]>::to_vec).collect(),
        remainder: lines[full..].to_vec(),
    }
}

/// Why a whole message was refused before any record was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureError {
    /// The line count fits the other site's record shape only.
    ModeMismatch { expected: SiteMode, lines: usize },
    /// The line count fits neither shape.
    WrongLineCount { lines: usize, block_size: usize },
}

impl fmt::Display for StructureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructureError::ModeMismatch { expected, lines } => write!(
                f,
                "{lines} lines do not fit {}-line records",
                expected.block_size()
            ),
            StructureError::WrongLineCount { lines, block_size } => {
                write!(f, "{lines} lines is not a multiple of {block_size}")
            }
        }
    }
}

/// Whether free text has the shape of registration data at all.
pub fn looks_like_registration(lines: &[String]) -> bool {
    let n = lines.len();
    n >= MIN_RECORD_LINES && (n % 4 == 0 || n % 5 == 0)
}

/// Every 5-line chunk ends in something date-shaped.
fn dates_at_block_ends(lines: &[String]) -> bool {
    lines
        .chunks(5)
        .all(|block| block.len() == 5 && block.last().is_some_and(|l| looks_like_date(l)))
}

/// All-or-nothing check that block boundaries are unambiguous for `mode`.
/// Only the line count is judged here; a bad birth date is a per-record
/// validation error.
pub fn check_structure(lines: &[String], mode: SiteMode) -> Result<(), StructureError> {
    let n = lines.len();
    let size = mode.block_size();
    let other = mode.other().block_size();

    if n == 0 || n % size != 0 {
        if n > 0 && n % other == 0 {
            return Err(StructureError::ModeMismatch {
                expected: mode,
                lines: n,
            });
        }
        return Err(StructureError::WrongLineCount {
            lines: n,
            block_size: size,
        });
    }

    match mode {
        SiteMode::FiveLine => Ok(()),
        // Divisible by both: dated 5-line records sent to a 4-line site.
        SiteMode::FourLine if n % 5 == 0 && dates_at_block_ends(lines) => {
            Err(StructureError::ModeMismatch {
                expected: mode,
                lines: n,
            })
        }
        SiteMode::FourLine => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("line {i}")).collect()
    }

    fn five_line_record(name: &str) -> Vec<String> {
        vec![
            name.to_string(),
            "5049488500001111".to_string(),
            "3173000000000001".to_string(),
            "3173000000000002".to_string(),
            "15-08-1975".to_string(),
        ]
    }

    #[test]
    fn groups_with_remainder() {
        let grouped = group_into_blocks(&numbered(10), 4);
        assert_eq!(grouped.blocks.len(), 2);
        assert_eq!(grouped.blocks[1][0], "line 5");
        assert_eq!(grouped.remainder, vec!["line 9", "line 10"]);

        let exact = group_into_blocks(&numbered(10), 5);
        assert_eq!(exact.blocks.len(), 2);
        assert!(exact.remainder.is_empty());
    }

    #[test]
    fn registration_shape() {
        assert!(!looks_like_registration(&numbered(3)));
        assert!(looks_like_registration(&numbered(4)));
        assert!(looks_like_registration(&numbered(5)));
        assert!(!looks_like_registration(&numbered(7)));
        assert!(looks_like_registration(&numbered(8)));
    }

    #[test]
    fn eight_lines_in_five_line_mode_is_mismatch() {
        assert_eq!(
            check_structure(&numbered(8), SiteMode::FiveLine),
            Err(StructureError::ModeMismatch {
                expected: SiteMode::FiveLine,
                lines: 8
            })
        );
    }

    #[test]
    fn five_lines_in_four_line_mode_is_mismatch() {
        assert!(matches!(
            check_structure(&numbered(10), SiteMode::FourLine),
            Err(StructureError::ModeMismatch { .. })
        ));
    }

    #[test]
    fn wrong_count_fits_neither() {
        assert_eq!(
            check_structure(&numbered(7), SiteMode::FourLine),
            Err(StructureError::WrongLineCount {
                lines: 7,
                block_size: 4
            })
        );
    }

    #[test]
    fn undated_five_line_record_passes_the_gate() {
        let mut lines = five_line_record("Budi");
        assert_eq!(check_structure(&lines, SiteMode::FiveLine), Ok(()));

        let mut second = five_line_record("Siti");
        second[4] = "lupa".to_string();
        lines.extend(second);
        assert_eq!(check_structure(&lines, SiteMode::FiveLine), Ok(()));
    }

    #[test]
    fn twenty_dated_lines_rejected_for_four_line_site() {
        let lines: Vec<String> = (0..4).flat_map(|i| five_line_record(&format!("N{i}"))).collect();
        assert!(matches!(
            check_structure(&lines, SiteMode::FourLine),
            Err(StructureError::ModeMismatch { .. })
        ));
        assert_eq!(check_structure(&lines, SiteMode::FiveLine), Ok(()));
    }
}
