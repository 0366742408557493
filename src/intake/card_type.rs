//! Card-type label resolved from the card's 8-digit prefix.

/// Known program prefixes. Anything else is a plain KJP card.
const PREFIX_TYPES: &[(&str, &str)] = &[
    ("50494885", "KJP"),
    ("50494886", "KJP"),
    ("50494812", "KJP"),
    ("50494837", "DASAWISMA"),
    ("50494836", "PEKERJA"),
    ("50494835", "LANSIA"),
    ("50494827", "KAJ"),
    ("50494834", "DISABILITAS"),
    ("50494840", "RUSUN"),
];

pub const DEFAULT_CARD_TYPE: &str = "KJP";

pub fn card_type_label(card: &str) -> &'static str {
    card.get(..8)
        .and_then(|prefix| PREFIX_TYPES.iter().find(|(p, _)| *p == prefix))
        .map(|(_, label)| *label)
        .unwrap_or(DEFAULT_CARD_TYPE)
}
