//! Free-text reminder label → minute offset.

/// Recognized label fragments, most specific first so that `"1 minute"`
/// never shadows `"15 minutes"`.
const OFFSET_TABLE: &[(&str, u32)] = &[
    ("15 minutes", 15),
    ("30 minutes", 30),
    ("5 minutes", 5),
    ("2 minutes", 2),
    ("1 minute", 1),
    ("1 hour", 60),
    ("1 day", 1440),
];

/// Minutes before the event start that `label` asks to be reminded.
///
/// Returns `None` for labels outside the table; callers drop those
/// reminders.
#[must_use]
pub fn parse_offset(label: &str) -> Option<u32> {
    OFFSET_TABLE
        .iter()
        .find(|(pattern, _)| label.contains(pattern))
        .map(|(_, minutes)| *minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_reference_labels() {
        assert_eq!(parse_offset("30 minutes before"), Some(30));
        assert_eq!(parse_offset("1 day before"), Some(1440));
        assert_eq!(parse_offset("1 hour before"), Some(60));
        assert_eq!(parse_offset("5 minutes before"), Some(5));
        assert_eq!(parse_offset("2 minutes before"), Some(2));
    }

    #[test]
    fn unknown_label_is_absent() {
        assert_eq!(parse_offset("no idea"), None);
        assert_eq!(parse_offset(""), None);
        assert_eq!(parse_offset("3 weeks before"), None);
    }

    #[test]
    fn one_minute_is_not_confused_with_fifteen() {
        assert_eq!(parse_offset("1 minute"), Some(1));
        assert_eq!(parse_offset("15 minutes"), Some(15));
        assert_eq!(parse_offset("1 minute before"), Some(1));
    }

    #[test]
    fn matches_inside_longer_text() {
        assert_eq!(parse_offset("Remind me 15 minutes before standup"), Some(15));
    }
}
