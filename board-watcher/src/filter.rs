//! Keyword relevance filter for board items.
//!
//! An item is relevant when its title or description mentions the keyword
//! root "бот" (bot), either inside a messaging-platform compound such as
//! "телеграм бот" or on its own with a short compound prefix ("чат-бота")
//! and an optional inflectional suffix.

use lazy_static::lazy_static;
use regex::Regex;
use seen_store::OrderRecord;

lazy_static! {
    // Named platform directly followed by the keyword root
    static ref PLATFORM_BOT: Regex = Regex::new(
        r"(?iu)(?:телеграм|telegram|tg)[\s\-]*бот(?:а|ы|ов|ом|у|е|ами|ах)?"
    ).unwrap();

    // Keyword root with up to 4 word characters or hyphens glued in front,
    // anchored at word boundaries on both ends
    static ref KEYWORD: Regex = Regex::new(
        r"(?iu)\b[\p{L}\p{N}\-]{0,4}бот(?:а|ы|ов|ом|у|е|ами|ах)?\b"
    ).unwrap();
}

/// Which pattern accepted the text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Platform compound ("telegram бот")
    Platform,
    /// Keyword root, possibly prefixed or inflected
    Keyword,
}

/// Lowercase the text and turn em/en dashes into plain hyphens
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| match c {
            '\u{2014}' | '\u{2013}' => '-',
            other => other,
        })
        .collect()
}

/// Classify already-joined text
pub fn classify(text: &str) -> Option<MatchKind> {
    let text = normalize(text);

    if PLATFORM_BOT.is_match(&text) {
        return Some(MatchKind::Platform);
    }
    if KEYWORD.is_match(&text) {
        return Some(MatchKind::Keyword);
    }
    None
}

/// Relevance decision for raw text
pub fn text_matches(text: &str) -> bool {
    classify(text).is_some()
}

/// Relevance decision for a record, from its title and description only
pub fn order_matches(record: &OrderRecord) -> bool {
    text_matches(&record.searchable_text())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_compound() {
        assert_eq!(
            classify("нужен телеграм бот для поддержки"),
            Some(MatchKind::Platform)
        );
        assert_eq!(classify("Telegram-боты под ключ"), Some(MatchKind::Platform));
        assert_eq!(classify("TG бота доработать"), Some(MatchKind::Platform));
    }

    #[test]
    fn test_keyword_with_prefix() {
        assert!(text_matches("ищу чат-бота для сайта"));
        assert_eq!(classify("ищу чат-бота для сайта"), Some(MatchKind::Keyword));
        assert!(text_matches("ИИ-бот для записи клиентов"));
    }

    #[test]
    fn test_bare_keyword() {
        assert!(text_matches("нужен бот"));
        assert!(text_matches("Нужен БОТ"));
        assert!(text_matches("настроить ботов"));
        assert!(text_matches("работа с ботами"));
    }

    #[test]
    fn test_dash_variants_normalized() {
        assert_eq!(normalize("чат\u{2014}бот"), "чат-бот");
        assert_eq!(normalize("чат\u{2013}бот"), "чат-бот");
        assert!(text_matches("Telegram\u{2014}бот для магазина"));
        assert!(text_matches("чат\u{2013}бота"));
    }

    #[test]
    fn test_no_keyword() {
        assert!(!text_matches("нужен дизайнер лендинга"));
        assert!(!text_matches(""));
    }

    #[test]
    fn test_keyword_inside_longer_word_rejected() {
        // Too much in front of the root, or letters after it
        assert!(!text_matches("купить ботинки"));
        assert!(!text_matches("работодатель ищет сотрудника"));
        assert!(!text_matches("субботник во дворе"));
    }

    #[test]
    fn test_work_word_is_a_known_false_positive() {
        // "работа" is "ра" + "бот" + "а": a two-letter prefix plus an inflection.
        // No exclusion list is applied, so the word alone is accepted. Pinned
        // here so a change to this behavior is deliberate.
        assert!(text_matches("работа"));
        assert!(text_matches("нужна работа по дизайну"));
        assert_eq!(classify("работу"), Some(MatchKind::Keyword));
    }

    #[test]
    fn test_order_matches_uses_title_and_description() {
        let by_title = OrderRecord::new("1", "Чат-бот", "для сайта");
        assert!(order_matches(&by_title));

        let by_description = OrderRecord::new("2", "Разработка", "нужен телеграм бот");
        assert!(order_matches(&by_description));

        let mut by_raw_field = OrderRecord::new("3", "Логотип", "для кафе");
        by_raw_field
            .raw_fields
            .insert("category".to_string(), "боты".to_string());
        assert!(!order_matches(&by_raw_field));
    }
}
