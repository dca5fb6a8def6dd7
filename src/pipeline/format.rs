//! Channel formatting for the RESPOND stage

use crate::delivery::Channel;
use crate::language::Language;
use crate::messages::BilingualText;

pub const SEPARATOR: &str = "\n\n---\n\n";
const TELEGRAM_MAX_CHARS: usize = 4096;
const SMS_MAX_CHARS: usize = 160;

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Detected language first. SMS carries only that language.
pub fn format_message(message: &BilingualText, language: Language, channel: Channel) -> String {
    let (first, second) = message.ordered(language);
    match channel {
        Channel::Sms => truncate(first, SMS_MAX_CHARS),
        Channel::Telegram => truncate(&format!("{}{}{}", first, SEPARATOR, second), TELEGRAM_MAX_CHARS),
        Channel::Ui | Channel::Console => {
            if first == second {
                first.to_string()
            } else {
                format!("{}{}{}", first, SEPARATOR, second)
            }
        }
    }
}
