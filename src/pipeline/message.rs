use crate::models::Offer;
use crate::notifier::strip_line_breaks;
use chrono::NaiveDate;

/// Longest text the messaging API accepts in one message
const MESSAGE_LIMIT: usize = 4096;
const SECTION_SEPARATOR: &str = "\n\n";

/// Render the notification text for an offer.
///
/// Layout: bold title and days on market, the attribute block, the
/// description, then the link. The description is shortened when the
/// message would not fit in a single message.
pub fn compose_message(offer: &Offer, today: NaiveDate) -> String {
    let mut header = format!("<b>{}</b>", escape_html(&offer.title));
    if let Some(days) = offer.days_since_posted(today) {
        header.push_str(&format!("\nDays on market: {}", days));
    }

    let attributes = offer
        .price_attributes
        .iter()
        .map(|a| format!("<b>{}:</b> {}", escape_html(&a.label), escape_html(&a.value)))
        .collect::<Vec<_>>()
        .join("\n");

    let url = escape_html(&offer.url);
    let description = escape_html(strip_line_breaks(&offer.description).trim());

    let fixed: Vec<&str> = [header.as_str(), attributes.as_str(), url.as_str()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();
    let fixed_len: usize = fixed.iter().map(|s| s.chars().count()).sum::<usize>()
        + SECTION_SEPARATOR.len() * fixed.len();
    let description = truncate_chars(&description, MESSAGE_LIMIT.saturating_sub(fixed_len));

    [header, attributes, description, url]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(SECTION_SEPARATOR)
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Cut to at most `limit` characters, marking the cut with an ellipsis
fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    if limit == 0 {
        return String::new();
    }
    let mut cut: String = text.chars().take(limit - 1).collect();
    // Never leave half an entity behind
    if let Some(amp) = cut.rfind('&') {
        if !cut[amp..].contains(';') {
            cut.truncate(amp);
        }
    }
    cut.push('…');
    cut
}
