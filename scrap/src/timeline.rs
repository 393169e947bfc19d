//! Day grouping for the message list
//!
//! The list is most-recent-first; a date divider sits below the last (oldest)
//! message of each calendar day.

use crate::models::Message;
use chrono::{Datelike, NaiveDate, TimeZone};

/// Consecutive messages from one local calendar day
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayGroup<'a> {
    pub day: NaiveDate,
    pub messages: Vec<&'a Message>,
}

pub fn local_day<Tz: TimeZone>(message: &Message, tz: &Tz) -> NaiveDate {
    message.date.with_timezone(tz).date_naive()
}

/// Group a date-descending list by local day, preserving order
pub fn day_groups<'a, Tz: TimeZone>(messages: &'a [Message], tz: &Tz) -> Vec<DayGroup<'a>> {
    let mut groups: Vec<DayGroup<'a>> = Vec::new();
    for message in messages {
        let day = local_day(message, tz);
        match groups.last_mut() {
            Some(group) if group.day == day => group.messages.push(message),
            _ => groups.push(DayGroup {
                day,
                messages: vec![message],
            }),
        }
    }
    groups
}

/// Whether a divider follows the message at `index`: it is the last message
/// of its day, or the last message overall.
pub fn needs_divider<Tz: TimeZone>(messages: &[Message], index: usize, tz: &Tz) -> bool {
    let Some(message) = messages.get(index) else {
        return false;
    };
    match messages.get(index + 1) {
        Some(older) => local_day(message, tz) != local_day(older, tz),
        None => true,
    }
}

/// "October 16" this year, "October 16, 2024" otherwise
pub fn date_label(day: NaiveDate, today: NaiveDate) -> String {
    if day.year() == today.year() {
        day.format("%B %-d").to_string()
    } else {
        day.format("%B %-d, %Y").to_string()
    }
}
