use chrono::{DateTime, Utc};

/// Sent as soon as a connection is accepted. No trailing newline.
pub const USERNAME_PROMPT: &str = "Please enter a username ";

/// Queued into a session's outbox when its requested identity is taken.
pub const USERNAME_IN_USE: &str = "Username in use, please select new one";

/// Body of the notice broadcast when a session registers.
pub const JOINED: &str = "joined \n";

/// Unix `date` layout, e.g. `Mon Jan  2 15:04:05 UTC 2006`.
const TIMESTAMP_FORMAT: &str = "%a %b %e %H:%M:%S %Z %Y";

pub fn welcome(identity: &str) -> String {
    format!("Welcome, {identity}\n")
}

/// Body of the notice broadcast when a registered session goes away.
pub fn left_at(at: DateTime<Utc>) -> String {
    format!("left at {}\n", timestamp(at))
}

/// Formats one relayed line as `[sender][timestamp]: message`.
///
/// The message is passed through verbatim; any line ending the client sent
/// beyond the stripped `\r\n` stays in place.
pub fn relay_line(sender: &str, at: DateTime<Utc>, message: &str) -> String {
    format!("[{sender}][{}]: {message}", timestamp(at))
}

pub fn timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}
