use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::election::CandidateDraft;

static CANDIDATE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?P<name>[^:|]+?)\s*:\s*(?P<manifesto>[^|]+?)\s*(?:\|\s*(?P<photo>\S+)\s*)?$").unwrap()
});

static VOTER_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{5,20}").unwrap());

pub static ELECTION_ID: Lazy<Regex> = Lazy::new(|| Regex::new("^election-[0-9]+$").unwrap());

const TIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Accepts RFC 3339 or `YYYY-MM-DD HH:MM`, the latter read as UTC.
pub fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }

    TIME_FORMATS.iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

pub fn format_time(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M UTC").to_string()
}

/// Discord renders this in the reader's own timezone.
pub fn discord_time(t: &DateTime<Utc>) -> String {
    format!("<t:{}:f>", t.timestamp())
}

/// Parses `Name: manifesto` with an optional trailing `| photo-url`.
pub fn parse_candidate(raw: &str) -> Option<CandidateDraft> {
    let caps = CANDIDATE_LINE.captures(raw)?;

    Some(CandidateDraft {
        name: caps.name("name")?.as_str().to_owned(),
        manifesto: caps.name("manifesto")?.as_str().to_owned(),
        photo: caps.name("photo").map(|m| m.as_str().to_owned()),
    })
}

/// Extracts Discord user IDs from free text; mentions like `<@123...>` work too.
pub fn parse_voter_list(raw: &str) -> Vec<String> {
    VOTER_ID.find_iter(raw)
        .map(|m| m.as_str().to_owned())
        .collect()
}
