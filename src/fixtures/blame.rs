//! Unique, per-run object names

use rand::distr::Alphanumeric;
use rand::Rng;

/// Longest name a DNS-1123 label allows
const MAX_NAME: usize = 63;
const SUFFIX_LEN: usize = 5;

fn random_token(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect()
}

/// Lowercase, `[a-z0-9-]` only, no leading or trailing dash
fn dns_label(value: &str) -> String {
    let mapped: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    mapped.trim_matches('-').to_string()
}

/// Names every object of a run after the run
#[derive(Clone, Debug)]
pub struct Blame {
    prefix: String,
    label: String,
}

impl Blame {
    /// `prefix` comes from configuration; a random one is drawn when unset
    pub fn new(prefix: Option<&str>) -> Self {
        let prefix = prefix
            .map(dns_label)
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| random_token(3));
        let label = format!("testrun-{prefix}{}", random_token(SUFFIX_LEN));
        Self { prefix, label }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Value of the `app`/`testRun` labels put on everything the run creates
    pub fn label(&self) -> &str {
        &self.label
    }

    /// `<name>-<prefix><random>`, a valid object name of at most 63 characters
    pub fn blame(&self, name: &str) -> String {
        let tail = format!("{}{}", self.prefix, random_token(SUFFIX_LEN));
        let mut head = dns_label(name);
        let room = MAX_NAME.saturating_sub(tail.len() + 1);
        head.truncate(room);
        let head = head.trim_end_matches('-');

        if head.is_empty() {
            tail
        } else {
            format!("{head}-{tail}")
        }
    }
}
