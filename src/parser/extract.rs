use std::cmp::Reverse;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::blocks::{Block, BlockKind};
use super::normalize::phone_digits;
use crate::config::ExtractConfig;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}\b").unwrap());
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+ ?|\b00 ?)?\(?\d{1,4}\)?(?:[ .\-]?\(?\d{1,5}\)?){1,6}").unwrap()
});
static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?i:full name|name|contact|person)\s*[:=\-]\s*([A-Z][A-Za-z'\-]+(?:[ \t]+[A-Z][A-Za-z'\-]+){1,3})")
        .unwrap()
});
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:\d{1,2}[./\-]\d{1,2}[./\-]\d{2,4}|\d{4}[./\-]\d{1,2}[./\-]\d{1,2}|(?:19|20)\d{2} ?- ?(?:19|20)\d{2})$",
    )
    .unwrap()
});

/// Words a label-anchored name match can run into on a one-line contact strip.
const LABEL_WORDS: &[&str] = &["Email", "E-mail", "Mail", "Phone", "Tel", "Mobile", "Fax", "Contact"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    Name,
    Email,
    Phone,
}

/// Where a candidate was found: container group, block index, byte offset in the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Locator {
    pub group: usize,
    pub block: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCandidate {
    pub kind: FieldKind,
    pub text: String,
    pub locator: Locator,
}

/// Lazily scan blocks for candidates, in order of first appearance.
pub fn candidates<'a>(
    blocks: &'a [Block],
    cfg: &'a ExtractConfig,
) -> impl Iterator<Item = RawCandidate> + 'a {
    blocks
        .iter()
        .enumerate()
        .flat_map(move |(idx, block)| scan_block(idx, block, cfg))
}

fn scan_block(idx: usize, block: &Block, cfg: &ExtractConfig) -> Vec<RawCandidate> {
    let at = |offset: usize, kind: FieldKind, text: &str| RawCandidate {
        kind,
        text: text.to_string(),
        locator: Locator {
            group: block.group,
            block: idx,
            offset,
        },
    };

    match &block.kind {
        BlockKind::Text(text) => scan_text(text, cfg)
            .into_iter()
            .map(|(offset, kind, value)| at(offset, kind, value))
            .collect(),
        BlockKind::Mailto { address, label } => {
            let mut found = vec![at(0, FieldKind::Email, address)];
            if !label.eq_ignore_ascii_case(address) && looks_like_name(label) {
                found.push(at(1, FieldKind::Name, label));
            }
            found
        }
        BlockKind::Tel { number } => vec![at(0, FieldKind::Phone, number)],
        BlockKind::Labeled { field, text } => match field {
            FieldKind::Name => vec![at(0, FieldKind::Name, text)],
            FieldKind::Email => EMAIL_RE
                .find(text)
                .map(|m| vec![at(m.start(), FieldKind::Email, m.as_str())])
                .unwrap_or_default(),
            FieldKind::Phone => find_phones(text, cfg)
                .first()
                .map(|&(start, phone)| vec![at(start, FieldKind::Phone, phone)])
                .unwrap_or_default(),
        },
    }
}

/// All email, phone and anchored-name matches in one line, sorted by position.
fn scan_text<'t>(text: &'t str, cfg: &ExtractConfig) -> Vec<(usize, FieldKind, &'t str)> {
    let emails: Vec<Range<usize>> = EMAIL_RE.find_iter(text).map(|m| m.range()).collect();
    let mut found: Vec<(usize, FieldKind, &str)> = emails
        .iter()
        .map(|r| (r.start, FieldKind::Email, &text[r.clone()]))
        .collect();

    for (start, phone) in find_phones(text, cfg) {
        let range = start..start + phone.len();
        if !emails.iter().any(|e| overlaps(e, &range)) {
            found.push((start, FieldKind::Phone, phone));
        }
    }

    for caps in NAME_RE.captures_iter(text) {
        let Some(m) = caps.get(1) else { continue };
        if emails.iter().any(|e| overlaps(e, &m.range())) {
            continue;
        }
        let name = trim_label_words(m.as_str());
        if name.contains(' ') {
            found.push((m.start(), FieldKind::Name, name));
        }
    }

    found.sort_by_key(|(offset, ..)| *offset);
    found
}

/// Phone-shaped runs that stand alone and carry an acceptable number of digits,
/// as (byte offset, text). A run too long for one number is split into
/// consecutive numbers at its group boundaries.
fn find_phones<'t>(text: &'t str, cfg: &ExtractConfig) -> Vec<(usize, &'t str)> {
    PHONE_RE
        .find_iter(text)
        .filter(|m| is_isolated(text, m.start(), m.end()))
        .flat_map(|m| {
            split_run(m.as_str(), cfg)
                .into_iter()
                .map(move |(offset, phone)| (m.start() + offset, phone))
        })
        .collect()
}

fn is_phone(piece: &str, cfg: &ExtractConfig) -> bool {
    let (_, digits) = phone_digits(piece);
    (cfg.min_phone_digits..=cfg.max_phone_digits).contains(&digits.len()) && !DATE_RE.is_match(piece)
}

/// Partition an over-long run into the fewest valid numbers, preferring
/// splits where each number ends in a group of four or more digits.
fn split_run<'t>(run: &'t str, cfg: &ExtractConfig) -> Vec<(usize, &'t str)> {
    if is_phone(run, cfg) {
        return vec![(0, run)];
    }
    let (_, digits) = phone_digits(run);
    if digits.len() <= cfg.max_phone_digits {
        return Vec::new();
    }

    let groups = run_groups(run);
    let n = groups.len();
    // best[j]: (numbers, numbers ending in a long group, start group of the last number)
    let mut best: Vec<Option<(usize, usize, usize)>> = vec![None; n + 1];
    best[0] = Some((0, 0, 0));
    for j in 1..=n {
        let tail = &run[groups[j - 1].clone()];
        let long_tail = usize::from(tail.chars().filter(char::is_ascii_digit).count() >= 4);
        for i in 0..j {
            let Some((count, long, _)) = best[i] else { continue };
            if !is_phone(&run[groups[i].start..groups[j - 1].end], cfg) {
                continue;
            }
            let next = (count + 1, long + long_tail, i);
            let better = best[j].map_or(true, |(c, l, _)| (next.0, Reverse(next.1)) < (c, Reverse(l)));
            if better {
                best[j] = Some(next);
            }
        }
    }

    let mut pieces = Vec::new();
    let mut j = n;
    while j > 0 {
        let Some((_, _, i)) = best[j] else {
            return Vec::new();
        };
        let start = groups[i].start;
        pieces.push((start, &run[start..groups[j - 1].end]));
        j = i;
    }
    pieces.reverse();
    pieces
}

/// Byte ranges of the separator-delimited groups of a run. A digitless token
/// such as a detached `+` is glued to the group after it.
fn run_groups(run: &str) -> Vec<Range<usize>> {
    let mut groups = Vec::new();
    let mut pending = None;
    let mut start = None;
    for (i, c) in run.char_indices().chain(std::iter::once((run.len(), ' '))) {
        if matches!(c, ' ' | '.' | '-') {
            if let Some(s) = start.take() {
                if run[s..i].chars().any(|c| c.is_ascii_digit()) {
                    groups.push(pending.take().unwrap_or(s)..i);
                } else {
                    pending.get_or_insert(s);
                }
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    groups
}

fn is_isolated(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    let joins = |c: char| c.is_alphanumeric() || c == '@' || c == '_';
    !before.is_some_and(joins) && !after.is_some_and(joins)
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

fn trim_label_words(name: &str) -> &str {
    let mut name = name.trim();
    while let Some((head, last)) = name.rsplit_once(char::is_whitespace) {
        if LABEL_WORDS.iter().any(|w| w.eq_ignore_ascii_case(last)) {
            name = head.trim_end();
        } else {
            break;
        }
    }
    name
}

/// Display text that reads like a person's name: 2-4 capitalized words, letters only.
fn looks_like_name(label: &str) -> bool {
    let words: Vec<&str> = label.split_whitespace().collect();
    (2..=4).contains(&words.len())
        && words.iter().all(|w| {
            w.chars().next().is_some_and(char::is_uppercase)
                && w.chars().all(|c| c.is_alphabetic() || matches!(c, '\'' | '-' | '.'))
        })
}

// ── Tests ──
