//! Rule-based extraction used when the remote model is unavailable.
//!
//! This is the availability guarantee of the pipeline: it needs no network,
//! never fails, and always returns a document with all four sections.
//!
//! ## Section anchors
//!
//! The keywords `ASSESSMENT`, `DIAGNOSIS`, `INTERVENTION` and `MONITORING`
//! (case-insensitive, whole words, optional `/Evaluation` suffix and `:`)
//! mark where sections begin. Notes often mention the words in running
//! prose too ("repeat assessment in 2 weeks"), so for each keyword the first
//! *heading-like* occurrence wins: one that starts a line or is followed by a
//! colon. Only when no heading-like occurrence exists does the first plain
//! occurrence count. A section runs until the next anchor, in whatever order
//! the note uses, or the end of the text.

use crate::prompts::visualization_prompt;
use crate::schema::{
    ActionItem, AdimeDocument, AssessmentData, DiagnosisData, InterventionData, MonitoringData,
};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Minimum length (in characters) of a paragraph-derived action item.
const MIN_PARAGRAPH_CHARS: usize = 20;

/// Words kept in a synthesised action-item title.
const TITLE_WORDS: usize = 4;

static RE_ANCHOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(assessment|diagnosis|intervention|monitoring)\b(?:\s*/\s*evaluation\b)?[ \t]*(:)?",
    )
    .unwrap()
});

static RE_BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+\.|•|\*").unwrap());

static RE_BLANK_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n").unwrap());

/// The four ADIME sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Assessment,
    Diagnosis,
    Intervention,
    Monitoring,
}

impl Section {
    fn from_keyword(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "assessment" => Some(Section::Assessment),
            "diagnosis" => Some(Section::Diagnosis),
            "intervention" => Some(Section::Intervention),
            "monitoring" => Some(Section::Monitoring),
            _ => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Raw section text located in a note. `None` when the keyword is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteSections {
    pub assessment: Option<String>,
    pub diagnosis: Option<String>,
    pub intervention: Option<String>,
    pub monitoring: Option<String>,
}

impl NoteSections {
    fn slot(&mut self, section: Section) -> &mut Option<String> {
        match section {
            Section::Assessment => &mut self.assessment,
            Section::Diagnosis => &mut self.diagnosis,
            Section::Intervention => &mut self.intervention,
            Section::Monitoring => &mut self.monitoring,
        }
    }

    /// Number of sections found.
    pub fn found(&self) -> usize {
        [
            &self.assessment,
            &self.diagnosis,
            &self.intervention,
            &self.monitoring,
        ]
        .iter()
        .filter(|s| s.is_some())
        .count()
    }
}

#[derive(Debug, Clone, Copy)]
struct Anchor {
    section: Section,
    start: usize,
    content_start: usize,
}

/// How strongly an occurrence looks like a section heading. Lower wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Rank {
    /// `KEYWORD:`
    Colon,
    /// Keyword at the start of a line, no colon.
    LineStart,
    /// Anywhere else.
    Plain,
}

/// Split a note into its ADIME sections.
///
/// For each keyword the first colon-terminated occurrence wins, then the
/// first one at a line start, then the first occurrence anywhere.
pub fn split_sections(text: &str) -> NoteSections {
    let text = normalise_line_endings(text);
    let mut best: [Option<(Rank, Anchor)>; 4] = [None; 4];

    for caps in RE_ANCHOR.captures_iter(&text) {
        let (Some(whole), Some(word)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Some(section) = Section::from_keyword(word.as_str()) else {
            continue;
        };
        let rank = if caps.get(2).is_some() {
            Rank::Colon
        } else if starts_line(&text, whole.start()) {
            Rank::LineStart
        } else {
            Rank::Plain
        };
        let anchor = Anchor {
            section,
            start: whole.start(),
            content_start: whole.end(),
        };
        let slot = &mut best[section.index()];
        if slot.map_or(true, |(held, _)| rank < held) {
            *slot = Some((rank, anchor));
        }
    }

    let mut anchors: Vec<Anchor> = best.iter().flatten().map(|&(_, a)| a).collect();
    anchors.sort_by_key(|a| a.start);

    let mut sections = NoteSections::default();
    for (i, anchor) in anchors.iter().enumerate() {
        let end = anchors.get(i + 1).map_or(text.len(), |next| next.start);
        let body = text[anchor.content_start..end.max(anchor.content_start)].trim();
        *sections.slot(anchor.section) = Some(body.to_string());
    }

    debug!("Located {} of 4 ADIME sections", sections.found());
    sections
}

/// True when only whitespace or Markdown heading/list markers precede `pos` on its line.
fn starts_line(text: &str, pos: usize) -> bool {
    let line_start = text[..pos].rfind('\n').map_or(0, |i| i + 1);
    text[line_start..pos]
        .chars()
        .all(|c| c.is_whitespace() || matches!(c, '#' | '*' | '-' | '_'))
}

/// Build action items from Intervention text.
///
/// Bullet markers (`1.`, `•`, `*`) split the text into items; when there are
/// none, blank-line separated paragraphs longer than 20 characters are used.
pub fn extract_action_items(intervention: &str) -> Vec<ActionItem> {
    let text = normalise_line_endings(intervention);

    let bulleted: Vec<ActionItem> = bullet_segments(&text)
        .into_iter()
        .map(|segment| action_item(segment, false))
        .collect();
    if !bulleted.is_empty() {
        return bulleted;
    }

    RE_BLANK_LINE
        .split(&text)
        .map(str::trim)
        .filter(|p| p.chars().count() > MIN_PARAGRAPH_CHARS)
        .map(|p| action_item(p, true))
        .collect()
}

/// Segments following each accepted bullet marker, trimmed and non-empty.
///
/// A marker must start the text or follow whitespace, and must be followed
/// by whitespace, so quantities like `1.5 cups`, versions like `v2.0` and
/// Markdown emphasis like `**Plan**` are not mistaken for list markers.
fn bullet_segments(text: &str) -> Vec<&str> {
    let markers: Vec<(usize, usize)> = RE_BULLET
        .find_iter(text)
        .filter(|m| {
            let before_ok = text[..m.start()]
                .chars()
                .next_back()
                .map_or(true, char::is_whitespace);
            let after_ok = text[m.end()..]
                .chars()
                .next()
                .map_or(true, char::is_whitespace);
            before_ok && after_ok
        })
        .map(|m| (m.start(), m.end()))
        .collect();

    markers
        .iter()
        .enumerate()
        .map(|(i, &(_, content_start))| {
            let end = markers.get(i + 1).map_or(text.len(), |&(next, _)| next);
            text[content_start..end].trim()
        })
        .filter(|s| !s.is_empty())
        .collect()
}

fn action_item(text: &str, from_paragraph: bool) -> ActionItem {
    ActionItem {
        title: synthesise_title(text),
        description: text.to_string(),
        visualization_prompt: Some(visualization_prompt(text, from_paragraph)),
        ..Default::default()
    }
}

/// First four words, plus an ellipsis when anything was cut.
fn synthesise_title(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut title = words[..words.len().min(TITLE_WORDS)].join(" ");
    if words.len() > TITLE_WORDS {
        title.push_str("...");
    }
    title
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

/// Build a full document from a note without any remote call.
pub fn extract_fallback(text: &str) -> AdimeDocument {
    let sections = split_sections(text);
    if sections.found() == 0 {
        warn!("No ADIME section keywords found; returning an empty document");
    }

    let intervention = sections.intervention.unwrap_or_default();
    let action_items = extract_action_items(&intervention);
    debug!("Rule-based parser produced {} action items", action_items.len());

    AdimeDocument {
        assessment: AssessmentData {
            summary: sections.assessment.unwrap_or_default(),
            ..Default::default()
        },
        diagnosis: DiagnosisData {
            summary: sections.diagnosis.unwrap_or_default(),
            ..Default::default()
        },
        intervention: InterventionData {
            summary: intervention,
            action_items,
            ..Default::default()
        },
        monitoring: MonitoringData {
            follow_up: sections.monitoring.unwrap_or_default(),
            ..Default::default()
        },
        ..Default::default()
    }
}
