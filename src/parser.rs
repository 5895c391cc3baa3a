//! Recovers [`TestCaseRecord`]s from free-form model output.
//!
//! Whole-response parsing tries an ordered list of grammars and keeps the
//! first non-empty result:
//!
//! 1. headings: `### Test Case N: <title>` followed by bold section labels
//! 2. bullets: `N. **<title>**` followed by the same bold labels
//!
//! The conversational flow uses a separate inline-field grammar
//! (`Title:` / `Description:` / `Steps:` / `Expected:`) applied to blocks cut
//! by [`segment_blocks`].
//!
//! Every detected heading yields exactly one record, even when all of its
//! sections are missing.

use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use crate::prompt::HeadingScheme;
use crate::record::TestCaseRecord;

/// A grammar maps a whole response to records, or to nothing if it does not apply.
pub type Grammar = fn(&str) -> Vec<TestCaseRecord>;

/// Whole-response grammars in priority order.
pub const GRAMMARS: [(&str, Grammar); 2] = [("headings", parse_headings), ("bullets", parse_bullets)];

/// First non-empty result of [`GRAMMARS`].
pub fn parse(text: &str) -> Vec<TestCaseRecord> {
    for (name, grammar) in GRAMMARS {
        let records = grammar(text);
        if !records.is_empty() {
            debug!("Parsed {} test cases with the {} grammar", records.len(), name);
            return records;
        }
        debug!("The {} grammar found no test cases", name);
    }
    Vec::new()
}

/// Picks the parser matching the template the prompt asked for.
pub fn parse_for_scheme(scheme: HeadingScheme, text: &str) -> Vec<TestCaseRecord> {
    match scheme {
        HeadingScheme::Headings | HeadingScheme::Bullets => parse(text),
        HeadingScheme::Fields => parse_inline(text),
    }
}

// ---------------------------------------------------------------------------
// Bold-label grammars
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Description,
    Steps,
    ExpectedOutcome,
}

impl Section {
    fn from_label(label: &str) -> Option<Self> {
        let normalized = label
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        match normalized.as_str() {
            "description" => Some(Section::Description),
            "steps" => Some(Section::Steps),
            "expected outcome" => Some(Section::ExpectedOutcome),
            _ => None,
        }
    }
}

fn heading_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)^[ \t]*#{3,}[ \t]+test[ \t]+case[ \t]+\d+[ \t]*:[ \t]*(.*)$")
            .expect("valid regex")
    })
}

fn bullet_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*\d+\.[ \t]+\*\*([^*\n]+)\*\*").expect("valid regex"))
}

/// `**Label:**` (or `**Label**:`), optionally led by a list marker on its line.
fn bold_label() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?im)(?:^[ \t]*[-*+][ \t]*)?\*\*[ \t]*(description|steps|expected[ \t]+outcome)[ \t]*(?::[ \t]*\*\*|\*\*[ \t]*:)",
        )
        .expect("valid regex")
    })
}

struct Segment<'a> {
    title: String,
    body: &'a str,
}

/// Cuts `text` at every heading match; each body runs to the next heading.
fn segment<'a>(text: &'a str, heading: &Regex, accept: fn(&str) -> bool) -> Vec<Segment<'a>> {
    let heads: Vec<(usize, usize, String)> = heading
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let title = caps.get(1).map_or("", |m| m.as_str());
            accept(title).then(|| (whole.start(), whole.end(), clean_title(title)))
        })
        .collect();

    heads
        .iter()
        .enumerate()
        .map(|(i, (_, end, title))| {
            let body_end = heads.get(i + 1).map_or(text.len(), |next| next.0);
            Segment {
                title: title.clone(),
                body: &text[*end..body_end],
            }
        })
        .collect()
}

fn clean_title(raw: &str) -> String {
    raw.trim().trim_matches('*').trim().to_string()
}

struct LabelMatch {
    section: Section,
    start: usize,
    end: usize,
}

fn find_labels(body: &str) -> Vec<LabelMatch> {
    bold_label()
        .captures_iter(body)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let section = Section::from_label(caps.get(1)?.as_str())?;
            Some(LabelMatch {
                section,
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

/// Text after the first `section` label, up to the next recognized label or
/// the end of the block. Empty when the label is absent.
fn section_text(body: &str, labels: &[LabelMatch], section: Section) -> String {
    let Some(pos) = labels.iter().position(|l| l.section == section) else {
        return String::new();
    };
    let start = labels[pos].end;
    let end = labels.get(pos + 1).map_or(body.len(), |next| next.start);
    body[start..end].trim().to_string()
}

fn record_from_segment(segment: &Segment<'_>) -> TestCaseRecord {
    let labels = find_labels(segment.body);
    TestCaseRecord {
        title: segment.title.clone(),
        description: section_text(segment.body, &labels, Section::Description),
        steps: section_text(segment.body, &labels, Section::Steps),
        expected_outcome: section_text(segment.body, &labels, Section::ExpectedOutcome),
    }
}

pub fn parse_headings(text: &str) -> Vec<TestCaseRecord> {
    segment(text, heading_line(), |_| true)
        .iter()
        .map(record_from_segment)
        .collect()
}

pub fn parse_bullets(text: &str) -> Vec<TestCaseRecord> {
    // `1. **Description:**` is a label that happens to be numbered, not a case
    let is_title = |title: &str| Section::from_label(title.trim().trim_end_matches(':')).is_none();
    segment(text, bullet_line(), is_title)
        .iter()
        .map(record_from_segment)
        .collect()
}

// ---------------------------------------------------------------------------
// Inline-field grammar
// ---------------------------------------------------------------------------

/// `**Test Case N**` anywhere in the text, or `Test Case N` alone on a line.
fn block_heading() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?im)\*\*[ \t]*test[ \t]*case[ \t]*\d+[ \t]*:?[ \t]*\*\*|^[ \t]*test[ \t]+case[ \t]*\d+[ \t]*:?[ \t]*$",
        )
        .expect("valid regex")
    })
}

fn inline_title() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)Title:\s*(.*)").expect("valid regex"))
}

fn inline_description() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)Description:\s*(.*)").expect("valid regex"))
}

fn inline_steps() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)Steps:").expect("valid regex"))
}

fn inline_expected() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)Expected:\s*(.*)").expect("valid regex"))
}

/// Splits conversational output at `**Test Case N**` markers and bare
/// `Test Case N` lines.
/// Without such lines the whole trimmed text is a single block.
pub fn segment_blocks(text: &str) -> Vec<String> {
    let starts: Vec<(usize, usize)> = block_heading()
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .collect();

    if starts.is_empty() {
        let whole = text.trim();
        return if whole.is_empty() {
            Vec::new()
        } else {
            vec![whole.to_string()]
        };
    }

    starts
        .iter()
        .enumerate()
        .map(|(i, (_, end))| {
            let block_end = starts.get(i + 1).map_or(text.len(), |next| next.0);
            trim_separator(&text[*end..block_end]).to_string()
        })
        .collect()
}

fn trim_separator(block: &str) -> &str {
    block
        .trim()
        .trim_start_matches(':')
        .trim_start()
        .trim_end_matches('-')
        .trim_end()
}

fn single_line(re: &Regex, block: &str) -> String {
    re.captures(block)
        .and_then(|caps| caps.get(1))
        .map_or_else(String::new, |m| m.as_str().trim().to_string())
}

/// `Steps:` runs until a literal `Expected:` label or the end of the block.
fn inline_steps_text(block: &str) -> String {
    let Some(label) = inline_steps().find(block) else {
        return String::new();
    };
    let rest = &block[label.end()..];
    let end = inline_expected().find(rest).map_or(rest.len(), |m| m.start());
    rest[..end].trim().to_string()
}

/// Fields of one pre-segmented block. `Title:`, `Description:` and
/// `Expected:` take the first non-blank text after the label, which may sit
/// on the following line.
pub fn parse_inline_block(block: &str) -> TestCaseRecord {
    TestCaseRecord {
        title: single_line(inline_title(), block),
        description: single_line(inline_description(), block),
        steps: inline_steps_text(block),
        expected_outcome: single_line(inline_expected(), block),
    }
}

/// [`segment_blocks`] followed by [`parse_inline_block`]. An unheaded
/// response that carries no fields at all produces no records.
pub fn parse_inline(text: &str) -> Vec<TestCaseRecord> {
    let headed = block_heading().is_match(text);
    segment_blocks(text)
        .iter()
        .map(|block| parse_inline_block(block))
        .filter(|record| headed || !record.is_blank())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEME_A: &str = "Here are the cases.

### Test Case 1: Successful login
**Description:** Valid credentials are accepted.
**Steps:**
1. Open the login page
2. Submit valid credentials
**Expected Outcome:** The dashboard is shown.

### TEST CASE 2: Wrong password
**Description:** Invalid password is rejected.
**Steps:** Submit a wrong password.
**Expected Outcome:** An error message appears.

### test case 3: Locked account
**Description:** Locked users cannot sign in.
**Steps:** Sign in as a locked user.
**Expected Outcome:** A lockout notice appears.
";

    const SCHEME_B: &str = "1. **Successful Registration**
   - **Description:** New user registers.
   - **Steps:** Fill the form and submit.
   - **Expected Outcome:** Account is created.
2. **Duplicate Email**
   - **Description:** Email already used.
   - **Expected Outcome:** Registration is refused.
";

    #[test]
    fn headings_yield_one_record_per_case_in_order() {
        let records = parse(SCHEME_A);
        assert_eq!(records.len(), 3);
        let titles: Vec<_> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["Successful login", "Wrong password", "Locked account"]);
        for r in &records {
            assert!(!r.description.is_empty());
            assert!(!r.steps.is_empty());
            assert!(!r.expected_outcome.is_empty());
        }
        assert_eq!(
            records[0].steps,
            "1. Open the login page\n2. Submit valid credentials"
        );
        assert_eq!(records[0].expected_outcome, "The dashboard is shown.");
    }

    #[test]
    fn single_case_scenario() {
        let text = "### Test Case 1: Login\n**Description:** test\n**Steps:** step1\n**Expected Outcome:** ok\n";
        assert_eq!(
            parse(text),
            vec![TestCaseRecord::new("Login", "test", "step1", "ok")]
        );
    }

    #[test]
    fn falls_back_to_bullets() {
        assert!(parse_headings(SCHEME_B).is_empty());
        let records = parse(SCHEME_B);
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0],
            TestCaseRecord::new(
                "Successful Registration",
                "New user registers.",
                "Fill the form and submit.",
                "Account is created."
            )
        );
        assert_eq!(records[1].title, "Duplicate Email");
        assert_eq!(records[1].steps, "");
        assert_eq!(records[1].description, "Email already used.");
        assert_eq!(records[1].expected_outcome, "Registration is refused.");
    }

    #[test]
    fn missing_steps_leaves_other_fields_intact() {
        let text = "### Test Case 1: No steps\n**Description:** d\n**Expected Outcome:** e\n";
        let records = parse(text);
        assert_eq!(records, vec![TestCaseRecord::new("No steps", "d", "", "e")]);
    }

    #[test]
    fn empty_case_is_still_emitted() {
        let text = "### Test Case 1: First\n### Test Case 2: Second\n**Steps:** go\n";
        let records = parse(text);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], TestCaseRecord::new("First", "", "", ""));
        assert_eq!(records[1].steps, "go");
    }

    #[test]
    fn sections_stop_at_any_following_label() {
        let text = "### Test Case 1: Reordered\n**Expected Outcome:** shown\n**Description:** first\n";
        let records = parse(text);
        assert_eq!(records[0].expected_outcome, "shown");
        assert_eq!(records[0].description, "first");
    }

    #[test]
    fn labels_match_case_insensitively() {
        let text = "### Test Case 1: T\n**DESCRIPTION:** d\n**steps:** s\n**Expected outcome:** e";
        assert_eq!(parse(text), vec![TestCaseRecord::new("T", "d", "s", "e")]);
    }

    #[test]
    fn unstructured_text_yields_nothing() {
        assert!(parse("Sorry, I cannot help with that.").is_empty());
        assert!(parse("").is_empty());
    }

    #[test]
    fn numbered_label_is_not_a_bullet_case() {
        let text = "1. **Login**\n- **Description:** d\n2. **Steps:**\n";
        let records = parse_bullets(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Login");
    }

    const FIELDS: &str = "**Test Case 1**
Title: Login works
Description: Valid user signs in
Steps:
1) Open page
2) Submit form
Expected: Dashboard shown
---

Test Case 2
Title: Bad password
Description: Wrong password
Expected: Error shown
---
";

    #[test]
    fn segments_blocks_at_test_case_lines() {
        let blocks = segment_blocks(FIELDS);
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].starts_with("Title: Login works"));
        assert!(blocks[0].ends_with("Expected: Dashboard shown"));
    }

    #[test]
    fn unheaded_text_is_one_block() {
        assert_eq!(segment_blocks("  Title: x  "), vec!["Title: x".to_string()]);
        assert!(segment_blocks("   ").is_empty());
    }

    #[test]
    fn inline_block_fields() {
        let record = parse_inline_block(
            "Title: Login works\nDescription: Valid user\nSteps:\n1) Open\n2) Submit\nExpected: Shown",
        );
        assert_eq!(
            record,
            TestCaseRecord::new("Login works", "Valid user", "1) Open\n2) Submit", "Shown")
        );
    }

    #[test]
    fn inline_steps_without_expected_run_to_end() {
        let record = parse_inline_block("Title: t\nSteps: a\nb");
        assert_eq!(record.steps, "a\nb");
        assert_eq!(record.expected_outcome, "");
    }

    #[test]
    fn inline_parse_keeps_one_record_per_block() {
        let records = parse_inline(FIELDS);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].title, "Bad password");
        assert_eq!(records[1].steps, "");
        assert_eq!(records[1].expected_outcome, "Error shown");
    }

    #[test]
    fn bold_markers_split_blocks_mid_line() {
        let reply = "**Test Case 1**: Login\nTitle: Login\nExpected: in\n\n**Test Case 2**: Logout\nTitle: Logout\nExpected: out";
        let blocks = segment_blocks(reply);
        assert_eq!(blocks.len(), 2);
        assert!(blocks[1].starts_with("Logout\nTitle: Logout"));
        let titles: Vec<_> = parse_inline(reply).into_iter().map(|r| r.title).collect();
        assert_eq!(titles, ["Login", "Logout"]);
    }

    #[test]
    fn inline_values_may_start_on_the_next_line() {
        let record = parse_inline_block(
            "Title:\nLogin\nDescription:\n  Valid user\nSteps:\n1) Open\nExpected:\nDashboard shown",
        );
        assert_eq!(
            record,
            TestCaseRecord::new("Login", "Valid user", "1) Open", "Dashboard shown")
        );
    }

    #[test]
    fn deeper_heading_levels_are_accepted() {
        let text = "#### Test Case 1: Login\n**Description:** d\n#### Test Case 2: Logout\n";
        let titles: Vec<_> = parse(text).into_iter().map(|r| r.title).collect();
        assert_eq!(titles, ["Login", "Logout"]);
    }

    #[test]
    fn inline_parse_of_chatter_is_empty() {
        assert!(parse_inline("I could not think of any.").is_empty());
    }

    #[test]
    fn scheme_dispatch() {
        assert_eq!(parse_for_scheme(HeadingScheme::Fields, FIELDS).len(), 2);
        assert_eq!(parse_for_scheme(HeadingScheme::Bullets, SCHEME_A).len(), 3);
        assert_eq!(parse_for_scheme(HeadingScheme::Headings, SCHEME_B).len(), 2);
        assert!(parse_for_scheme(HeadingScheme::Headings, FIELDS).is_empty());
    }
}
