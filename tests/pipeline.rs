use std::collections::HashMap;
use std::fs;
use std::sync::Mutex;
use tempfile::TempDir;

use casegen::assistant::{Assistant, Turn};
use casegen::config::Number;
use casegen::embedding::Embedder;
use casegen::export::export_csv;
use casegen::generator::{Generation, TextGenerator};
use casegen::index::{IndexPaths, VectorIndex};
use casegen::ingest::{ingest_documents, IngestOptions};
use casegen::pipeline::TestCasePipeline;
use casegen::prompt::HeadingScheme;
use casegen::tracker::{WorkItem, WorkItemSource};
use casegen::{RagError, Result, TestCaseRecord};

const LOGIN_STORY: &str = "As a user I want to log in so that I can access my account.";
const LOGIN_REPLY: &str =
    "### Test Case 1: Login\n**Description:** test\n**Steps:** step1\n**Expected Outcome:** ok\n";

/// Letter-frequency embedding over a..h.
struct LetterEmbedder;

impl Embedder for LetterEmbedder {
    fn dimension(&self) -> usize {
        8
    }

    fn embed_chunks(&self, text: &str) -> Result<Vec<Vec<Number>>> {
        let mut v = vec![0.0; 8];
        for c in text.to_lowercase().chars() {
            if ('a'..='h').contains(&c) {
                v[(c as u8 - b'a') as usize] += 1.0;
            }
        }
        Ok(vec![v])
    }
}

/// Replies with a fixed text and remembers every prompt.
struct Scripted {
    reply: &'static str,
    prompts: Mutex<Vec<String>>,
}

impl Scripted {
    fn new(reply: &'static str) -> Self {
        Self {
            reply,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

impl TextGenerator for Scripted {
    fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.to_string())
    }
}

struct Unreachable;

impl TextGenerator for Unreachable {
    fn complete(&self, _prompt: &str) -> Result<String> {
        Err(RagError::Upstream("connection refused".to_string()))
    }
}

struct Tracker(HashMap<&'static str, WorkItem>);

impl WorkItemSource for Tracker {
    fn fetch_work_item(&self, id: &str) -> Result<Option<WorkItem>> {
        Ok(self.0.get(id).cloned())
    }
}

fn empty_index(dir: &TempDir) -> VectorIndex {
    let paths = IndexPaths::new(dir.path().join("cases.index"), dir.path().join("cases.json"));
    VectorIndex::open(paths, 8).unwrap()
}

#[test]
fn login_story_with_empty_index_yields_one_record() {
    let dir = TempDir::new().unwrap();
    let index = empty_index(&dir);
    let generator = Scripted::new(LOGIN_REPLY);
    let pipeline = TestCasePipeline::new(
        &LetterEmbedder,
        &index,
        &generator,
        HeadingScheme::Headings,
        5,
        true,
    );

    let outcome = pipeline.run(LOGIN_STORY);

    assert_eq!(outcome.context_count, 0);
    assert!(outcome.generation.is_ok());
    assert!(outcome.prompt.contains(LOGIN_STORY));
    assert!(!outcome.prompt.starts_with("ERROR:"));
    assert_eq!(
        outcome.records,
        vec![TestCaseRecord::new("Login", "test", "step1", "ok")]
    );
}

#[test]
fn retrieved_documents_reach_the_prompt() {
    let dir = TempDir::new().unwrap();
    let mut index = empty_index(&dir);
    let docs = vec![
        "Title: Login with valid password".to_string(),
        "Title: Export a monthly report".to_string(),
    ];
    ingest_documents(
        &docs,
        &LetterEmbedder,
        &mut index,
        &IngestOptions {
            workers: 2,
            delay: std::time::Duration::ZERO,
            batch_size: 10,
        },
    )
    .unwrap();

    let generator = Scripted::new(LOGIN_REPLY);
    let pipeline = TestCasePipeline::new(
        &LetterEmbedder,
        &index,
        &generator,
        HeadingScheme::Headings,
        1,
        false,
    );
    let outcome = pipeline.run("<p>Login with valid password</p>");

    assert_eq!(outcome.context_count, 1);
    let prompt = generator.last_prompt();
    assert!(prompt.contains("Title: Login with valid password"));
    assert!(!prompt.contains("monthly report"));
    // markup is gone before the story reaches the prompt
    assert!(!prompt.contains("<p>"));
}

#[test]
fn failed_generation_is_reported_not_raised() {
    let dir = TempDir::new().unwrap();
    let index = empty_index(&dir);
    let pipeline = TestCasePipeline::new(
        &LetterEmbedder,
        &index,
        &Unreachable,
        HeadingScheme::Headings,
        5,
        true,
    );

    let outcome = pipeline.run(LOGIN_STORY);

    assert!(matches!(outcome.generation, Generation::Failed(_)));
    assert!(outcome.generation.to_string().starts_with("ERROR:"));
    assert!(outcome.records.is_empty());
}

#[test]
fn export_scenario_writes_header_and_row() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.csv");
    export_csv(&[TestCaseRecord::new("A", "B", "C", "D")], &path).unwrap();
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "Test Case,Description,Steps,Expected Outcome\nA,B,C,D\n"
    );
}

#[test]
fn assistant_generates_and_exports_for_a_story_id() {
    let dir = TempDir::new().unwrap();
    let index = empty_index(&dir);
    let generator = Scripted::new(
        "**Test Case 1**\nTitle: Login\nDescription: valid user\nSteps:\n1) open\n2) submit\nExpected: dashboard\n---\n",
    );
    let pipeline = TestCasePipeline::new(
        &LetterEmbedder,
        &index,
        &generator,
        HeadingScheme::Fields,
        5,
        true,
    );
    let tracker = Tracker(HashMap::from([(
        "144329",
        WorkItem {
            title: "Login".to_string(),
            description: "<div>Users sign in</div>".to_string(),
            acceptance_criteria: String::new(),
        },
    )]));
    let output = dir.path().join("voice.csv");
    let assistant = Assistant::new(
        Some(&tracker as &dyn WorkItemSource),
        &pipeline,
        &generator,
        &output,
    );

    let turn = assistant.respond("Generate test cases for user story 144329");

    match turn {
        Turn::Reply(text) => assert!(text.contains("144329") && text.contains("saved")),
        Turn::Exit => panic!("unexpected exit"),
    }
    let csv = fs::read_to_string(&output).unwrap();
    assert!(csv.starts_with("Test Case,Description,Steps,Expected Outcome\n"));
    assert!(csv.contains("Login,valid user,\"1) open\n2) submit\",dashboard"));
}

#[test]
fn assistant_apologizes_for_unknown_story() {
    let dir = TempDir::new().unwrap();
    let index = empty_index(&dir);
    let generator = Scripted::new("hello");
    let pipeline = TestCasePipeline::new(
        &LetterEmbedder,
        &index,
        &generator,
        HeadingScheme::Fields,
        5,
        true,
    );
    let tracker = Tracker(HashMap::new());
    let assistant = Assistant::new(
        Some(&tracker as &dyn WorkItemSource),
        &pipeline,
        &generator,
        dir.path().join("x.csv"),
    );

    assert_eq!(
        assistant.respond("generate test cases for user story 9"),
        Turn::Reply("Failed to retrieve user story ID 9 from ADO.".to_string())
    );
    assert_eq!(
        assistant.respond("how are you"),
        Turn::Reply("hello".to_string())
    );
    assert_eq!(assistant.respond("exit"), Turn::Exit);
}

#[test]
fn assistant_without_tracker_still_converses() {
    let dir = TempDir::new().unwrap();
    let index = empty_index(&dir);
    let generator = Scripted::new("fine, thanks");
    let pipeline = TestCasePipeline::new(
        &LetterEmbedder,
        &index,
        &generator,
        HeadingScheme::Fields,
        5,
        true,
    );
    let output = dir.path().join("never.csv");
    let assistant = Assistant::new(None, &pipeline, &generator, &output);

    match assistant.respond("generate test cases for user story 12") {
        Turn::Reply(text) => assert!(text.contains("tracker is not configured")),
        Turn::Exit => panic!("unexpected exit"),
    }
    assert!(generator.prompts.lock().unwrap().is_empty());
    assert!(!output.exists());

    assert_eq!(
        assistant.respond("how are you"),
        Turn::Reply("fine, thanks".to_string())
    );
}
