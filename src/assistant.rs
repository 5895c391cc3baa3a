use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::{error, info, warn};

use crate::export::export_csv;
use crate::generator::{generate, Generation, TextGenerator};
use crate::pipeline::TestCasePipeline;
use crate::tracker::WorkItemSource;

pub const DEFAULT_CHAT_OUTPUT: &str = "my_voice_test_cases.csv";

const PERSONA: &str = "You are a friendly assistant with deep knowledge of software engineering \
and quality assurance. Answer warmly and concisely.";

/// What the user asked for in one utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Exit,
    GenerateTestCases(String),
    MissingStoryId,
    Conversation(String),
}

impl Intent {
    pub fn parse(utterance: &str) -> Self {
        let text = utterance.trim();
        let lower = text.to_lowercase();
        if lower == "exit" || lower == "quit" {
            return Intent::Exit;
        }
        if lower.contains("generate test cases") && lower.contains("user story") {
            return match extract_story_id(&lower) {
                Some(id) => Intent::GenerateTestCases(id),
                None => Intent::MissingStoryId,
            };
        }
        Intent::Conversation(text.to_string())
    }
}

/// The digits following "user story" in `text`, if any.
pub fn extract_story_id(text: &str) -> Option<String> {
    static STORY_ID: OnceLock<Regex> = OnceLock::new();
    let re = STORY_ID.get_or_init(|| Regex::new(r"(?i)user story\s+(\d+)").expect("valid regex"));
    re.captures(text).map(|caps| caps[1].to_string())
}

/// Result of one conversational turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Turn {
    Exit,
    Reply(String),
}

/// Turns utterances into spoken replies, running the tracker -> pipeline ->
/// CSV flow when asked for test cases. Without a tracker only conversation
/// is available.
pub struct Assistant<'a> {
    tracker: Option<&'a dyn WorkItemSource>,
    pipeline: &'a TestCasePipeline<'a>,
    generator: &'a dyn TextGenerator,
    output: PathBuf,
}

impl<'a> Assistant<'a> {
    pub fn new(
        tracker: Option<&'a dyn WorkItemSource>,
        pipeline: &'a TestCasePipeline<'a>,
        generator: &'a dyn TextGenerator,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            tracker,
            pipeline,
            generator,
            output: output.into(),
        }
    }

    pub fn respond(&self, utterance: &str) -> Turn {
        match Intent::parse(utterance) {
            Intent::Exit => Turn::Exit,
            Intent::GenerateTestCases(id) => Turn::Reply(self.generate_for_story(&id)),
            Intent::MissingStoryId => Turn::Reply(
                "I'm sorry, I didn't catch a valid user story ID in your request.".to_string(),
            ),
            Intent::Conversation(text) => Turn::Reply(self.converse(&text)),
        }
    }

    fn generate_for_story(&self, id: &str) -> String {
        let Some(tracker) = self.tracker else {
            warn!("Test case request for story {} without a tracker", id);
            return format!(
                "I'm sorry, the work item tracker is not configured, so I can't fetch user story {}.",
                id
            );
        };

        info!("Generating test cases for user story {}", id);
        let item = match tracker.fetch_work_item(id) {
            Ok(Some(item)) => item,
            Ok(None) => return format!("Failed to retrieve user story ID {} from ADO.", id),
            Err(e) => {
                error!("Error fetching user story {}: {}", id, e);
                return format!("Failed to retrieve user story ID {} from ADO.", id);
            }
        };

        let outcome = self.pipeline.run(&item.story_text());
        if !outcome.generation.is_ok() {
            return "I'm sorry, I couldn't generate test cases at this time.".to_string();
        }
        if outcome.records.is_empty() {
            return "No test cases were returned from the AI.".to_string();
        }

        match export_csv(&outcome.records, &self.output) {
            Ok(_) => format!(
                "Test cases for story {} have been generated and saved to '{}'.",
                id,
                self.output.display()
            ),
            Err(e) => {
                error!("Error saving test cases for story {}: {}", id, e);
                "I encountered an error generating the test cases. Please check the logs."
                    .to_string()
            }
        }
    }

    fn converse(&self, text: &str) -> String {
        let prompt = format!("{}\n\nUser: {}", PERSONA, text);
        match generate(self.generator, &prompt) {
            Generation::Ok(reply) => reply.trim().to_string(),
            Generation::Failed(reason) => {
                warn!("Conversation reply failed: {}", reason);
                "Sorry, I couldn't come up with a response just now.".to_string()
            }
        }
    }
}
