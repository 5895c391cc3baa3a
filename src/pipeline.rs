use std::time::Instant;
use tracing::{debug, info, warn};

use crate::embedding::Embedder;
use crate::generator::{generate, Generation, TextGenerator};
use crate::index::VectorIndex;
use crate::parser::parse_for_scheme;
use crate::prompt::{HeadingScheme, PromptBuilder};
use crate::record::TestCaseRecord;
use crate::retriever::{preview, Retriever};
use crate::text::strip_markup;

/// Everything one story produced on its way through the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub context_count: usize,
    pub prompt: String,
    pub generation: Generation,
    pub records: Vec<TestCaseRecord>,
}

/// clean -> retrieve -> prompt -> generate -> parse, for one story at a time.
pub struct TestCasePipeline<'a> {
    retriever: Retriever<'a>,
    prompts: PromptBuilder,
    generator: &'a dyn TextGenerator,
}

impl<'a> TestCasePipeline<'a> {
    pub fn new(
        embedder: &'a dyn Embedder,
        index: &'a VectorIndex,
        generator: &'a dyn TextGenerator,
        scheme: HeadingScheme,
        top_k: usize,
        strip_stop_words: bool,
    ) -> Self {
        Self {
            retriever: Retriever::new(embedder, index, top_k, strip_stop_words),
            prompts: PromptBuilder::new(scheme),
            generator,
        }
    }

    pub fn scheme(&self) -> HeadingScheme {
        self.prompts.scheme()
    }

    pub fn run(&self, raw_story: &str) -> PipelineOutcome {
        let start = Instant::now();
        let story = strip_markup(raw_story);
        debug!("Processed story: {}", preview(&story, 100));

        let context = self.retriever.retrieve(&story);
        let prompt = self.prompts.build(&context, &story);
        let generation = generate(self.generator, &prompt);

        let records = match &generation {
            Generation::Ok(text) => parse_for_scheme(self.prompts.scheme(), text),
            Generation::Failed(reason) => {
                warn!("Skipping parse after failed generation: {}", reason);
                Vec::new()
            }
        };
        if generation.is_ok() && records.is_empty() {
            warn!("Model output matched no test case format");
        }

        info!(
            "Pipeline produced {} test cases from {} context documents in {:?}",
            records.len(),
            context.len(),
            start.elapsed()
        );
        PipelineOutcome {
            context_count: context.len(),
            prompt,
            generation,
            records,
        }
    }
}
