use std::fmt;
use std::str::FromStr;

pub const MAX_TEST_CASES: usize = 10;

/// Output layout the model is told to use; the parser is chosen to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingScheme {
    /// `### Test Case N: <title>` with bold section labels.
    Headings,
    /// `N. **<title>**` with bold section labels.
    Bullets,
    /// `Test Case N` blocks with `Title:` / `Description:` / `Steps:` / `Expected:`.
    Fields,
}

impl fmt::Display for HeadingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HeadingScheme::Headings => "headings",
            HeadingScheme::Bullets => "bullets",
            HeadingScheme::Fields => "fields",
        };
        f.write_str(name)
    }
}

impl FromStr for HeadingScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "headings" | "a" => Ok(HeadingScheme::Headings),
            "bullets" | "b" => Ok(HeadingScheme::Bullets),
            "fields" => Ok(HeadingScheme::Fields),
            other => Err(format!(
                "unknown heading scheme '{}' (expected headings, bullets or fields)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    scheme: HeadingScheme,
}

impl PromptBuilder {
    pub fn new(scheme: HeadingScheme) -> Self {
        Self { scheme }
    }

    pub fn scheme(&self) -> HeadingScheme {
        self.scheme
    }

    pub fn build(&self, context_docs: &[String], story_text: &str) -> String {
        let context_text = if context_docs.is_empty() {
            "(none)".to_string()
        } else {
            context_docs.join("\n")
        };

        format!(
            "You are an expert QA and compliance analyst. Review the following user story and \
generate **no more than {max}** synthetic test cases.
Ensure that the test cases:
- Follow QA best practices, covering both positive and negative tests.
- Identify potential issues that security audits might flag.
- Observe domain compliance standards and record-keeping best practices.
- Incorporate patterns, scenarios and details similar to the relevant past test cases below.

Number the test cases sequentially starting at 1 and use exactly this format for every one:

{format}
Relevant Past Test Cases:
{context}

User Story:
{story}

Generate Test Cases:
",
            max = MAX_TEST_CASES,
            format = self.format_section(),
            context = context_text,
            story = story_text.trim(),
        )
    }

    fn format_section(&self) -> &'static str {
        match self.scheme {
            HeadingScheme::Headings => {
                "### Test Case 1: <title>
**Description:** <what is being verified>
**Steps:** <numbered steps>
**Expected Outcome:** <observable result>

### Test Case 2: <title>
...
"
            }
            HeadingScheme::Bullets => {
                "1. **<title>**
   - **Description:** <what is being verified>
   - **Steps:** <numbered steps>
   - **Expected Outcome:** <observable result>
2. **<title>**
...
"
            }
            HeadingScheme::Fields => {
                "Test Case 1
Title: ...
Description: ...
Steps:
1) ...
2) ...
Expected: ...
---

Test Case 2
Title: ...
Description: ...
Steps:
1) ...
2) ...
Expected: ...
---

And so on.
"
            }
        }
    }
}
