//! LLM prompts for section inference.

use std::fmt::Write;

use crate::tree::{HeadingRecord, UnresolvedEntry};

/// Collection of prompts used by the fallback collaborator.
pub struct Prompts;

impl Prompts {
    /// System prompt for inferring the real section list from raw headings.
    pub fn section_inference() -> &'static str {
        r#"You are a book indexer. Given a list of every markdown heading in a book (with line number and level), infer the real table of contents.

Rules:
- EXCLUDE: the book title, "Contents", "Acknowledgments", and any inserted content such as clippings, sidebars or figure captions.
- INCLUDE: only headings that are actual chapters or sections of the main body. The main body starts at the first real chapter.
- DEPTH: 1 = main chapter, 2 = section, 3 = subsection. All main chapter titles must be depth 1. Do not nest later chapters under the book title.
- Some sections may be listed as unresolved: their titles were printed in the contents but could not be matched. Include them when a heading clearly corresponds to one, using the printed title.
- Output valid JSON only: an array of objects, each with "title" (string), "depth" (integer 1, 2, or 3), and optionally "page" (integer, the internal page from the heading list) when known. Use the exact title as it appears. List entries in ascending line number order."#
    }

    /// User message: `line: #level title (p. N)` rows, then the unresolved titles.
    pub fn section_inference_user(headings: &[HeadingRecord], unresolved: &[UnresolvedEntry]) -> String {
        let mut prompt =
            String::from("Infer the table of contents from these headings (line_number: #level heading_text):\n\n");
        for h in headings {
            let _ = write!(prompt, "{}: {} {}", h.line, "#".repeat(h.level as usize), h.title);
            if let Some(page) = h.page {
                let _ = write!(prompt, " (p. {})", page);
            }
            prompt.push('\n');
        }

        if !unresolved.is_empty() {
            prompt.push_str("\nUnresolved contents entries:\n");
            for entry in unresolved {
                let _ = write!(prompt, "- {}", entry.title);
                if let Some(page) = entry.expected_page {
                    let _ = write!(prompt, " (expected near p. {})", page);
                }
                prompt.push('\n');
            }
        }
        prompt
    }

    /// Prompt used to verify connectivity.
    pub fn connectivity_check() -> &'static str {
        "Say 'hello' and nothing else."
    }
}
