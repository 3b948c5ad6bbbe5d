//! Affiliation extraction prompt.
//!
//! The user message is the raw page text; only the system prompt is fixed.

/// System prompt for author affiliation extraction
pub const SYSTEM_PROMPT: &str = r#"You will be given a PDF as text. From the text, extract the author affiliations. Ignore any addresses or emails or similar information for the affiliations. An affiliation should only be something such as a university, a company, or a similar entity. Compile this information into a single python dictionary that maps from string to string. You should only respond back in the form of: {"<author as string>": "<affiliation as string>"} unless stated otherwise. If you find an author but no affiliation, then set the value for the author as the empty string: "". If there is no author/affiliation information in this context at all, then return: { }. Make sure the keys and values are always strings, really think carefully if your response matches the technical specifications. Make sure you only respond with a single dictionary."#;
