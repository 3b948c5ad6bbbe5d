//! Prompt module for LLM-based operations.
//!
//! This module provides prompt templates for the language-model stages.

pub mod affiliations;

pub use affiliations::*;
