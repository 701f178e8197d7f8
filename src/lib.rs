//! # txt2kb
//!
//! Converts free-form text documents (operational logs, incident notes,
//! chat transcripts) into structured records for a personal knowledge base.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────┐   ┌───────────┐   ┌──────────┐   ┌──────────┐
//! │ connector  │──▶│  mask  │──▶│ classify  │──▶│  merge   │──▶│  render  │
//! │    fs      │   │        │──▶│ extract   │──▶│          │   │  md/json │
//! └────────────┘   └────────┘   └─────┬─────┘   └──────────┘   └──────────┘
//!                                     │ retry once, then rule-based
//!                                     ▼
//!                                ┌─────────┐
//!                                │   LLM   │
//!                                └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! txt2kb rules                         # show loaded rules
//! txt2kb mask raw/incident.txt         # preview redaction
//! txt2kb convert raw/ kb/              # convert a directory
//! txt2kb --llm convert raw/ kb/        # LLM-assisted extraction
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and rule files |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`mask`] | Sensitive-data masking |
//! | [`classify`] | Rule-based tags and categories |
//! | [`extract`] | Section extraction strategies and fallback |
//! | [`llm`] | LLM client abstraction |
//! | [`pipeline`] | Per-document orchestration |
//! | [`connector_fs`] | Filesystem document discovery |
//! | [`render`] | Markdown and JSON output |
//! | [`convert`] | Batch conversion |
//! | [`cancel`] | Ctrl-C cancellation of a batch |

pub mod cancel;
pub mod classify;
pub mod config;
pub mod connector_fs;
pub mod convert;
pub mod error;
pub mod extract;
pub mod inspect;
pub mod llm;
pub mod logging;
pub mod markers;
pub mod mask;
pub mod models;
pub mod pipeline;
pub mod render;
pub mod rules;
