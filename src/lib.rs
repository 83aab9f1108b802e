//! # DeskQA
//!
//! A document-grounded question answering service for internal office files.
//!
//! DeskQA ingests a flat directory of office documents (PDF, PowerPoint,
//! plain text, HWP, Excel), concatenates the extracted text into a single
//! corpus, and answers natural-language questions about it through a hosted
//! chat-completion model. Grounding is selected per query by either naive
//! truncation of the corpus or semantic top-k retrieval over embedded
//! chunks. Access is gated by a shared password.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌───────────────┐
//! │ Documents  │──▶│  Extractors  │──▶│    Corpus      │
//! │ pdf/pptx/… │   │ per format  │   │ (in memory)   │
//! └────────────┘   └─────────────┘   └──────┬────────┘
//!                                           │
//!                      ┌────────────────────┤
//!                      ▼                    ▼
//!                ┌───────────┐        ┌───────────┐
//!                │ truncate  │        │ semantic  │
//!                │  prefix   │        │  top-k    │
//!                └─────┬─────┘        └─────┬─────┘
//!                      └────────┬───────────┘
//!                               ▼
//!                    ┌────────────────────┐
//!                    │ prompt + synthesis │──▶ answer
//!                    └────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dqa corpus                    # build the corpus and report what got in
//! dqa ask "When does the office open?"
//! dqa chat                      # password-gated interactive session
//! dqa serve                     # password-gated HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | Per-format text extraction |
//! | [`biff`] | Legacy `.xls` workbook stream parsing |
//! | [`corpus`] | Corpus construction and the versioned corpus cache |
//! | [`chunk`] | Text chunking for semantic mode |
//! | [`embedding`] | Embedding API client and cosine similarity |
//! | [`index`] | In-memory vector index |
//! | [`retrieval`] | Truncation and semantic grounding selection |
//! | [`prompt`] | Prompt payload assembly |
//! | [`synthesis`] | Chat-completion API client |
//! | [`chat`] | The question-answer flow and terminal surfaces |
//! | [`server`] | Password-gated HTTP API |

pub mod biff;
pub mod chat;
pub mod chunk;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod extract;
pub mod index;
pub mod prompt;
pub mod retrieval;
pub mod server;
pub mod synthesis;
