//! # condo-rag
//!
//! Tenant-isolated document indexing and question answering for
//! condominium regulations.
//!
//! Every building (`tenant_id`, `sub_tenant_id`) gets its own vector
//! namespace. Documents are classified, split along their legal structure,
//! fingerprinted and upserted without duplicates; questions are classified,
//! expanded, searched per namespace with a similarity threshold, and
//! answered by a chat model from the retrieved context only.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────────────┐   ┌────────────┐
//! │ PDF / TXT  │──▶│ condo-rag-core        │──▶│  Pinecone  │
//! │  extract   │   │ classify·chunk·upsert │   │ namespaces │
//! └────────────┘   └──────────┬───────────┘   └─────┬──────┘
//!                             │ retrieve·synthesize  │
//!                             ▼                      │
//!                      ┌─────────────┐        ┌──────┴─────┐
//!                      │ OpenAI chat │        │ SQLite     │
//!                      │ (fallbacks) │        │ audit      │
//!                      └─────────────┘        └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! crag init                                         # write config/crag.toml
//! crag ingest regimento.pdf --tenant 12 --sub 3     # index a building document
//! crag kb-add lei-4591.txt --title "Condo Law"      # index general reference
//! crag ask "Can I have a dog?" --tenant 12 --sub 3 --mode hybrid
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`http`] | Shared client construction and retry policy |
//! | [`embedding`] | OpenAI, Ollama, fastembed and hashing embedders |
//! | [`pinecone`] | Pinecone vector store |
//! | [`generation`] | Chat generation with a model fallback chain |
//! | [`extract`] | PDF and text extraction |
//! | [`audit`] | SQLite audit trail |
//! | [`backends`] | Backend construction and pipeline wiring |
//! | [`ingest`] | `ingest`, `kb-add`, `delete`, `classify` commands |
//! | [`ask`] | `ask`, `history` commands |

pub mod ask;
pub mod audit;
pub mod backends;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod generation;
pub mod http;
pub mod ingest;
pub mod pinecone;
