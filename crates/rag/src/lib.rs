//! Retrieval-augmented generation pipeline for Crm.
//!
//! Chunking (C1), result fusion (C5), context packing (C6), the vector
//! store and embed/rerank gateways (C3, C2), and the RAG engine (C9) that
//! ties them together with the Model Router (C7).

pub mod chunker;
pub mod engine;
pub mod fusion;
pub mod gateway;
pub mod packer;

pub use chunker::Chunker;
pub use engine::{InputDocument, RagEngine};
pub use fusion::fuse;
pub use gateway::{DeterministicEmbedRerank, EmbedRerankGateway, InMemoryVectorStore, VectorStoreGateway};
pub use packer::ContextPacker;
