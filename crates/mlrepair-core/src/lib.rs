//! mlrepair core library
//!
//! Mask-and-infill repair of Keras-style model programs: mask one fragment at
//! a time, ask an infill model for replacements, filter the candidates
//! statically, build trainable artifacts and validate them with a trainer.
//! Each stage checkpoints per item so runs resume where they stopped.

pub mod artifact;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod fakes;
pub mod filter;
pub mod generator;
pub mod infill;
pub mod mask;
pub mod metrics;
pub mod obs;
pub mod pipeline;
pub mod preprocess;
pub mod program;
pub mod service;
pub mod telemetry;
pub mod validate;

pub use artifact::{ArtifactBuilder, CommandMaterializer, Materializer};
pub use checkpoint::{CheckpointKind, ItemCheckpoints};
pub use config::{RepairConfig, ServiceConfig, SnippetMode};
pub use error::{RepairError, Result};
pub use filter::{filter_candidates, is_bad_change, CandidateFilter, FilterReport, Rejection};
pub use generator::generate_candidates;
pub use infill::{HttpInfillService, InfillService};
pub use mask::{default_actions, mask_program, MaskAction};
pub use pipeline::{parse_ops, Op, Orchestrator, RunPaths, RunReport, Services};
pub use preprocess::format_programs;
pub use program::{Candidate, FilteredCandidate, MaskedProgram, SourceProgram, MASK_TOKEN};
pub use telemetry::{init_file_tracing, init_tracing};
pub use validate::worker::{run_shard, ShardSpec};
pub use validate::{validate_candidates, HttpTrainerService, TrainerService, ValidationResult};
