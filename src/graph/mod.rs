// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Subject graph construction.
//!
//! # Overview
//!
//! ```text
//! Config rules ──► CapabilityRegistry ──┐
//!                                       ├──► GraphBuilder::build ──► SubjectDag
//! SubjectData (one subject's inputs) ───┘
//! ```
//!
//! A **capability** is a named step (`anat_reference`, `pet_hmc`, ...). Several
//! **rules** may offer it; for each subject the builder picks the
//! highest-priority rule whose requirements hold, so a subject without a T1w
//! image silently gets the T2w variant instead. Rules with `foreach` expand to
//! one node per file of that modality, and their outputs fan in to any
//! singleton consumer.
//!
//! Graphs of different subjects share nothing.

mod builder;
mod dag;
mod node;
mod registry;
mod rules;

pub use builder::GraphBuilder;
pub use dag::SubjectDag;
pub use node::{NodeInput, NodeSpec, NodeState, OutputRef};
pub use registry::{
    builtin_builder_names, BuildContext, CapabilityEntry, CapabilityRegistry, MemoryEstimate,
    NodeBuilderFn, MEM_PROFILE_PARAM,
};
