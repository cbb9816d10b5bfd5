//! Static analyses over JVM method bodies, written for bytecode instrumentation
//! pipelines that must attach shadow metadata to computed values.
//!
//! The crate is split into two halves:
//!
//!   - [`jvm`] models the slice of the class-file world the analyses need:
//!     type descriptors, validated names, and a condensed instruction set with
//!     label-based branch targets.
//!
//!   - [`analysis`] contains the analyses themselves: control-flow graph
//!     construction with a dual reverse-postorder numbering (the ordering
//!     prerequisite for the dominator computation performed downstream), and
//!     the abstract-interpretation type rules used to decide which computed
//!     values need a shadow.
//!
//! Everything here is in-process, single-threaded and deterministic: analyzing
//! the same method body twice produces identical numberings and identical
//! lattice values.

pub mod analysis;
pub mod jvm;
pub mod util;
