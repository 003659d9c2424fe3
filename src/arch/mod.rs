//! Architecture specific definitions
//!
//! The transformation engine is machine-agnostic except where the ELF
//! specification delegates meaning to the processor supplement. The only such
//! delegation it interprets is the reserved symbol section-index range.

pub mod hexagon;
