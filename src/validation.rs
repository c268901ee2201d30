//! Validation tests for the whole codec.
//!
//! These tests verify:
//! 1. **Round-trip correctness** across every stage composition and a
//!    spread of window sizes
//! 2. **Boundary conditions** - empty, single-byte, run-heavy and
//!    incompressible inputs
//! 3. **Determinism** - identical inputs produce identical containers
//! 4. **Sizing** - output respects `estimate_compress_size`
//! 5. **Randomised properties** - proptest round trips
