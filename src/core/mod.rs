//=========================================================================
// Engine Core
//
// The scheduler's building blocks, exposed for embedding and extension.
//
// Responsibilities:
// - `thread_pool`: render thread, spinning workers, thread affinity
// - `event_queue`: kind-keyed receivers and the posted-event ring
// - `scene`: scene stack and phase-partitioned states
// - `engine_loop`: fixed-timestep accumulator and per-phase dispatch
// - `loop_control`: cross-thread stop/post handle
//
// Notes:
// Everything here is driven from a single loop thread. Application code
// normally goes through the `Engine` facade instead.
//
//=========================================================================

//=== Submodules ==========================================================
pub mod engine_loop;
pub mod event_queue;
pub mod loop_control;
pub mod module;
pub mod scene;
pub mod state;
pub mod thread_pool;

#[cfg(test)]
pub(crate) mod test_support;
