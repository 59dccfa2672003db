//=========================================================================
// Phase Engine — Library Root
//
// This crate defines the public API surface of the Phase Engine.
//
// Responsibilities:
// - Expose the composition root (`EngineBuilder` / `Engine`)
// - Expose the core scheduler pieces for engine-level extensibility
// - Provide one error type shared by every fallible operation
//
// Typical usage:
// ```no_run
// use phase_engine::prelude::*;
//
// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
// enum GameEvent { Quit }
// impl EventKind for GameEvent {}
//
// fn main() -> CoreResult<()> {
//     EngineBuilder::<GameEvent>::new().build()?.run()?;
//     Ok(())
// }
// ```
//
//=========================================================================

//--- Public Modules ------------------------------------------------------
//
// `core` contains the scheduler subsystems (thread pool, event queue,
// state manager, loop). Normal application code will mostly use the
// top-level `Engine` facade and the prelude.
//
pub mod core;
pub mod error;
pub mod prelude;

//--- Internal Modules ----------------------------------------------------
//
// `engine` defines the builder and the runtime facade.
//
mod engine;

//--- Public Exports ------------------------------------------------------

pub use engine::{Engine, EngineBuilder};
pub use error::{CoreError, CoreResult};
