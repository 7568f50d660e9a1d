#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod ast;
pub mod cache;
pub mod chunk;
pub mod error;
pub mod execution;
pub mod graph;
mod linker;
mod loader;
pub mod module;
pub mod options;
pub mod parse;
pub mod plugin;
mod treeshake;
pub mod warning;

pub use cache::{BuildCache, ModuleRecord};
pub use chunk::{Chunk, ChunkGraph, ChunkId, ChunkImport, ChunkSource};
pub use error::{codes, BuildError, BuildResult};
pub use graph::Graph;
pub use module::{ExternalModule, Module, ModuleIdx, ModuleRef, ResolvedId};
pub use options::{
    EntryPoint, ExternalOption, InputOptions, ModuleContext, PureExternalModules,
    TreeshakeOptions,
};
pub use parse::{parse_module, ParseError, ParserOptions};
pub use plugin::{
    EmittedAsset, HookFuture, HookResult, Plugin, PluginContext, PluginDriver, PluginError,
    Resolution, SourceDescription,
};
pub use warning::{Warning, WarningHandler};
