//! Shared test fixtures: an in-memory module source backed by the plugin
//! hooks, mirroring how embedders provide virtual modules.

use std::sync::{Arc, Mutex};

use rustc_hash::FxHashMap;

use bramble_core::plugin::{HookFuture, Plugin, PluginContext, Resolution, SourceDescription};
use bramble_core::{BuildResult, EntryPoint, Graph, InputOptions};
use bramble_util::relative_id;

/// Plugin serving modules from an in-memory map. Records which ids were
/// loaded and transformed so tests can assert on pipeline behavior.
pub struct VirtualFs {
    files: FxHashMap<String, String>,
    pub loads: Arc<Mutex<Vec<String>>>,
    pub transforms: Arc<Mutex<Vec<String>>>,
}

impl VirtualFs {
    pub fn new(files: &[(&str, &str)]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(id, code)| ((*id).to_string(), (*code).to_string()))
                .collect(),
            loads: Arc::new(Mutex::new(Vec::new())),
            transforms: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn resolve(&self, source: &str, importer: Option<&str>) -> Option<String> {
        if self.files.contains_key(source) {
            return Some(source.to_string());
        }
        let importer = importer?;
        let joined = relative_id(source, importer);
        self.files.contains_key(&joined).then_some(joined)
    }
}

impl Plugin for VirtualFs {
    fn name(&self) -> &str {
        "virtual-fs"
    }

    fn resolve_id<'a>(
        &'a self,
        source: &'a str,
        importer: Option<&'a str>,
        _ctx: &'a PluginContext,
    ) -> HookFuture<'a, Resolution> {
        Box::pin(async move {
            Ok(match self.resolve(source, importer) {
                Some(id) => Resolution::Resolved(id),
                None => Resolution::Unhandled,
            })
        })
    }

    fn load<'a>(
        &'a self,
        id: &'a str,
        _ctx: &'a PluginContext,
    ) -> HookFuture<'a, Option<SourceDescription>> {
        Box::pin(async move {
            self.loads.lock().unwrap().push(id.to_string());
            Ok(self.files.get(id).map(SourceDescription::code))
        })
    }

    fn transform<'a>(
        &'a self,
        _code: &'a str,
        id: &'a str,
        _ctx: &'a PluginContext,
    ) -> HookFuture<'a, Option<SourceDescription>> {
        Box::pin(async move {
            self.transforms.lock().unwrap().push(id.to_string());
            Ok(None)
        })
    }
}

/// Build a graph over virtual files. Returns the graph (with whatever state
/// it reached) and the build result.
pub async fn build(
    files: &[(&str, &str)],
    inputs: &[&str],
    configure: impl FnOnce(&mut InputOptions),
) -> (Graph, BuildResult<()>) {
    build_with_plugins(files, inputs, configure, Vec::new()).await
}

/// Like [`build`], with extra plugins registered after the virtual source.
pub async fn build_with_plugins(
    files: &[(&str, &str)],
    inputs: &[&str],
    configure: impl FnOnce(&mut InputOptions),
    extra: Vec<Box<dyn Plugin>>,
) -> (Graph, BuildResult<()>) {
    let mut options = InputOptions {
        input: inputs.iter().map(|input| EntryPoint::new(*input)).collect(),
        ..InputOptions::default()
    };
    configure(&mut options);

    let mut plugins: Vec<Box<dyn Plugin>> = vec![Box::new(VirtualFs::new(files))];
    plugins.extend(extra);

    let mut graph = Graph::new(options, plugins);
    let result = graph.build().await;
    (graph, result)
}

/// Ids of the statements a module kept, by index.
pub fn included_stmts(graph: &Graph, id: &str) -> Vec<usize> {
    graph
        .module(id)
        .expect("module should exist")
        .stmt_info
        .iter()
        .enumerate()
        .filter_map(|(i, info)| info.included.then_some(i))
        .collect()
}
