//! End-to-end graph scenarios: chunk coloring, cycles, re-exports, dynamic
//! imports, and missing-export handling.

mod common;

use bramble_core::{codes, InputOptions, TreeshakeOptions};
use bramble_util::{entry_hash_seed, xor_hash, ENTRY_HASH_LEN};
use common::{build, included_stmts};

fn no_config(_: &mut InputOptions) {}

#[tokio::test]
async fn two_entries_with_pure_shared_module_yield_two_chunks() {
    let (graph, result) = build(
        &[
            ("/src/a.js", "import \"./shared.js\";\nexport const x = 1;"),
            ("/src/b.js", "import \"./shared.js\";\nexport const y = 2;"),
            ("/src/shared.js", "export const s = 1;"),
        ],
        &["/src/a.js", "/src/b.js"],
        no_config,
    )
    .await;
    result.unwrap();

    // The shared module is side-effect free and nothing uses its exports, so
    // its chunk is dropped entirely.
    let chunks = graph.chunks().chunks();
    assert_eq!(chunks.len(), 2);

    // Its color is still the XOR of both reaching entries.
    let mut expected = [0u8; ENTRY_HASH_LEN];
    xor_hash(&mut expected, &entry_hash_seed("/src/a.js"));
    xor_hash(&mut expected, &entry_hash_seed("/src/b.js"));
    let shared = graph.module("/src/shared.js").unwrap();
    assert_eq!(shared.entry_points_hash, expected);
    assert!(!shared.is_included());
}

#[tokio::test]
async fn two_entries_with_effectful_shared_module_yield_three_chunks() {
    let (graph, result) = build(
        &[
            ("/src/a.js", "import \"./shared.js\";\nexport const x = 1;"),
            ("/src/b.js", "import \"./shared.js\";\nexport const y = 2;"),
            ("/src/shared.js", "init();\nfunction init() { return 1; }"),
        ],
        &["/src/a.js", "/src/b.js"],
        no_config,
    )
    .await;
    result.unwrap();

    assert_eq!(graph.chunks().chunks().len(), 3);
    assert!(graph.module("/src/shared.js").unwrap().is_included());
}

#[tokio::test]
async fn static_cycle_is_ordered_and_reported_once() {
    let (graph, result) = build(
        &[
            (
                "/src/a.js",
                "import { b } from \"./b.js\";\nexport const a = b + 1;",
            ),
            (
                "/src/b.js",
                "import { a } from \"./a.js\";\nexport const b = 2;",
            ),
        ],
        &["/src/a.js"],
        no_config,
    )
    .await;
    result.unwrap();

    assert_eq!(
        graph.cycle_paths(),
        &[vec![
            "/src/a.js".to_string(),
            "/src/b.js".to_string(),
            "/src/a.js".to_string()
        ]]
    );
    let circular: Vec<_> = graph
        .warnings()
        .iter()
        .filter(|w| w.code == codes::CIRCULAR_DEPENDENCY)
        .collect();
    assert_eq!(circular.len(), 1);

    let ordered: Vec<&str> = graph.ordered_modules().map(|m| m.id.as_str()).collect();
    assert_eq!(ordered.len(), 2);
    assert!(ordered.contains(&"/src/a.js"));
    assert!(ordered.contains(&"/src/b.js"));
}

#[tokio::test]
async fn export_all_flattens_and_shakes_per_binding() {
    let (graph, result) = build(
        &[
            (
                "/src/main.js",
                "import { foo } from \"./m.js\";\nconsole.log(foo);",
            ),
            ("/src/m.js", "export * from \"./n.js\";"),
            ("/src/n.js", "export const foo = 1;\nexport const bar = 2;"),
        ],
        &["/src/main.js"],
        no_config,
    )
    .await;
    result.unwrap();

    let m = graph.module("/src/m.js").unwrap();
    assert_eq!(m.exports_all.get("foo").map(String::as_str), Some("/src/n.js"));
    assert_eq!(m.exports_all.get("bar").map(String::as_str), Some("/src/n.js"));

    // Only foo's declaration survives.
    assert_eq!(included_stmts(&graph, "/src/n.js"), vec![0]);
}

#[tokio::test]
async fn dynamic_import_becomes_its_own_chunk() {
    let (graph, result) = build(
        &[
            ("/src/main.js", "const p = import(\"./lazy.js\");\nexport { p };"),
            ("/src/lazy.js", "export const value = 1;"),
        ],
        &["/src/main.js"],
        no_config,
    )
    .await;
    result.unwrap();

    let dynamic: Vec<&str> = graph.dynamic_imports().map(|m| m.id.as_str()).collect();
    assert_eq!(dynamic, vec!["/src/lazy.js"]);
    assert_eq!(graph.dynamic_import_aliases(), &[Some("lazy".to_string())]);

    let chunks = graph.chunks().chunks();
    assert_eq!(chunks.len(), 2);
    let lazy = graph.module("/src/lazy.js").unwrap();
    let main = graph.module("/src/main.js").unwrap();
    assert_ne!(lazy.chunk, main.chunk);

    // The dynamic entry heads its chunk and exposes its namespace.
    let lazy_chunk = graph.chunks().chunk_for_module(&graph.modules, lazy.idx).unwrap();
    assert_eq!(lazy_chunk.entry_module, Some(lazy.idx));
    assert!(lazy_chunk.exports.iter().any(|(name, _)| name == "value"));
}

#[tokio::test]
async fn inline_dynamic_imports_collapses_to_one_chunk() {
    let (graph, result) = build(
        &[
            ("/src/main.js", "const p = import(\"./lazy.js\");\nexport { p };"),
            ("/src/lazy.js", "export const value = 1;"),
        ],
        &["/src/main.js"],
        |options| options.inline_dynamic_imports = true,
    )
    .await;
    result.unwrap();

    assert_eq!(graph.chunks().chunks().len(), 1);
    let lazy = graph.module("/src/lazy.js").unwrap();
    let main = graph.module("/src/main.js").unwrap();
    assert_eq!(lazy.chunk, main.chunk);

    // The target's public exports were still marked.
    assert_eq!(included_stmts(&graph, "/src/lazy.js"), vec![0]);
}

#[tokio::test]
async fn missing_export_is_fatal_without_shim() {
    let (_graph, result) = build(
        &[
            (
                "/src/main.js",
                "import { missing } from \"./m.js\";\nconsole.log(missing);",
            ),
            ("/src/m.js", "export const other = 1;"),
        ],
        &["/src/main.js"],
        no_config,
    )
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.code(), codes::MISSING_EXPORT);
    assert!(err.message().contains("missing"));
    assert!(err.message().contains("./m.js"));
}

#[tokio::test]
async fn missing_export_is_shimmed_when_configured() {
    let (graph, result) = build(
        &[
            (
                "/src/main.js",
                "import { missing } from \"./m.js\";\nconsole.log(missing);",
            ),
            ("/src/m.js", "export const other = 1;"),
        ],
        &["/src/main.js"],
        |options| options.shim_missing_exports = true,
    )
    .await;
    result.unwrap();
    assert!(graph.finished());
}

#[tokio::test]
async fn namespace_import_includes_all_exports() {
    let (graph, result) = build(
        &[
            (
                "/src/main.js",
                "import * as ns from \"./m.js\";\nconsole.log(ns);",
            ),
            ("/src/m.js", "export const a = 1;\nexport const b = 2;"),
        ],
        &["/src/main.js"],
        no_config,
    )
    .await;
    result.unwrap();

    assert_eq!(included_stmts(&graph, "/src/m.js"), vec![0, 1]);
}

#[tokio::test]
async fn mutually_importing_entries_share_a_chunk_and_get_facades() {
    let (graph, result) = build(
        &[
            (
                "/src/a.js",
                "import { b } from \"./b.js\";\nexport const a = 1;\nconsole.log(b);",
            ),
            (
                "/src/b.js",
                "import { a } from \"./a.js\";\nexport const b = 2;\nconsole.log(a);",
            ),
        ],
        &["/src/a.js", "/src/b.js"],
        no_config,
    )
    .await;
    result.unwrap();

    let a = graph.module("/src/a.js").unwrap();
    let b = graph.module("/src/b.js").unwrap();
    assert_eq!(a.entry_points_hash, b.entry_points_hash);
    assert_eq!(a.chunk, b.chunk);

    let facades: Vec<_> = graph
        .chunks()
        .chunks()
        .iter()
        .filter(|c| c.is_facade())
        .collect();
    assert_eq!(facades.len(), 2);
    for facade in facades {
        assert!(!facade.exports.is_empty());
        assert!(facade.modules.is_empty());
    }
}

#[tokio::test]
async fn preserve_modules_emits_one_chunk_per_module() {
    let (graph, result) = build(
        &[
            (
                "/src/main.js",
                "import { a } from \"./a.js\";\nexport const main = a;",
            ),
            ("/src/a.js", "import { b } from \"./b.js\";\nexport const a = b;"),
            ("/src/b.js", "export const b = 1;"),
        ],
        &["/src/main.js"],
        |options| options.preserve_modules = true,
    )
    .await;
    result.unwrap();

    let chunks = graph.chunks().chunks();
    assert_eq!(chunks.len(), 3);
    for chunk in chunks {
        assert_eq!(chunk.modules.len(), 1);
        assert!(chunk.entry_module.is_some());
    }
}

#[tokio::test]
async fn manual_chunks_override_entry_coloring() {
    let (graph, result) = build(
        &[
            (
                "/src/main.js",
                "import { util } from \"./util.js\";\nexport const main = util;",
            ),
            ("/src/util.js", "export const util = 1;"),
        ],
        &["/src/main.js"],
        |options| {
            options
                .manual_chunks
                .insert("vendor".to_string(), vec!["/src/util.js".to_string()]);
        },
    )
    .await;
    result.unwrap();

    let chunks = graph.chunks().chunks();
    assert_eq!(chunks.len(), 2);
    let vendor = chunks
        .iter()
        .find(|c| c.is_manual_chunk)
        .expect("manual chunk should exist");
    assert_eq!(vendor.name, "vendor");
    let util = graph.module("/src/util.js").unwrap();
    assert_eq!(util.chunk, Some(vendor.id));

    // The main chunk imports the binding from the vendor chunk.
    let main = graph.module("/src/main.js").unwrap();
    let main_chunk = graph.chunks().chunk_for_module(&graph.modules, main.idx).unwrap();
    assert!(main_chunk
        .imports
        .iter()
        .any(|import| import.source == bramble_core::ChunkSource::Chunk(vendor.id)));
}

#[tokio::test]
async fn property_read_side_effects_can_be_disabled() {
    let files = [
        (
            "/src/main.js",
            "import { config } from \"./config.js\";\nconfig.flag;\nexport const x = 1;",
        ),
        ("/src/config.js", "export const config = { flag: true };"),
    ];

    let (graph, result) = build(&files, &["/src/main.js"], no_config).await;
    result.unwrap();
    // Default policy: the bare property read may trigger a getter.
    assert!(included_stmts(&graph, "/src/main.js").contains(&1));

    let (graph, result) = build(&files, &["/src/main.js"], |options| {
        options.treeshake = Some(TreeshakeOptions {
            property_read_side_effects: false,
            ..TreeshakeOptions::default()
        });
    })
    .await;
    result.unwrap();
    assert!(!included_stmts(&graph, "/src/main.js").contains(&1));
}

#[tokio::test]
async fn treeshake_disabled_includes_everything() {
    let (graph, result) = build(
        &[
            (
                "/src/main.js",
                "import { used } from \"./m.js\";\nexport const x = used;",
            ),
            ("/src/m.js", "export const used = 1;\nexport const unused = 2;"),
        ],
        &["/src/main.js"],
        |options| options.treeshake = None,
    )
    .await;
    result.unwrap();

    assert_eq!(included_stmts(&graph, "/src/m.js"), vec![0, 1]);
}
