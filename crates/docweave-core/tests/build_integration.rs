//! Integration tests building documentation for Python package trees

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use docweave_core::doc::{Member, Reference, Resolver};
use docweave_core::{build, build_all, BuildOutput, Config, Error, LoadError, Session, WarningKind};

fn write_tree(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (path, content) in files {
        let path = dir.path().join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    dir
}

fn config_for(dir: &Path) -> Config {
    let mut config = Config::default();
    config.build.search_paths = vec![dir.to_path_buf()];
    config
}

fn build_tree(files: &[(&str, &str)], spec: &str) -> BuildOutput {
    let dir = write_tree(files);
    build(spec, &config_for(dir.path())).unwrap()
}

#[test]
fn test_ancestors_and_descendants() {
    let output = build_tree(&[("demo.py", "class Foo:\n    pass\n\nclass Bar(Foo):\n    pass\n")], "demo");
    let module = output.documentation.module("demo").unwrap();

    let bar = module.get("Bar").unwrap().as_class().unwrap();
    let ancestors: Vec<&str> = bar.ancestor_names().collect();
    assert_eq!(ancestors, vec!["demo.Foo"]);

    let foo = module.get("Foo").unwrap().as_class().unwrap();
    assert_eq!(foo.descendants, vec!["demo.Bar".to_string()]);
    assert!(output.warnings.is_empty());
}

#[test]
fn test_variable_docstring_follows_assignment() {
    let output = build_tree(&[("demo.py", "X = 1\n\"\"\"the answer\"\"\"\n")], "demo");
    let module = output.documentation.module("demo").unwrap();
    let Some(Member::Variable(x)) = module.get("X") else {
        panic!("X should be a variable");
    };
    assert_eq!(x.info.docstring.text, "the answer");
    assert_eq!(x.default.as_deref(), Some("1"));
}

#[test]
fn test_see_also_resolves_to_local_anchor() {
    let output = build_tree(
        &[(
            "demo.py",
            "def other_func():\n    pass\n\ndef f():\n    \"\"\"See also: other_func\"\"\"\n",
        )],
        "demo",
    );
    let docs = &output.documentation;
    let config = Config::default();
    let resolver = Resolver::new(docs, &config.links);

    let expected = Reference::Local {
        fullname: "demo.other_func".to_string(),
        anchor: "other_func".to_string(),
    };
    assert_eq!(resolver.resolve_reference("other_func", "demo"), expected);

    let text = &docs.module("demo").unwrap().get("f").unwrap().docstring().text;
    let spans = resolver.references_in(text, "demo", "f");
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].identifier, "other_func");
    assert_eq!(spans[0].reference, expected);
}

#[test]
fn test_docstring_inherited_from_nearest_ancestor() {
    let source = "\
class A:
    def f(self):
        \"\"\"A much longer docstring from the farthest ancestor.\"\"\"

class B(A):
    def f(self):
        \"\"\"Near.\"\"\"

class C(B):
    def f(self):
        pass
";
    let output = build_tree(&[("demo.py", source)], "demo");
    let module = output.documentation.module("demo").unwrap();
    let f = module.find("C.f").unwrap();
    assert_eq!(f.docstring().text, "Near.");
    assert_eq!(f.info().inherited_from.as_deref(), Some("demo.B.f"));

    let c = module.get("C").unwrap().as_class().unwrap();
    let ancestors: Vec<&str> = c.ancestor_names().collect();
    assert_eq!(ancestors, vec!["demo.B", "demo.A"]);
}

#[test]
fn test_inherited_members_are_grouped_by_ancestor() {
    let output = build_tree(
        &[
            ("pkg/__init__.py", ""),
            ("pkg/base.py", "class Base:\n    limit = 3\n    def run(self):\n        \"\"\"Run it.\"\"\"\n    def _internal(self):\n        pass\n"),
            ("pkg/child.py", "from pkg.base import Base\n\nclass Child(Base):\n    def run(self):\n        pass\n"),
        ],
        "pkg",
    );
    let module = output.documentation.module("pkg.child").unwrap();
    let child = module.get("Child").unwrap().as_class().unwrap();
    assert_eq!(child.inherited.get("pkg.base.Base"), Some(&vec!["limit".to_string()]));
    let run = child.members.get("run").unwrap();
    assert_eq!(run.docstring().text, "Run it.");
    assert_eq!(run.info().inherited_from.as_deref(), Some("pkg.base.Base.run"));
}

#[test]
fn test_rebuilds_are_deterministic() {
    let files = [
        ("pkg/__init__.py", "\"\"\"Package.\"\"\"\nfrom .core import Engine\n__all__ = ['Engine', 'core']\n"),
        ("pkg/core.py", "class Engine:\n    \"\"\"Runs.\"\"\"\n    speed: int = 3\n    \"\"\"How fast.\"\"\"\n\ndef helper():\n    pass\n"),
    ];
    let dir = write_tree(&files);
    let config = config_for(dir.path());
    let first = build("pkg", &config).unwrap();
    let second = build("pkg", &config).unwrap();
    assert_eq!(first.documentation, second.documentation);
    assert_eq!(
        serde_json::to_string(&first.documentation).unwrap(),
        serde_json::to_string(&second.documentation).unwrap()
    );
    let names: Vec<&str> = first.documentation.modules().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["pkg", "pkg.core"]);
}

#[test]
fn test_underscore_names_need_all_to_be_public() {
    let hidden = build_tree(&[("demo.py", "def _hidden():\n    pass\n\ndef shown():\n    pass\n")], "demo");
    let module = hidden.documentation.module("demo").unwrap();
    assert!(module.get("_hidden").is_none());
    assert!(module.get("shown").is_some());

    let listed = build_tree(
        &[("demo.py", "__all__ = ['_hidden']\n\ndef _hidden():\n    pass\n\ndef shown():\n    pass\n")],
        "demo",
    );
    let module = listed.documentation.module("demo").unwrap();
    assert!(module.get("_hidden").unwrap().is_public());
    assert!(module.get("shown").is_none());
}

#[test]
fn test_private_members_with_include_private() {
    let dir = write_tree(&[("demo.py", "def _hidden():\n    pass\n\ndef marked():\n    \"\"\"Internal. @private\"\"\"\n")]);
    let mut config = config_for(dir.path());
    config.build.include_private = true;
    let output = build("demo", &config).unwrap();
    let module = output.documentation.module("demo").unwrap();
    assert!(!module.get("_hidden").unwrap().is_public());
    let marked = module.get("marked").unwrap();
    assert!(!marked.is_public());
    assert_eq!(marked.docstring().text, "Internal.");
}

#[test]
fn test_circular_submodules_get_a_placeholder() {
    let output = build_tree(
        &[
            ("pkg/__init__.py", "\"\"\"Root.\"\"\"\nfrom . import sub\n"),
            ("pkg/sub.py", "\"\"\"Child.\"\"\"\nimport pkg as parent\n__all__ = ['parent']\n"),
        ],
        "pkg",
    );
    let docs = &output.documentation;
    assert_eq!(docs.modules.len(), 2);

    let Some(Member::Submodule(sub)) = docs.module("pkg").unwrap().get("sub") else {
        panic!("sub should be a submodule");
    };
    assert!(!sub.placeholder);
    assert_eq!(sub.info.docstring.text, "Child.");

    let Some(Member::Submodule(parent)) = docs.module("pkg.sub").unwrap().get("parent") else {
        panic!("parent should be a submodule");
    };
    assert!(parent.placeholder);
    assert_eq!(parent.info.fullname, "pkg");
    assert_eq!(parent.info.docstring.text, "Root.");
}

#[test]
fn test_ast_docstring_beats_reflection() {
    let dump = r#"{
        "name": "dumped",
        "source": "X = 1\n\"\"\"From the source.\"\"\"\nY = 2\n",
        "members": [
            {"name": "X", "lines": [1, 1], "value": {"kind": "variable", "value": {"text": "1"}, "docstring": "From reflection."}},
            {"name": "Y", "lines": [3, 3], "value": {"kind": "variable", "value": {"text": "2"}, "docstring": "Only reflection."}}
        ]
    }"#;
    let dir = write_tree(&[("dumped.json", dump)]);
    let spec = dir.path().join("dumped.json");
    let output = build(spec.to_str().unwrap(), &Config::default()).unwrap();
    let module = output.documentation.module("dumped").unwrap();
    assert_eq!(module.get("X").unwrap().docstring().text, "From the source.");
    assert_eq!(module.get("Y").unwrap().docstring().text, "Only reflection.");
    assert!(module.path.is_none());
}

#[test]
fn test_reexported_object_keeps_its_origin() {
    let output = build_tree(
        &[
            ("pkg/__init__.py", "from pkg._impl import helper\n__all__ = ['helper']\n"),
            ("pkg/_impl.py", "def helper(x: int = 1) -> str:\n    \"\"\"Help.\"\"\"\n"),
        ],
        "pkg",
    );
    let module = output.documentation.module("pkg").unwrap();
    let Some(Member::Function(helper)) = module.get("helper") else {
        panic!("helper should be a function");
    };
    assert_eq!(helper.info.fullname, "pkg.helper");
    assert_eq!(helper.info.taken_from.as_deref(), Some("pkg._impl.helper"));
    assert_eq!(helper.signature(), "(x: int = 1) -> str");
}

#[test]
fn test_syntax_errors_degrade_to_warnings() {
    let output = build_tree(&[("demo.py", "X = 1\n\ndef broken(:\n    pass\n")], "demo");
    assert!(output.documentation.module("demo").is_some());
    assert!(output.warnings.iter().any(|w| w.kind == WarningKind::Parse));
}

#[test]
fn test_flavor_from_docformat() {
    let source = "__docformat__ = 'numpy'\n\ndef f(x):\n    \"\"\"Sum.\n\n    Parameters\n    ----------\n    x : int\n        The value.\n    \"\"\"\n";
    let output = build_tree(&[("demo.py", source)], "demo");
    let module = output.documentation.module("demo").unwrap();
    let f = module.get("f").unwrap();
    assert!(f.docstring().text.contains("###### Parameters"));
    assert!(f.docstring().text.contains("**x** (int)"));
}

#[test]
fn test_build_all_isolates_failures() {
    let dir = write_tree(&[("good.py", "\"\"\"Fine.\"\"\"\n")]);
    let config = config_for(dir.path());
    let results = build_all(&["good", "missing_module"], &config);
    assert_eq!(results.len(), 2);
    let good = results[0].as_ref().unwrap();
    assert_eq!(good.documentation.module("good").unwrap().docstring.text, "Fine.");
    assert!(matches!(&results[1], Err(Error::Load(LoadError::NotFound(name))) if name == "missing_module"));
}

#[test]
fn test_build_specs_with_exclusions() {
    let dir = write_tree(&[
        ("pkg/__init__.py", ""),
        ("pkg/a.py", ""),
        ("pkg/b.py", ""),
        ("pkg/_private.py", ""),
    ]);
    let mut session = Session::new(config_for(dir.path())).unwrap();
    let docs = session.build_specs(&["pkg", "!pkg.b"]).unwrap();
    let names: Vec<&str> = docs.modules().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["pkg", "pkg.a"]);
    let root = docs.module("pkg").unwrap();
    assert!(root.get("a").is_some());
    assert!(root.get("b").is_none());
    assert!(session.diagnostics().is_empty());
}

#[test]
fn test_generators_keep_variable_docstrings() {
    let source = "X = 1\n\"\"\"the answer\"\"\"\n\ndef gen():\n    yield\n\nclass Pool:\n    def __init__(self):\n        self.size = 4\n        \"\"\"Workers.\"\"\"\n\n    def drain(self):\n        yield from self.items\n";
    let output = build_tree(&[("demo.py", source)], "demo");
    let module = output.documentation.module("demo").unwrap();
    assert_eq!(module.get("X").unwrap().docstring().text, "the answer");
    assert_eq!(module.find("Pool.size").unwrap().docstring().text, "Workers.");
    assert!(output.warnings.is_empty());
}

#[test]
fn test_byte_order_mark_is_ignored() {
    let output = build_tree(
        &[("demo.py", "\u{feff}\"\"\"Module doc.\"\"\"\nX = 1\n\"\"\"the answer\"\"\"\n")],
        "demo",
    );
    let module = output.documentation.module("demo").unwrap();
    assert_eq!(module.docstring.text, "Module doc.");
    assert_eq!(module.get("X").unwrap().docstring().text, "the answer");
    assert!(output.warnings.is_empty());
}

#[test]
fn test_class_shadowing_its_imported_base() {
    let output = build_tree(
        &[
            ("pkg/__init__.py", ""),
            ("pkg/base.py", "class Foo:\n    def run(self):\n        \"\"\"Run it.\"\"\"\n"),
            ("pkg/mod.py", "from pkg.base import Foo\n\nclass Foo(Foo):\n    def run(self):\n        pass\n"),
        ],
        "pkg",
    );
    let module = output.documentation.module("pkg.mod").unwrap();
    let foo = module.get("Foo").unwrap().as_class().unwrap();
    let ancestors: Vec<&str> = foo.ancestor_names().collect();
    assert_eq!(ancestors, vec!["pkg.base.Foo"]);
    let run = module.find("Foo.run").unwrap();
    assert_eq!(run.docstring().text, "Run it.");
    assert_eq!(run.info().inherited_from.as_deref(), Some("pkg.base.Foo.run"));
    assert!(!output.warnings.iter().any(|w| w.kind == WarningKind::Mro));
}

#[test]
fn test_type_checking_names_are_not_members() {
    let source = "from typing import TYPE_CHECKING\n\nif TYPE_CHECKING:\n    Alias: TypeAlias = int\n    \"\"\"Checker only.\"\"\"\n\nvalue = 1\n";
    let output = build_tree(&[("demo.py", source)], "demo");
    let module = output.documentation.module("demo").unwrap();
    assert!(module.get("Alias").is_none());
    assert!(module.get("value").is_some());
}

#[test]
fn test_stub_package_annotates_a_dump() {
    let dump = r#"{
        "name": "native",
        "members": [
            {"name": "compress", "value": {"kind": "function", "docstring": "Compress data.", "params": [
                {"name": "data", "kind": "positional_or_keyword"}
            ]}}
        ]
    }"#;
    let dir = write_tree(&[
        ("native.json", dump),
        ("native-stubs/__init__.pyi", "def compress(data: bytes, /) -> bytes: ...\n"),
    ]);
    let spec = dir.path().join("native.json");
    let output = build(spec.to_str().unwrap(), &config_for(dir.path())).unwrap();
    let module = output.documentation.module("native").unwrap();
    let Some(Member::Function(compress)) = module.get("compress") else {
        panic!("compress should be a function");
    };
    assert_eq!(compress.signature(), "(data: bytes, /) -> bytes");
    assert_eq!(compress.info.docstring.text, "Compress data.");
}
