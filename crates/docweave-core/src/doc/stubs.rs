//! Type information from `.pyi` stubs
//!
//! A stub found next to a module, or in a `<package>-stubs` distribution, is
//! parsed and reflected like source. Its signatures and annotations replace
//! the module's; its docstrings win where they are not empty.

use indexmap::IndexMap;

use crate::diagnostics::WarningKind;
use crate::docstring::{Docstring, Flavor};
use crate::parser::Parser;
use crate::reflect::{reflect_source, ReflectedFunction, ReflectedMember, ReflectedValue, ValueRepr};

use super::extractor::{AstExtractor, AstInfo};
use super::hierarchy::find_reflected;
use super::session::Session;
use super::types::{DocInfo, Function, Member, Module, Parameter};

/// A parsed stub file
struct Stub {
    members: Vec<ReflectedMember>,
    docstring: Option<String>,
    ast: AstInfo,
}

impl Session {
    /// Patch `module` with its type stub, if it has one
    pub(crate) fn apply_stub(&mut self, module: &mut Module) {
        let Some(stub) = self.load_stub(&module.name, module.is_package) else {
            return;
        };
        tracing::debug!(target: "docweave", module = %module.name, "applying type stub");
        set_docstring(&mut module.docstring, stub.docstring.as_deref(), module.flavor);
        let mut mismatches = Vec::new();
        let patch = Patch {
            stub: &stub,
            flavor: module.flavor,
        };
        patch.members(&mut module.members, &stub.members, "", &mut mismatches);
        for message in mismatches {
            self.diagnostics_mut().warn(WarningKind::Stub, module.name.as_str(), message);
        }
    }

    fn load_stub(&mut self, name: &str, is_package: bool) -> Option<Stub> {
        let path = self.loader().find_stub(name)?;
        let source = match self.loader().read_stub(name, &path) {
            Ok(source) => source,
            Err(e) => {
                self.diagnostics_mut().warn(WarningKind::Stub, name, e.to_string());
                return None;
            }
        };
        let ast = match Parser::parse_module(&source) {
            Ok(ast) => ast,
            Err(errors) => {
                let first = errors.first().map(ToString::to_string).unwrap_or_default();
                self.diagnostics_mut().warn(
                    WarningKind::Stub,
                    name,
                    format!("type stub {} does not parse: {first}", path.display()),
                );
                return None;
            }
        };
        let reflected = reflect_source(name, &source, &ast, is_package);
        Some(Stub {
            members: reflected.members,
            docstring: reflected.docstring,
            ast: AstExtractor::from_module(&source, &ast),
        })
    }
}

struct Patch<'a> {
    stub: &'a Stub,
    flavor: Option<Flavor>,
}

impl Patch<'_> {
    fn members(
        &self,
        members: &mut IndexMap<String, Member>,
        stub_members: &[ReflectedMember],
        scope: &str,
        mismatches: &mut Vec<String>,
    ) {
        let ast = &self.stub.ast;
        for (name, member) in members.iter_mut() {
            let found = find_reflected(stub_members, name).map(|m| &m.value);
            match (member, found) {
                (Member::Submodule(_), _)
                | (_, Some(ReflectedValue::Import { .. } | ReflectedValue::Module { .. })) => {}
                (Member::Variable(variable), None | Some(ReflectedValue::Variable { .. })) => {
                    let (annotation, docstring) = match found {
                        Some(ReflectedValue::Variable {
                            annotation,
                            docstring,
                            ..
                        }) => (annotation.as_deref(), docstring.as_deref()),
                        _ => (None, None),
                    };
                    let annotation = annotation.or_else(|| ast.annotation(scope, name).flatten());
                    if let Some(annotation) = annotation {
                        variable.annotation = Some(annotation.to_string());
                    }
                    let docstring = ast.var_docstring(scope, name).or(docstring);
                    self.docstring(&mut variable.info, docstring);
                }
                (Member::Variable(variable), Some(ReflectedValue::Property(getter))) => {
                    if let Some(returns) = &getter.returns {
                        variable.annotation = Some(returns.clone());
                    }
                    self.docstring(&mut variable.info, getter.docstring.as_deref());
                }
                (Member::Function(function), Some(ReflectedValue::Function(stub))) => {
                    let docstring = stub.docstring.as_deref().or_else(|| ast.func_docstring(scope, name));
                    patch_signature(function, stub);
                    self.docstring(&mut function.info, docstring);
                }
                (Member::Class(class), Some(ReflectedValue::Class(stub))) => {
                    self.docstring(&mut class.info, stub.docstring.as_deref());
                    let inner = if scope.is_empty() {
                        name.clone()
                    } else {
                        format!("{scope}.{name}")
                    };
                    self.members(&mut class.members, &stub.members, &inner, mismatches);
                }
                (_, None) => {}
                (member, Some(value)) => mismatches.push(format!(
                    "type stub defines {} as a {}, but the module has a {}",
                    member.info().fullname,
                    value_kind(value),
                    member_kind(member)
                )),
            }
        }
    }

    fn docstring(&self, info: &mut DocInfo, raw: Option<&str>) {
        if set_docstring(&mut info.docstring, raw, self.flavor) {
            info.inherited_from = None;
        }
    }
}

/// Replace `docstring` unless `raw` is blank; true if replaced
fn set_docstring(docstring: &mut Docstring, raw: Option<&str>, flavor: Option<Flavor>) -> bool {
    match raw.filter(|raw| !raw.trim().is_empty()) {
        Some(raw) => {
            *docstring = Docstring::new(raw, flavor);
            true
        }
        None => false,
    }
}

fn patch_signature(function: &mut Function, stub: &ReflectedFunction) {
    function.params = stub
        .params
        .iter()
        .map(|param| Parameter {
            name: param.name.clone(),
            kind: param.kind,
            annotation: param.annotation.clone(),
            default: match &param.default {
                Some(ValueRepr::Text(text)) => Some(text.clone()),
                Some(ValueRepr::Unrepresentable(_)) | None => None,
            },
        })
        .collect();
    function.returns.clone_from(&stub.returns);
}

fn member_kind(member: &Member) -> &'static str {
    match member {
        Member::Variable(_) => "variable",
        Member::Function(_) => "function",
        Member::Class(_) => "class",
        Member::Submodule(_) => "module",
    }
}

fn value_kind(value: &ReflectedValue) -> &'static str {
    match value {
        ReflectedValue::Variable { .. } | ReflectedValue::Property(_) => "variable",
        ReflectedValue::Function(_) => "function",
        ReflectedValue::Class(_) => "class",
        ReflectedValue::Module { .. } | ReflectedValue::Import { .. } => "module",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::loader::ModuleLoader;
    use crate::doc::types::Variable;
    use std::fs;
    use tempfile::TempDir;

    fn session(files: &[(&str, &str)]) -> (TempDir, Session) {
        let dir = TempDir::new().unwrap();
        for (path, content) in files {
            let path = dir.path().join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let loader = ModuleLoader::new(dir.path()).with_search_paths(vec![dir.path().to_path_buf()]);
        let session = Session::with_loader(Config::default(), loader).unwrap();
        (dir, session)
    }

    #[test]
    fn test_stub_signatures_and_annotations_win() {
        let (_dir, mut session) = session(&[
            (
                "native.py",
                "LIMIT = 3\n\"\"\"How many.\"\"\"\n\ndef scale(x, factor=2):\n    \"\"\"Scale x.\"\"\"\n\nclass Engine:\n    def run(self, speed):\n        pass\n",
            ),
            (
                "native.pyi",
                "LIMIT: int\n\ndef scale(x: float, factor: int = 2) -> float: ...\n\nclass Engine:\n    def run(self, speed: int) -> None:\n        \"\"\"Run at speed.\"\"\"\n",
            ),
        ]);
        let docs = session.build("native").unwrap();
        let module = docs.module("native").unwrap();

        let Some(Member::Variable(Variable { annotation, info, .. })) = module.get("LIMIT") else {
            panic!("LIMIT should be a variable");
        };
        assert_eq!(annotation.as_deref(), Some("int"));
        assert_eq!(info.docstring.text, "How many.");

        let Some(Member::Function(scale)) = module.get("scale") else {
            panic!("scale should be a function");
        };
        assert_eq!(scale.signature(), "(x: float, factor: int = 2) -> float");
        assert_eq!(scale.info.docstring.text, "Scale x.");

        let run = module.find("Engine.run").unwrap();
        assert_eq!(run.docstring().text, "Run at speed.");
        let Member::Function(run) = run else {
            panic!("run should be a function");
        };
        assert_eq!(run.signature(), "(speed: int) -> None");
        assert!(session.diagnostics().is_empty());
    }

    #[test]
    fn test_stub_kind_mismatch_is_reported() {
        let (_dir, mut session) = session(&[
            ("demo.py", "def thing():\n    pass\n"),
            ("demo.pyi", "thing: int\nclass thing: ...\n"),
        ]);
        let docs = session.build("demo").unwrap();
        assert!(matches!(docs.module("demo").unwrap().get("thing"), Some(Member::Function(_))));
        assert_eq!(session.diagnostics().count(WarningKind::Stub), 1);
    }

    #[test]
    fn test_unparsable_stub_is_skipped() {
        let (_dir, mut session) = session(&[
            ("demo.py", "def f(x):\n    pass\n"),
            ("demo.pyi", "def f(x: int -> None: ...\n"),
        ]);
        let docs = session.build("demo").unwrap();
        let Some(Member::Function(f)) = docs.module("demo").unwrap().get("f") else {
            panic!("f should be a function");
        };
        assert_eq!(f.signature(), "(x)");
        assert_eq!(session.diagnostics().count(WarningKind::Stub), 1);
    }
}
