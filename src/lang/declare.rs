//! Declaration building: source types, their bases and members.
//!
//! Types are created in two passes. [`declare_types`] walks every tree and creates a
//! symbol per class (plus one submission class for script trees) without looking at
//! any type reference. [`complete_types`] then resolves base types and builds members,
//! when every type a signature can mention exists.

use std::{
    collections::HashSet,
    sync::{Arc, Weak},
};

use crate::{
    compilation::{Compilation, DeclarationContext, ImportDirective, SymbolLookup},
    diagnostics::{Diagnostic, Location},
    lang::{
        codes::MiniErrorCode,
        syntax::{
            child_of, children_of, declared_name, documentation, is, modifiers,
            qualified_name_text, type_syntax, SyntaxKind,
        },
    },
    options::CompilationOptions,
    symbols::{
        Accessibility, ArrayTypeSymbol, AssemblySymbol, FieldSymbol, MethodKind, MethodSymbol,
        NamedTypeBuilder, NamedTypeSymbol, SpecialType, Symbol, SyntaxReference, TypeKind,
        TypeSymbol,
    },
    syntax::{SyntaxNode, SyntaxTree, SyntaxTreeList, TextSpan},
    Result,
};

/// Name of the synthesized script entry point.
pub(crate) const SCRIPT_ENTRY_POINT_NAME: &str = "<Main>";

const GLOBAL_NAMESPACE_DISPLAY: &str = "<global namespace>";

/// The namespace and `using` directives in effect at a declaration.
#[derive(Debug, Clone, Default)]
pub(crate) struct Scope {
    pub namespace: String,
    pub usings: Vec<ImportDirective>,
}

impl Scope {
    /// Scope of the declaration at `target` within `root`.
    pub(crate) fn enclosing(root: &SyntaxNode, target: TextSpan) -> Self {
        let mut scope = Scope::default();
        let mut current = root;
        loop {
            scope.usings.extend(children_of(current, SyntaxKind::UsingDirective).map(import_of));
            let inner = children_of(current, SyntaxKind::NamespaceDeclaration)
                .find(|ns| ns.span().contains_span(target));
            let Some(namespace) = inner else {
                return scope;
            };
            let name = child_of(namespace, SyntaxKind::QualifiedName)
                .map(qualified_name_text)
                .unwrap_or_default();
            scope.namespace = join(&scope.namespace, &name);
            current = namespace;
        }
    }
}

fn import_of(directive: &SyntaxNode) -> ImportDirective {
    ImportDirective {
        namespace: child_of(directive, SyntaxKind::QualifiedName)
            .map(qualified_name_text)
            .unwrap_or_default(),
        span: directive.span(),
    }
}

fn join(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}.{name}")
    }
}

/// Every `using` directive of `tree` in source order.
pub(crate) fn import_directives(tree: &SyntaxTree) -> Vec<ImportDirective> {
    tree.root()
        .descendants()
        .filter(|node| is(node, SyntaxKind::UsingDirective))
        .map(|node| import_of(&node))
        .collect()
}

/// `#r` directives of `tree` as (path, span).
pub(crate) fn reference_directives(tree: &SyntaxTree) -> Vec<(String, TextSpan)> {
    children_of(tree.root(), SyntaxKind::ReferenceDirective)
        .filter_map(|directive| {
            let path = child_of(directive, SyntaxKind::StringLiteral)?.text()?;
            Some((path.to_string(), directive.span()))
        })
        .collect()
}

/// `true` if the tree has anything besides directives.
pub(crate) fn has_code_to_emit(tree: &SyntaxTree) -> bool {
    tree.root().children().iter().any(|child| {
        !is(child, SyntaxKind::UsingDirective) && !is(child, SyntaxKind::ReferenceDirective)
    })
}

/// Resolves type syntax at one declaration site.
pub(crate) struct TypeResolver<'a> {
    pub compilation: &'a Compilation,
    pub lookup: &'a SymbolLookup,
    pub tree: &'a SyntaxTree,
    pub scope: Scope,
}

impl<'a> TypeResolver<'a> {
    pub(crate) fn new(
        compilation: &'a Compilation,
        lookup: &'a SymbolLookup,
        tree: &'a SyntaxTree,
        site: &SyntaxNode,
    ) -> Self {
        TypeResolver {
            compilation,
            lookup,
            tree,
            scope: Scope::enclosing(tree.root(), site.span()),
        }
    }

    /// A predefined type by keyword.
    pub(crate) fn predefined(&self, keyword: &str) -> Option<TypeSymbol> {
        let special = match keyword {
            "void" => SpecialType::Void,
            "int" => SpecialType::Int32,
            "bool" => SpecialType::Boolean,
            "string" => SpecialType::String,
            "object" => SpecialType::Object,
            _ => return None,
        };
        Some(self.lookup.special_type(special))
    }

    /// Resolves a possibly dotted type name; records the `using` that made it visible.
    pub(crate) fn resolve_name(&self, name: &str) -> Option<Arc<NamedTypeSymbol>> {
        let resolved = self
            .lookup
            .resolve_type_name(name, &self.scope.usings, &self.scope.namespace)?;
        if let Some(index) = resolved.via_import {
            self.compilation
                .record_import_usage(self.tree, self.scope.usings[index].span);
        }
        Some(resolved.symbol)
    }

    /// Resolves type syntax. Unknown names are reported and become error types.
    pub(crate) fn resolve(
        &self,
        node: &SyntaxNode,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<TypeSymbol> {
        match SyntaxKind::of(node) {
            Some(SyntaxKind::PredefinedType) => {
                let keyword = node.text().unwrap_or_default();
                Ok(self.predefined(keyword).unwrap_or_else(|| {
                    TypeSymbol::Named(NamedTypeSymbol::error("", keyword, 0))
                }))
            }
            Some(SyntaxKind::ArrayType) => {
                let element = match node.children().first() {
                    Some(element) => self.resolve(element, diagnostics)?,
                    None => TypeSymbol::Named(NamedTypeSymbol::error("", "?", 0)),
                };
                Ok(TypeSymbol::Array(ArrayTypeSymbol::new(element, 1)?))
            }
            _ => {
                let name = qualified_name_text(node);
                if let Some(found) = self.resolve_name(&name) {
                    return Ok(TypeSymbol::Named(found));
                }
                if !name.is_empty() {
                    diagnostics.push(MiniErrorCode::TypeNotFound.diagnostic(
                        Location::source(self.tree, node.span()),
                        &[&name],
                    ));
                }
                let (namespace, simple) = name.rsplit_once('.').unwrap_or(("", name.as_str()));
                Ok(TypeSymbol::Named(NamedTypeSymbol::error(namespace, simple, 0)))
            }
        }
    }
}

fn accessibility(modifiers: &[&str], default: Accessibility) -> Accessibility {
    let has = |m: &str| modifiers.contains(&m);
    match (has("public"), has("protected"), has("internal"), has("private")) {
        (true, ..) => Accessibility::Public,
        (_, true, true, _) => Accessibility::ProtectedOrInternal,
        (_, true, _, true) => Accessibility::ProtectedAndInternal,
        (_, true, ..) => Accessibility::Protected,
        (_, _, true, _) => Accessibility::Internal,
        (.., true) => Accessibility::Private,
        _ => default,
    }
}

fn name_span(node: &SyntaxNode) -> TextSpan {
    child_of(node, SyntaxKind::Identifier).map_or(node.span(), SyntaxNode::span)
}

/// The initializer or body expression following the declared name, if any.
pub(crate) fn field_initializer(node: &SyntaxNode) -> Option<&SyntaxNode> {
    let children = node.children();
    let name = children
        .iter()
        .position(|c| is(c, SyntaxKind::Identifier))?;
    children.get(name + 1)
}

/// Creates the source types of `trees`.
pub(crate) fn declare_types(
    trees: &SyntaxTreeList,
    options: &CompilationOptions,
    assembly: &Weak<AssemblySymbol>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<Arc<NamedTypeSymbol>> {
    let mut declared = Vec::new();
    let mut names = HashSet::new();
    let mut submission: Option<NamedTypeBuilder> = None;

    for tree in trees.iter() {
        if tree.is_script() {
            let reference = SyntaxReference {
                tree: tree.clone(),
                node: tree.root().clone(),
            };
            let builder = submission.take().unwrap_or_else(|| {
                NamedTypeBuilder::new("", options.script_class_name())
                    .kind(TypeKind::Submission)
                    .accessibility(Accessibility::Internal)
                    .sealed(true)
            });
            submission = Some(builder.syntax(reference));
        }
    }
    if let Some(builder) = submission {
        names.insert(options.script_class_name().to_string());
        declared.push(builder.build(assembly.clone()));
    }

    for tree in trees.iter() {
        declare_in(
            tree,
            tree.root(),
            "",
            assembly,
            &mut names,
            &mut declared,
            diagnostics,
        );
    }
    declared
}

fn declare_in(
    tree: &SyntaxTree,
    container: &SyntaxNode,
    namespace: &str,
    assembly: &Weak<AssemblySymbol>,
    names: &mut HashSet<String>,
    declared: &mut Vec<Arc<NamedTypeSymbol>>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for child in container.children() {
        match SyntaxKind::of(child) {
            Some(SyntaxKind::NamespaceDeclaration) => {
                let name = child_of(child, SyntaxKind::QualifiedName)
                    .map(qualified_name_text)
                    .unwrap_or_default();
                let inner = join(namespace, &name);
                declare_in(tree, child, &inner, assembly, names, declared, diagnostics);
            }
            Some(SyntaxKind::ClassDeclaration) => {
                let Some(name) = declared_name(child).filter(|n| !n.is_empty()) else {
                    continue;
                };
                if !names.insert(join(namespace, name)) {
                    let container = if namespace.is_empty() {
                        GLOBAL_NAMESPACE_DISPLAY
                    } else {
                        namespace
                    };
                    diagnostics.push(MiniErrorCode::DuplicateType.diagnostic(
                        Location::source(tree, name_span(child)),
                        &[&container, &name],
                    ));
                    continue;
                }
                let mods = modifiers(child);
                let is_static = mods.contains(&"static");
                let ty = NamedTypeBuilder::new(namespace, name)
                    .accessibility(accessibility(&mods, Accessibility::Internal))
                    .sealed(is_static || mods.contains(&"sealed"))
                    .abstract_type(is_static || mods.contains(&"abstract"))
                    .static_type(is_static)
                    .syntax(SyntaxReference {
                        tree: tree.clone(),
                        node: child.clone(),
                    })
                    .documentation(documentation(child))
                    .build(assembly.clone());
                log::trace!("declared type {}", ty.full_name());
                declared.push(ty);
            }
            _ => {}
        }
    }
}

/// Attaches base types and members to the types created by [`declare_types`].
pub(crate) fn complete_types(context: &DeclarationContext<'_>) -> Result<Vec<Diagnostic>> {
    let mut diagnostics = Vec::new();
    let object = context.lookup.special_type(SpecialType::Object);

    for ty in context.assembly.types() {
        let Some(reference) = ty.declaring_syntax().first() else {
            continue;
        };
        let base = if ty.type_kind() == TypeKind::Submission {
            Some(object.clone())
        } else {
            let resolver =
                TypeResolver::new(context.compilation, context.lookup, &reference.tree, &reference.node);
            match child_of(&reference.node, SyntaxKind::BaseType).and_then(type_syntax) {
                Some(syntax) => {
                    let base = resolver.resolve(syntax, &mut diagnostics)?;
                    let is_self = base.as_named().is_some_and(|b| Arc::ptr_eq(b, ty));
                    if is_self {
                        Some(object.clone())
                    } else {
                        Some(base)
                    }
                }
                None if ty.special_type() == SpecialType::Object => None,
                None => Some(object.clone()),
            }
        };
        ty.set_base_type(base)?;
    }

    for ty in context.assembly.types() {
        let Some(reference) = ty.declaring_syntax().first() else {
            continue;
        };
        let members = if ty.type_kind() == TypeKind::Submission {
            let void = context.lookup.special_type(SpecialType::Void);
            vec![Symbol::Method(Arc::new(
                MethodSymbol::new(ty, SCRIPT_ENTRY_POINT_NAME, void)
                    .with_kind(MethodKind::ScriptEntryPoint)
                    .with_accessibility(Accessibility::Private)
                    .with_static(true)
                    .with_syntax(Some(reference.clone())),
            ))]
        } else {
            let resolver =
                TypeResolver::new(context.compilation, context.lookup, &reference.tree, &reference.node);
            build_members(ty, reference, &resolver, &mut diagnostics)?
        };
        ty.set_members(members)?;
    }
    Ok(diagnostics)
}

fn build_members(
    ty: &Arc<NamedTypeSymbol>,
    reference: &SyntaxReference,
    resolver: &TypeResolver<'_>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Vec<Symbol>> {
    let tree = &reference.tree;
    let class = &reference.node;
    let void = || resolver.lookup.special_type(SpecialType::Void);
    let syntax_of = |node: &SyntaxNode| {
        Some(SyntaxReference {
            tree: tree.clone(),
            node: node.clone(),
        })
    };

    let mut members = Vec::new();
    let mut field_names = HashSet::new();
    let mut signatures = HashSet::new();
    let mut has_instance_constructor = false;
    let mut has_static_constructor = false;
    let mut has_static_initializer = false;

    for node in class.children() {
        let Some(kind) = SyntaxKind::of(node).filter(|k| k.is_member()) else {
            continue;
        };
        let mods = modifiers(node);
        let is_static = mods.contains(&"static");
        let is_abstract = mods.contains(&"abstract");
        let name = declared_name(node).unwrap_or_default();
        if name.is_empty() {
            continue;
        }

        let symbol = match kind {
            SyntaxKind::FieldDeclaration => {
                let Some(type_node) = type_syntax(node) else {
                    continue;
                };
                let field_type = resolver.resolve(type_node, diagnostics)?;
                if !field_names.insert(name.to_string()) {
                    report_duplicate(ty, node, tree, name, diagnostics);
                    continue;
                }
                has_static_initializer |= is_static && field_initializer(node).is_some();
                Symbol::Field(Arc::new(
                    FieldSymbol::new(ty, name, field_type)
                        .with_accessibility(accessibility(&mods, Accessibility::Private))
                        .with_static(is_static)
                        .with_syntax(syntax_of(node))
                        .with_documentation(documentation(node)),
                ))
            }
            SyntaxKind::MethodDeclaration | SyntaxKind::ConstructorDeclaration => {
                let is_constructor = kind == SyntaxKind::ConstructorDeclaration;
                let parameters = parameters(node, resolver, diagnostics)?;
                let method_name = match (is_constructor, is_static) {
                    (true, true) => ".cctor",
                    (true, false) => ".ctor",
                    (false, _) => name,
                };
                let signature = format!(
                    "{method_name}({})",
                    parameters
                        .iter()
                        .map(|(_, t)| t.display_name())
                        .collect::<Vec<_>>()
                        .join(",")
                );
                if field_names.contains(method_name) || !signatures.insert(signature) {
                    report_duplicate(ty, node, tree, name, diagnostics);
                    continue;
                }
                let return_type = match type_syntax(node).filter(|_| !is_constructor) {
                    Some(syntax) => resolver.resolve(syntax, diagnostics)?,
                    None => void(),
                };
                has_instance_constructor |= is_constructor && !is_static;
                has_static_constructor |= is_constructor && is_static;
                Symbol::Method(Arc::new(
                    MethodSymbol::new(ty, method_name, return_type)
                        .with_accessibility(accessibility(&mods, Accessibility::Private))
                        .with_static(is_static)
                        .with_virtual(
                            mods.contains(&"virtual") || is_abstract || mods.contains(&"override"),
                        )
                        .with_abstract(is_abstract)
                        .with_parameters(parameters)
                        .with_syntax(syntax_of(node))
                        .with_documentation(documentation(node)),
                ))
            }
            _ => continue,
        };
        members.push(symbol);
    }

    if !has_instance_constructor && !ty.is_static() {
        let access = if ty.is_abstract() {
            Accessibility::Protected
        } else {
            Accessibility::Public
        };
        members.push(Symbol::Method(Arc::new(
            MethodSymbol::new(ty, ".ctor", void())
                .with_accessibility(access)
                .with_syntax(syntax_of(class)),
        )));
    }
    if has_static_initializer && !has_static_constructor {
        members.push(Symbol::Method(Arc::new(
            MethodSymbol::new(ty, ".cctor", void())
                .with_accessibility(Accessibility::Private)
                .with_static(true)
                .with_syntax(syntax_of(class)),
        )));
    }
    Ok(members)
}

fn parameters(
    node: &SyntaxNode,
    resolver: &TypeResolver<'_>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Vec<(String, TypeSymbol)>> {
    let Some(list) = child_of(node, SyntaxKind::ParameterList) else {
        return Ok(Vec::new());
    };
    children_of(list, SyntaxKind::Parameter)
        .filter_map(|parameter| {
            let name = declared_name(parameter)?.to_string();
            Some((name, type_syntax(parameter)?))
        })
        .map(|(name, syntax)| Ok((name, resolver.resolve(syntax, diagnostics)?)))
        .collect()
}

fn report_duplicate(
    ty: &NamedTypeSymbol,
    node: &SyntaxNode,
    tree: &SyntaxTree,
    name: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    diagnostics.push(MiniErrorCode::DuplicateMember.diagnostic(
        Location::source(tree, name_span(node)),
        &[&ty.full_name(), &name],
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::MiniLanguage;

    #[test]
    fn test_scope_collects_nested_usings() {
        let tree = MiniLanguage::parse(
            "using A;\nnamespace N { using B; namespace M { class C {} } }",
            "s.mini",
        );
        let class = tree
            .root()
            .descendants()
            .find(|n| is(n, SyntaxKind::ClassDeclaration))
            .unwrap();
        let scope = Scope::enclosing(tree.root(), class.span());
        assert_eq!(scope.namespace, "N.M");
        let usings: Vec<_> = scope.usings.iter().map(|u| u.namespace.as_str()).collect();
        assert_eq!(usings, ["A", "B"]);
        assert_eq!(import_directives(&tree).len(), 2);
    }

    #[test]
    fn test_accessibility_modifiers() {
        assert_eq!(accessibility(&[], Accessibility::Internal), Accessibility::Internal);
        assert_eq!(accessibility(&["public"], Accessibility::Private), Accessibility::Public);
        assert_eq!(
            accessibility(&["protected", "internal"], Accessibility::Private),
            Accessibility::ProtectedOrInternal
        );
        assert_eq!(
            accessibility(&["static", "private"], Accessibility::Internal),
            Accessibility::Private
        );
    }

    #[test]
    fn test_code_detection() {
        assert!(!has_code_to_emit(&MiniLanguage::parse("using System;", "a.mini")));
        assert!(has_code_to_emit(&MiniLanguage::parse("class A {}", "a.mini")));
        let script = MiniLanguage::parse_script("#r \"lib.dll\"\nx = 1;", "s.csx");
        assert_eq!(reference_directives(&script)[0].0, "lib.dll");
    }
}
