//! Declaration-boundary splitting via tree-sitter.
//!
//! Adapted from the indexer's semantic-unit extractor: walks the parse tree
//! once and collects top-level declaration nodes (functions, classes,
//! impls, ...) per language, then reslices the source around them so gaps
//! between declarations (imports, module-level comments) stay attached to
//! whichever declaration follows.
use super::Segment;
use tree_sitter::{Language, Node, Parser};

fn language_for(extension: &str) -> Option<(Language, &'static str)> {
    let (language, name) = match extension.to_lowercase().as_str() {
        "rs" => (tree_sitter_rust::LANGUAGE.into(), "Rust"),
        "py" => (tree_sitter_python::LANGUAGE.into(), "Python"),
        "js" | "mjs" | "cjs" | "jsx" => (tree_sitter_javascript::LANGUAGE.into(), "JavaScript"),
        "ts" | "tsx" => (tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(), "TypeScript"),
        "go" => (tree_sitter_go::LANGUAGE.into(), "Go"),
        "java" => (tree_sitter_java::LANGUAGE.into(), "Java"),
        "swift" => (tree_sitter_swift::LANGUAGE.into(), "Swift"),
        // `.h` defaults to C rather than C++: ambiguous in general, but C is
        // the more common origin for a bare `.h` header in mixed corpora.
        "c" | "h" => (tree_sitter_c::LANGUAGE.into(), "C"),
        "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => (tree_sitter_cpp::LANGUAGE.into(), "C++"),
        "cs" => (tree_sitter_c_sharp::LANGUAGE.into(), "C#"),
        "rb" => (tree_sitter_ruby::LANGUAGE.into(), "Ruby"),
        "php" => (tree_sitter_php::LANGUAGE_PHP.into(), "PHP"),
        _ => return None,
    };
    Some((language, name))
}

fn target_kinds(language_name: &str) -> &'static [&'static str] {
    match language_name {
        "Rust" => &[
            "function_item",
            "impl_item",
            "trait_item",
            "struct_item",
            "enum_item",
            "mod_item",
        ],
        "Python" => &["function_definition", "class_definition", "decorated_definition"],
        "JavaScript" | "TypeScript" => &[
            "function_declaration",
            "function_expression",
            "arrow_function",
            "method_definition",
            "class_declaration",
        ],
        "Go" => &["function_declaration", "method_declaration", "type_declaration"],
        "Java" => &[
            "method_declaration",
            "class_declaration",
            "interface_declaration",
            "constructor_declaration",
        ],
        "Swift" => &[
            "function_declaration",
            "class_declaration",
            "protocol_declaration",
            "struct_declaration",
            "enum_declaration",
            "extension_declaration",
            "deinit_declaration",
            "initializer_declaration",
            "subscript_declaration",
        ],
        "C" => &[
            "function_definition",
            "struct_specifier",
            "enum_specifier",
            "union_specifier",
            "type_definition",
        ],
        "C++" => &[
            "function_definition",
            "class_specifier",
            "struct_specifier",
            "enum_specifier",
            "union_specifier",
            "namespace_definition",
            "template_declaration",
        ],
        "C#" => &[
            "method_declaration",
            "class_declaration",
            "struct_declaration",
            "interface_declaration",
            "enum_declaration",
            "namespace_declaration",
            "constructor_declaration",
            "property_declaration",
        ],
        "Ruby" => &["method", "singleton_method", "class", "singleton_class", "module"],
        "PHP" => &[
            "function_definition",
            "method_declaration",
            "class_declaration",
            "interface_declaration",
            "trait_declaration",
            "namespace_definition",
        ],
        _ => &[],
    }
}

/// Top-level (non-nested) declaration nodes only: recursion stops once a
/// target kind is found so a method inside an already-collected `impl`
/// block doesn't also become its own segment.
fn collect_top_level<'a>(node: Node<'a>, kinds: &[&str], out: &mut Vec<Node<'a>>) {
    if kinds.contains(&node.kind()) {
        out.push(node);
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_top_level(child, kinds, out);
    }
}

/// Declaration-bounded segments for `content`, or `None` if `extension` has
/// no grammar or parsing fails outright.
pub(super) fn declaration_segments(extension: &str, content: &str) -> Option<Vec<Segment>> {
    let (language, name) = language_for(extension)?;
    let mut parser = Parser::new();
    parser.set_language(&language).ok()?;
    let tree = parser.parse(content, None)?;

    let kinds = target_kinds(name);
    if kinds.is_empty() {
        return None;
    }
    let mut nodes = Vec::new();
    collect_top_level(tree.root_node(), kinds, &mut nodes);
    if nodes.is_empty() {
        return None;
    }
    nodes.sort_by_key(|n| n.start_byte());

    let lines: Vec<&str> = content.lines().collect();
    let mut segments = Vec::with_capacity(nodes.len());
    let mut prev_end_line = 0usize; // 0-indexed, exclusive
    for node in nodes {
        let start_row = node.start_position().row;
        let end_row = node.end_position().row;
        // Absorb any gap (imports, blank lines, comments) preceding this
        // declaration into its segment so nothing is dropped.
        let seg_start_row = prev_end_line;
        let seg_end_row = end_row.max(seg_start_row);
        let text = lines
            .get(seg_start_row..=seg_end_row.min(lines.len().saturating_sub(1)))
            .map(|s| s.join("\n"))
            .unwrap_or_default();
        if !text.trim().is_empty() {
            segments.push(Segment {
                text,
                start_line: seg_start_row + 1,
            });
        }
        prev_end_line = end_row + 1;
        let _ = start_row;
    }
    // Trailing content after the last declaration.
    if prev_end_line < lines.len() {
        let tail = lines[prev_end_line..].join("\n");
        if !tail.trim().is_empty() {
            segments.push(Segment {
                text: tail,
                start_line: prev_end_line + 1,
            });
        }
    }
    Some(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_source_splits_at_declarations() {
        let source = "use std::fmt;\n\nfn main() {\n    println!(\"hi\");\n}\n\nstruct S;\n";
        let segments = declaration_segments("rs", source).unwrap();
        assert!(segments.len() >= 2);
        assert!(segments[0].text.contains("fn main"));
    }

    #[test]
    fn unsupported_extension_returns_none() {
        assert!(declaration_segments("xyz", "anything").is_none());
    }

    #[test]
    fn plain_text_language_is_none() {
        assert!(declaration_segments("txt", "no grammar here").is_none());
    }
}
