//! Language detection and per-language tree-sitter grammars + chunkable-node
//! queries used by the syntax chunking strategy.

use tree_sitter::Language;

/// Map a file extension to a language tag. Unknown extensions return `None`;
/// callers treat that as `"unknown"`.
pub fn detect_language(path: &str) -> &'static str {
    let ext = match path.rsplit('.').next() {
        Some(e) => e,
        None => return "unknown",
    };
    match ext {
        "rs" => "rust",
        "py" | "pyi" => "python",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "go" => "go",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => "cpp",
        "kt" | "kts" => "kotlin",
        _ => "unknown",
    }
}

/// A chunkable grammar: the tree-sitter language plus a query whose captures
/// identify top-level nodes worth chunking and the chunk kind they map to.
pub struct Grammar {
    pub language: Language,
    /// Each query line pairs a node-pattern with an `@outer` capture (the
    /// node to extract) and a `@name` capture (the declared identifier).
    pub query_source: &'static str,
}

/// Resolve the grammar for a language tag, if this chunker supports it.
pub fn grammar_for(lang: &str) -> Option<Grammar> {
    let (language, query_source): (Language, &'static str) = match lang {
        "rust" => (tree_sitter_rust::LANGUAGE.into(), RUST_QUERY),
        "python" => (tree_sitter_python::LANGUAGE.into(), PYTHON_QUERY),
        "typescript" => (tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(), TYPESCRIPT_QUERY),
        "javascript" => (tree_sitter_javascript::LANGUAGE.into(), JAVASCRIPT_QUERY),
        "go" => (tree_sitter_go::LANGUAGE.into(), GO_QUERY),
        "java" => (tree_sitter_java::LANGUAGE.into(), JAVA_QUERY),
        "c" => (tree_sitter_c::LANGUAGE.into(), C_QUERY),
        "cpp" => (tree_sitter_cpp::LANGUAGE.into(), CPP_QUERY),
        "kotlin" => (tree_sitter_kotlin_ng::LANGUAGE.into(), KOTLIN_QUERY),
        _ => return None,
    };
    Some(Grammar { language, query_source })
}

/// Map the outer capture name from a query match to the chunk kind a reader
/// would recognize. Node kinds without a closer match (modules, impls,
/// traits, enums) still read naturally as "class-like" containers.
pub fn chunk_kind_for_capture(capture: &str) -> super::ChunkKind {
    match capture {
        "function" => super::ChunkKind::Function,
        "interface" | "type_alias" => super::ChunkKind::Interface,
        _ => super::ChunkKind::Class,
    }
}

const RUST_QUERY: &str = r#"
(function_item name: (identifier) @name) @function
(struct_item name: (type_identifier) @name) @struct
(enum_item name: (type_identifier) @name) @enum
(trait_item name: (type_identifier) @name) @interface
(impl_item type: (type_identifier) @name) @impl
(mod_item name: (identifier) @name) @module
"#;

const PYTHON_QUERY: &str = r#"
(function_definition name: (identifier) @name) @function
(class_definition name: (identifier) @name) @class
"#;

const TYPESCRIPT_QUERY: &str = r#"
(function_declaration name: (identifier) @name) @function
(class_declaration name: (type_identifier) @name) @class
(interface_declaration name: (type_identifier) @name) @interface
(type_alias_declaration name: (type_identifier) @name) @type_alias
"#;

const JAVASCRIPT_QUERY: &str = r#"
(function_declaration name: (identifier) @name) @function
(class_declaration name: (identifier) @name) @class
"#;

const GO_QUERY: &str = r#"
(function_declaration name: (identifier) @name) @function
(method_declaration name: (field_identifier) @name) @function
(type_declaration (type_spec name: (type_identifier) @name)) @struct
"#;

const JAVA_QUERY: &str = r#"
(method_declaration name: (identifier) @name) @function
(class_declaration name: (identifier) @name) @class
(interface_declaration name: (identifier) @name) @interface
(enum_declaration name: (identifier) @name) @enum
"#;

const C_QUERY: &str = r#"
(function_definition declarator: (function_declarator declarator: (identifier) @name)) @function
(struct_specifier name: (type_identifier) @name) @struct
(enum_specifier name: (type_identifier) @name) @enum
"#;

const CPP_QUERY: &str = r#"
(function_definition declarator: (function_declarator declarator: (identifier) @name)) @function
(class_specifier name: (type_identifier) @name) @class
(struct_specifier name: (type_identifier) @name) @struct
(enum_specifier name: (type_identifier) @name) @enum
"#;

const KOTLIN_QUERY: &str = r#"
(function_declaration (simple_identifier) @name) @function
(class_declaration (type_identifier) @name) @class
(object_declaration (type_identifier) @name) @class
(interface_declaration (type_identifier) @name) @interface
"#;

/// Files this large or with this extension are treated as binary/noise and
/// excluded without being read at all.
pub fn should_skip_file(path: &str, size_bytes: u64) -> bool {
    if size_bytes > 1_048_576 {
        return true;
    }
    let ext = match path.rsplit('.').next() {
        Some(e) => e.to_lowercase(),
        None => return false,
    };
    matches!(
        ext.as_str(),
        "png" | "jpg" | "jpeg" | "gif" | "ico" | "svg" | "webp" | "bmp"
            | "pdf" | "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx"
            | "zip" | "tar" | "gz" | "bz2" | "xz" | "7z" | "rar"
            | "exe" | "dll" | "so" | "dylib" | "o" | "a" | "lib"
            | "wasm" | "class" | "pyc" | "pyo"
            | "ttf" | "otf" | "woff" | "woff2" | "eot"
            | "mp3" | "mp4" | "wav" | "avi" | "mov" | "mkv"
            | "db" | "sqlite" | "sqlite3"
            | "lock"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_known_extensions() {
        assert_eq!(detect_language("main.rs"), "rust");
        assert_eq!(detect_language("app.py"), "python");
        assert_eq!(detect_language("index.tsx"), "typescript");
        assert_eq!(detect_language("README.md"), "unknown");
    }

    #[test]
    fn skips_large_and_binary_files() {
        assert!(should_skip_file("small.rs", 2_000_000));
        assert!(should_skip_file("image.png", 10));
        assert!(!should_skip_file("main.rs", 10));
    }
}
