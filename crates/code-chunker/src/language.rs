use crate::error::{ChunkerError, Result};
use std::path::Path;

/// Canonical language known to the chunker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Language {
    JavaScript,
    Jsx,
    TypeScript,
    Tsx,
    Python,
    Rust,
    Go,
    Java,
    C,
    Cpp,
    CSharp,
    Ruby,
    Php,
    Swift,
    Kotlin,
    Shell,
    Sql,
    Html,
    Css,
    Scss,
    Json,
    Yaml,
    Toml,
    Ini,
    Xml,
    Markdown,
    Vue,
    Svelte,
    Astro,
}

const ALL: [Language; 29] = [
    Language::JavaScript,
    Language::Jsx,
    Language::TypeScript,
    Language::Tsx,
    Language::Python,
    Language::Rust,
    Language::Go,
    Language::Java,
    Language::C,
    Language::Cpp,
    Language::CSharp,
    Language::Ruby,
    Language::Php,
    Language::Swift,
    Language::Kotlin,
    Language::Shell,
    Language::Sql,
    Language::Html,
    Language::Css,
    Language::Scss,
    Language::Json,
    Language::Yaml,
    Language::Toml,
    Language::Ini,
    Language::Xml,
    Language::Markdown,
    Language::Vue,
    Language::Svelte,
    Language::Astro,
];

/// Languages the bundled grammar set can parse
pub const TREE_SITTER_LANGUAGE_IDS: [&str; 6] =
    ["javascript", "jsx", "typescript", "tsx", "python", "rust"];

impl Language {
    /// Every registered language, in registry order
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &ALL
    }

    /// Detect language from a file extension (with or without the leading dot)
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_lowercase();
        let lang = match ext.as_str() {
            "js" | "mjs" | "cjs" => Self::JavaScript,
            "jsx" => Self::Jsx,
            "ts" | "mts" | "cts" => Self::TypeScript,
            "tsx" => Self::Tsx,
            "py" | "pyw" | "pyi" => Self::Python,
            "rs" => Self::Rust,
            "go" => Self::Go,
            "java" => Self::Java,
            "c" | "h" => Self::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => Self::Cpp,
            "cs" => Self::CSharp,
            "rb" => Self::Ruby,
            "php" => Self::Php,
            "swift" => Self::Swift,
            "kt" | "kts" => Self::Kotlin,
            "sh" | "bash" | "zsh" => Self::Shell,
            "sql" => Self::Sql,
            "html" | "htm" => Self::Html,
            "css" => Self::Css,
            "scss" | "sass" => Self::Scss,
            "json" | "jsonc" | "json5" => Self::Json,
            "yaml" | "yml" => Self::Yaml,
            "toml" => Self::Toml,
            "ini" | "cfg" | "conf" => Self::Ini,
            "xml" | "svg" => Self::Xml,
            "md" | "mdx" | "markdown" => Self::Markdown,
            "vue" => Self::Vue,
            "svelte" => Self::Svelte,
            "astro" => Self::Astro,
            _ => return None,
        };
        Some(lang)
    }

    /// Detect language from file path
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Look up a canonical language id
    pub fn from_id(id: &str) -> Option<Self> {
        ALL.iter().copied().find(|lang| lang.as_str() == id)
    }

    /// Resolve a fence info string or `lang` attribute to a language
    pub fn from_alias(alias: &str) -> Option<Self> {
        let alias = alias
            .split(|c: char| c.is_whitespace() || c == ',' || c == '{')
            .find(|part| !part.is_empty())?
            .trim_start_matches('.')
            .to_lowercase();
        let lang = match alias.as_str() {
            "js" | "javascript" | "node" | "mjs" | "cjs" => Self::JavaScript,
            "jsx" => Self::Jsx,
            "ts" | "typescript" => Self::TypeScript,
            "tsx" => Self::Tsx,
            "py" | "python" | "python3" => Self::Python,
            "rs" | "rust" => Self::Rust,
            "go" | "golang" => Self::Go,
            "c++" | "cpp" => Self::Cpp,
            "c#" | "csharp" | "cs" => Self::CSharp,
            "rb" | "ruby" => Self::Ruby,
            "kt" | "kotlin" => Self::Kotlin,
            "sh" | "bash" | "shell" | "zsh" | "console" | "shellscript" => Self::Shell,
            "yml" | "yaml" => Self::Yaml,
            "postcss" | "css" => Self::Css,
            "md" | "markdown" => Self::Markdown,
            other => return Self::from_id(other).or_else(|| Self::from_extension(other)),
        };
        Some(lang)
    }

    /// Get language name as string
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::Jsx => "jsx",
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
            Self::Python => "python",
            Self::Rust => "rust",
            Self::Go => "go",
            Self::Java => "java",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::CSharp => "csharp",
            Self::Ruby => "ruby",
            Self::Php => "php",
            Self::Swift => "swift",
            Self::Kotlin => "kotlin",
            Self::Shell => "shell",
            Self::Sql => "sql",
            Self::Html => "html",
            Self::Css => "css",
            Self::Scss => "scss",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Toml => "toml",
            Self::Ini => "ini",
            Self::Xml => "xml",
            Self::Markdown => "markdown",
            Self::Vue => "vue",
            Self::Svelte => "svelte",
            Self::Astro => "astro",
        }
    }

    /// Canonical extension (with leading dot) used to route segment text
    #[must_use]
    pub const fn ext(self) -> &'static str {
        match self {
            Self::JavaScript => ".js",
            Self::Jsx => ".jsx",
            Self::TypeScript => ".ts",
            Self::Tsx => ".tsx",
            Self::Python => ".py",
            Self::Rust => ".rs",
            Self::Go => ".go",
            Self::Java => ".java",
            Self::C => ".c",
            Self::Cpp => ".cpp",
            Self::CSharp => ".cs",
            Self::Ruby => ".rb",
            Self::Php => ".php",
            Self::Swift => ".swift",
            Self::Kotlin => ".kt",
            Self::Shell => ".sh",
            Self::Sql => ".sql",
            Self::Html => ".html",
            Self::Css => ".css",
            Self::Scss => ".scss",
            Self::Json => ".json",
            Self::Yaml => ".yaml",
            Self::Toml => ".toml",
            Self::Ini => ".ini",
            Self::Xml => ".xml",
            Self::Markdown => ".md",
            Self::Vue => ".vue",
            Self::Svelte => ".svelte",
            Self::Astro => ".astro",
        }
    }

    /// Structured configuration languages get the `config` embedding context
    #[must_use]
    pub const fn is_config(self) -> bool {
        matches!(
            self,
            Self::Json | Self::Yaml | Self::Toml | Self::Ini | Self::Xml
        )
    }

    /// Check if this language is supported for AST parsing
    #[must_use]
    pub const fn supports_ast(self) -> bool {
        matches!(
            self,
            Self::JavaScript
                | Self::Jsx
                | Self::TypeScript
                | Self::Tsx
                | Self::Python
                | Self::Rust
        )
    }

    /// Get Tree-sitter language instance
    pub fn tree_sitter_language(self) -> Result<tree_sitter::Language> {
        match self {
            Self::JavaScript | Self::Jsx => Ok(tree_sitter_javascript::LANGUAGE.into()),
            Self::TypeScript => Ok(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            Self::Tsx => Ok(tree_sitter_typescript::LANGUAGE_TSX.into()),
            Self::Python => Ok(tree_sitter_python::LANGUAGE.into()),
            Self::Rust => Ok(tree_sitter_rust::LANGUAGE.into()),
            _ => Err(ChunkerError::unsupported_language(self.as_str())),
        }
    }
}

/// Extension for a language id, if the id is registered
pub fn language_ext(language_id: &str) -> Option<&'static str> {
    Language::from_id(language_id).map(Language::ext)
}

/// Resolve the grammar-engine language for a segment.
///
/// A `javascript`/`typescript` segment routed through a `.jsx`/`.tsx`
/// extension is parsed with the JSX-aware grammar.
pub fn resolve_tree_sitter_language(language_id: Option<&str>, ext: &str) -> Option<Language> {
    let ext_lang = Language::from_extension(ext);
    let lang = match language_id {
        Some(id) => Language::from_id(id).or_else(|| Language::from_alias(id))?,
        None => ext_lang?,
    };
    let lang = match (lang, ext_lang) {
        (Language::JavaScript, Some(Language::Jsx)) => Language::Jsx,
        (Language::TypeScript, Some(Language::Tsx)) => Language::Tsx,
        (lang, _) => lang,
    };
    lang.supports_ast().then_some(lang)
}
