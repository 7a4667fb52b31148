use crate::language::Language;
use crate::types::{ChunkType, LocalChunk};
use tree_sitter::Node;

/// Extracts declaration-level chunks from a parsed syntax tree
pub struct AstAnalyzer<'a> {
    language: Language,
    content: &'a str,
}

impl<'a> AstAnalyzer<'a> {
    pub const fn new(language: Language, content: &'a str) -> Self {
        Self { language, content }
    }

    /// Walk the top level of `root` and emit one chunk per declaration
    pub fn chunk(&self, root: Node<'_>) -> Vec<LocalChunk> {
        let mut chunks = Vec::new();
        match self.language {
            Language::Rust => self.extract_rust_chunks(root, &mut chunks),
            Language::Python => self.extract_python_chunks(root, &mut chunks),
            Language::JavaScript | Language::Jsx | Language::TypeScript | Language::Tsx => {
                self.extract_js_chunks(root, &mut chunks);
            }
            _ => {}
        }
        chunks.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
        chunks
    }

    /// Extract chunks from Rust code
    fn extract_rust_chunks(&self, node: Node<'_>, chunks: &mut Vec<LocalChunk>) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            let chunk_type = match child.kind() {
                "function_item" => ChunkType::Function,
                "struct_item" | "union_item" => ChunkType::Struct,
                "enum_item" => ChunkType::Enum,
                "impl_item" => ChunkType::Impl,
                "trait_item" => ChunkType::Interface,
                "mod_item" => ChunkType::Module,
                "type_item" => ChunkType::Type,
                "const_item" => ChunkType::Const,
                "static_item" => ChunkType::Variable,
                "macro_definition" => ChunkType::Function,
                _ => continue,
            };

            match chunk_type {
                ChunkType::Impl => self.extract_impl_methods(child, chunks),
                ChunkType::Module if child.child_by_field_name("body").is_some() => {
                    self.extract_rust_chunks_in_module(child, chunks);
                }
                _ => chunks.push(self.node_to_chunk(child, chunk_type)),
            }
        }
    }

    /// Inline `mod name { ... }` blocks are chunked by their items
    fn extract_rust_chunks_in_module(&self, module: Node<'_>, chunks: &mut Vec<LocalChunk>) {
        let Some(body) = module.child_by_field_name("body") else {
            return;
        };
        let before = chunks.len();
        self.extract_rust_chunks(body, chunks);
        if chunks.len() == before {
            chunks.push(self.node_to_chunk(module, ChunkType::Module));
            return;
        }
        if let Some(module_name) = self.extract_symbol_name(module) {
            for chunk in &mut chunks[before..] {
                let qualified = match chunk.meta.extra.get("qualifiedName").and_then(|v| v.as_str()) {
                    Some(inner) => format!("{module_name}::{inner}"),
                    None => continue,
                };
                chunk
                    .meta
                    .extra
                    .insert("qualifiedName".to_string(), qualified.into());
            }
        }
    }

    /// Extract methods from impl block
    fn extract_impl_methods(&self, impl_node: Node<'_>, chunks: &mut Vec<LocalChunk>) {
        let impl_target = self.extract_impl_target(impl_node);
        let before = chunks.len();

        if let Some(body) = impl_node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for member in body.named_children(&mut cursor) {
                let chunk_type = match member.kind() {
                    "function_item" => ChunkType::Method,
                    "const_item" => ChunkType::Const,
                    "type_item" => ChunkType::Type,
                    _ => continue,
                };
                let chunk = self.node_to_chunk(member, chunk_type);
                chunks.push(self.scoped(chunk, impl_target.as_deref(), "::"));
            }
        }

        if chunks.len() == before {
            let mut chunk = self.node_to_chunk(impl_node, ChunkType::Impl);
            if chunk.name.is_none() {
                chunk.name = impl_target;
            }
            chunks.push(chunk);
        }
    }

    /// Extract the target of an impl block (struct/trait name)
    fn extract_impl_target(&self, impl_node: Node<'_>) -> Option<String> {
        let ty = impl_node.child_by_field_name("type")?;
        match ty.kind() {
            "type_identifier" => Some(self.text(ty).to_string()),
            "generic_type" | "scoped_type_identifier" => {
                let mut cursor = ty.walk();
                let last = ty
                    .named_children(&mut cursor)
                    .filter(|c| c.kind() == "type_identifier")
                    .last();
                last.map(|c| self.text(c).to_string())
            }
            _ => Some(self.text(ty).to_string()),
        }
    }

    /// Extract chunks from Python code
    fn extract_python_chunks(&self, node: Node<'_>, chunks: &mut Vec<LocalChunk>) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            let target = if child.kind() == "decorated_definition" {
                child.child_by_field_name("definition").unwrap_or(child)
            } else {
                child
            };
            match target.kind() {
                "function_definition" => {
                    let mut chunk = self.node_to_chunk(child, ChunkType::Function);
                    chunk.name = self.extract_symbol_name(target);
                    chunks.push(chunk);
                }
                "class_definition" => self.extract_python_class_methods(child, target, chunks),
                _ => {}
            }
        }
    }

    /// Extract methods from Python class
    fn extract_python_class_methods(
        &self,
        outer: Node<'_>,
        class_node: Node<'_>,
        chunks: &mut Vec<LocalChunk>,
    ) {
        let class_name = self.extract_symbol_name(class_node);
        let before = chunks.len();

        if let Some(body) = class_node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for member in body.named_children(&mut cursor) {
                let def = if member.kind() == "decorated_definition" {
                    member.child_by_field_name("definition").unwrap_or(member)
                } else {
                    member
                };
                if def.kind() == "function_definition" {
                    let mut chunk = self.node_to_chunk(member, ChunkType::Method);
                    chunk.name = self.extract_symbol_name(def);
                    chunks.push(self.scoped(chunk, class_name.as_deref(), "."));
                }
            }
        }

        if chunks.len() == before {
            let mut chunk = self.node_to_chunk(outer, ChunkType::Class);
            chunk.name = class_name;
            chunks.push(chunk);
        }
    }

    /// Extract chunks from JavaScript/TypeScript code
    fn extract_js_chunks(&self, node: Node<'_>, chunks: &mut Vec<LocalChunk>) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            // `export <declaration>` keeps the export keyword inside the chunk
            let decl = if child.kind() == "export_statement" {
                match child.child_by_field_name("declaration") {
                    Some(decl) => decl,
                    None => continue,
                }
            } else {
                child
            };

            let chunk_type = match decl.kind() {
                "function_declaration" | "generator_function_declaration" => ChunkType::Function,
                "class_declaration" | "abstract_class_declaration" => ChunkType::Class,
                "interface_declaration" => ChunkType::Interface,
                "enum_declaration" => ChunkType::Enum,
                "type_alias_declaration" => ChunkType::Type,
                "module" | "internal_module" => ChunkType::Module,
                "lexical_declaration" | "variable_declaration" => {
                    self.js_variable_kind(decl)
                }
                _ => continue,
            };

            if chunk_type == ChunkType::Class {
                self.extract_js_class_methods(child, decl, chunks);
                continue;
            }

            let mut chunk = self.node_to_chunk(child, chunk_type);
            chunk.name = self.js_declaration_name(decl);
            chunks.push(chunk);
        }
    }

    fn js_variable_kind(&self, decl: Node<'_>) -> ChunkType {
        let mut cursor = decl.walk();
        let is_function = decl
            .named_children(&mut cursor)
            .filter(|c| c.kind() == "variable_declarator")
            .filter_map(|c| c.child_by_field_name("value"))
            .any(|v| matches!(v.kind(), "arrow_function" | "function_expression" | "function"));
        if is_function {
            ChunkType::Function
        } else if self.text(decl).starts_with("const") {
            ChunkType::Const
        } else {
            ChunkType::Variable
        }
    }

    fn js_declaration_name(&self, decl: Node<'_>) -> Option<String> {
        if matches!(decl.kind(), "lexical_declaration" | "variable_declaration") {
            let mut cursor = decl.walk();
            let declarator = decl
                .named_children(&mut cursor)
                .find(|c| c.kind() == "variable_declarator")?;
            return declarator
                .child_by_field_name("name")
                .map(|n| self.text(n).to_string());
        }
        self.extract_symbol_name(decl)
    }

    /// Extract methods from JavaScript/TypeScript class
    fn extract_js_class_methods(
        &self,
        outer: Node<'_>,
        class_node: Node<'_>,
        chunks: &mut Vec<LocalChunk>,
    ) {
        let class_name = self.extract_symbol_name(class_node);
        let before = chunks.len();

        if let Some(body) = class_node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for member in body.named_children(&mut cursor) {
                let chunk_type = match member.kind() {
                    "method_definition" | "abstract_method_signature" => ChunkType::Method,
                    "field_definition" | "public_field_definition" => ChunkType::Variable,
                    _ => continue,
                };
                let chunk = self.node_to_chunk(member, chunk_type);
                chunks.push(self.scoped(chunk, class_name.as_deref(), "."));
            }
        }

        if chunks.len() == before {
            let mut chunk = self.node_to_chunk(outer, ChunkType::Class);
            chunk.name = class_name;
            chunks.push(chunk);
        }
    }

    /// Convert AST node to a local chunk, pulling in directly preceding
    /// doc comments and attributes
    fn node_to_chunk(&self, node: Node<'_>, chunk_type: ChunkType) -> LocalChunk {
        let first = self.leading_trivia(node);
        let start_line = first.start_position().row + 1;
        let end_line = node.end_position().row + 1;

        let mut chunk = LocalChunk::new(first.start_byte(), node.end_byte())
            .kind(chunk_type)
            .lines(start_line, end_line);
        chunk.name = self.extract_symbol_name(node);
        chunk
    }

    /// Earliest sibling in the run of comments/attributes attached to `node`
    fn leading_trivia<'t>(&self, node: Node<'t>) -> Node<'t> {
        let mut first = node;
        while let Some(prev) = first.prev_sibling() {
            let attached = matches!(
                prev.kind(),
                "line_comment" | "block_comment" | "comment" | "attribute_item" | "decorator"
            ) && prev.end_position().row + 1 >= first.start_position().row;
            if !attached || !self.is_doc_like(prev) {
                break;
            }
            first = prev;
        }
        first
    }

    fn is_doc_like(&self, node: Node<'_>) -> bool {
        let text = self.text(node).trim_start();
        match self.language {
            Language::Rust => {
                node.kind() == "attribute_item"
                    || text.starts_with("///")
                    || text.starts_with("//!")
                    || text.starts_with("/**")
            }
            Language::Python => text.starts_with('#'),
            _ => true,
        }
    }

    fn scoped(&self, mut chunk: LocalChunk, scope: Option<&str>, sep: &str) -> LocalChunk {
        if let Some(scope) = scope {
            chunk
                .meta
                .extra
                .insert("parentScope".to_string(), scope.into());
            if let Some(name) = &chunk.name {
                chunk
                    .meta
                    .extra
                    .insert("qualifiedName".to_string(), format!("{scope}{sep}{name}").into());
            }
        }
        chunk
    }

    /// Extract symbol name from AST node
    fn extract_symbol_name(&self, node: Node<'_>) -> Option<String> {
        if let Some(name) = node.child_by_field_name("name") {
            return Some(self.text(name).to_string());
        }
        let mut cursor = node.walk();
        let found = node.children(&mut cursor).find(|child| {
            matches!(
                child.kind(),
                "identifier" | "name" | "type_identifier" | "field_identifier" | "property_identifier"
            )
        });
        found.map(|child| self.text(child).to_string())
    }

    fn text(&self, node: Node<'_>) -> &'a str {
        self.content
            .get(node.start_byte()..node.end_byte())
            .unwrap_or("")
    }
}
