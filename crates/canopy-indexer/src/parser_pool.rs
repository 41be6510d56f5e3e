//! Thread-safe parser pool for tree-sitter parsers.
//!
//! tree-sitter's `Parser`/`Tree` are not `Send`, so every worker owns its own
//! parser and lives on a dedicated OS thread; callers talk to it over a
//! channel. This is the concurrency primitive the rest of the crate uses to
//! run CPU-bound parsing off the async runtime (§5 of the parsing pipeline).

use anyhow::Result;
use canopy_core::Language;
use tree_sitter::Parser;

fn tree_sitter_language(language: Language) -> Option<tree_sitter::Language> {
    Some(match language {
        Language::Rust => tree_sitter_rust::LANGUAGE.into(),
        Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        Language::Python => tree_sitter_python::LANGUAGE.into(),
        Language::Go => tree_sitter_go::LANGUAGE.into(),
        Language::Java => tree_sitter_java::LANGUAGE.into(),
        Language::C => tree_sitter_c::LANGUAGE.into(),
        Language::Cpp => tree_sitter_cpp::LANGUAGE.into(),
        _ => return None,
    })
}

#[derive(Debug)]
pub struct ParseRequest {
    pub language: Language,
    pub content: String,
}

#[derive(Debug)]
pub struct ParseResult {
    pub tree: tree_sitter::Tree,
    pub content: String,
}

struct WorkerRequest {
    request: ParseRequest,
    response_sender: std::sync::mpsc::Sender<Result<ParseResult>>,
}

/// Thread-safe parser pool. Cloning shares the same worker threads.
pub struct ParserPool {
    sender: std::sync::mpsc::Sender<WorkerRequest>,
}

impl ParserPool {
    pub fn new(num_workers: usize) -> Self {
        let (sender, receiver) = std::sync::mpsc::channel::<WorkerRequest>();
        let receiver = std::sync::Arc::new(std::sync::Mutex::new(receiver));

        for i in 0..num_workers.max(1) {
            let receiver = receiver.clone();
            std::thread::spawn(move || Self::worker_thread(i, receiver));
        }

        Self { sender }
    }

    fn worker_thread(
        worker_id: usize,
        receiver: std::sync::Arc<std::sync::Mutex<std::sync::mpsc::Receiver<WorkerRequest>>>,
    ) {
        tracing::debug!(worker_id, "parser worker started");
        let mut parser = Parser::new();

        loop {
            let WorkerRequest { request, response_sender } = match receiver.lock().unwrap().recv() {
                Ok(req) => req,
                Err(_) => {
                    tracing::debug!(worker_id, "parser worker shutting down");
                    break;
                }
            };

            let result = (|| {
                let language = tree_sitter_language(request.language)
                    .ok_or_else(|| anyhow::anyhow!("no tree-sitter grammar for {:?}", request.language))?;
                parser
                    .set_language(&language)
                    .map_err(|e| anyhow::anyhow!("failed to set language: {e}"))?;
                let tree = parser
                    .parse(&request.content, None)
                    .ok_or_else(|| anyhow::anyhow!("tree-sitter failed to parse content"))?;
                Ok(ParseResult { tree, content: request.content })
            })();

            if response_sender.send(result).is_err() {
                tracing::warn!(worker_id, "caller dropped before parse result was delivered");
            }
        }
    }

    /// Blocks the calling thread until the parse completes. Intended for use
    /// from `tokio::task::spawn_blocking` or a `rayon` worker, never directly
    /// on an async task.
    pub fn parse_blocking(&self, request: ParseRequest) -> Result<ParseResult> {
        let (response_sender, response_receiver) = std::sync::mpsc::channel();
        self.sender
            .send(WorkerRequest { request, response_sender })
            .map_err(|_| anyhow::anyhow!("parser pool is shut down"))?;
        response_receiver.recv().map_err(|_| anyhow::anyhow!("parser worker died"))?
    }
}

impl Clone for ParserPool {
    fn clone(&self) -> Self {
        Self { sender: self.sender.clone() }
    }
}

/// Builds a pool sized to `workers`, or the available parallelism if `None`.
pub fn create_parser_pool(workers: Option<usize>) -> ParserPool {
    let num_workers = workers.unwrap_or_else(|| {
        std::thread::available_parallelism().map(|n| n.get().max(2)).unwrap_or(2)
    });
    ParserPool::new(num_workers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rust_source() {
        let pool = create_parser_pool(Some(1));
        let result = pool
            .parse_blocking(ParseRequest { language: Language::Rust, content: "fn main() {}".into() })
            .unwrap();
        assert_eq!(result.tree.root_node().kind(), "source_file");
    }

    #[test]
    fn unsupported_language_errors() {
        let pool = create_parser_pool(Some(1));
        let result = pool.parse_blocking(ParseRequest { language: Language::Markdown, content: String::new() });
        assert!(result.is_err());
    }
}
