use std::{path::PathBuf, sync::Arc};

use rmcp::{
    ServerHandler,
    ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult,
        Content,
        Implementation,
        ServerCapabilities,
        ServerInfo,
    },
    tool,
    tool_handler,
    tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    error,
    pipeline::Pipeline,
    query::{QueryOutcome, QueryParams},
};

#[derive(Clone)]
pub struct MedragMcpServer {
    pipeline: Arc<Pipeline>,
    tool_router: ToolRouter<Self>,
}

impl MedragMcpServer {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            tool_router: Self::tool_router(),
        }
    }

    /// Run a pipeline call on the blocking pool; every stage does
    /// synchronous I/O.
    async fn run_blocking<T, F>(&self, f: F) -> Result<T, rmcp::ErrorData>
    where
        T: Send + 'static,
        F: FnOnce(&Pipeline) -> T + Send + 'static,
    {
        let pipeline = Arc::clone(&self.pipeline);
        tokio::task::spawn_blocking(move || f(&pipeline))
            .await
            .map_err(|e| mcp_error("pipeline task failed", e))
    }
}

#[tool_router(router = tool_router)]
impl MedragMcpServer {
    /// Chunk, embed and store one document.
    #[tool(
        name = "medrag_ingest",
        description = "Ingest a PDF, text or markdown file so its contents can be used to answer questions."
    )]
    pub async fn medrag_ingest(
        &self,
        params: Parameters<IngestParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let path = PathBuf::from(params.0.path);
        let report = self.run_blocking(move |p| p.ingest(&path)).await?;

        let structured = serde_json::to_value(&report)
            .map_err(|e| mcp_error("failed to serialize report", e))?;

        let mut result = CallToolResult::success(vec![Content::text(report.message().to_string())]);
        result.structured_content = Some(structured);
        result.is_error = Some(!report.success());
        Ok(result)
    }

    /// Answer a question from the ingested documents.
    #[tool(
        name = "medrag_answer",
        description = "Answer a medical question using the ingested documents. Returns the answer with the source file, page and split it was drawn from."
    )]
    pub async fn medrag_answer(
        &self,
        params: Parameters<AnswerParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let query = params.0.into_query();
        let outcome = self.run_blocking(move |p| p.answer(&query)).await?;

        let summary = format_answer_summary(&outcome);
        let structured = serde_json::to_value(&outcome)
            .map_err(|e| mcp_error("failed to serialize answer", e))?;

        let mut result = CallToolResult::success(vec![Content::text(summary)]);
        result.structured_content = Some(structured);
        result.is_error = Some(!outcome.is_answered());
        Ok(result)
    }

    /// Delete every stored segment.
    #[tool(
        name = "medrag_reset",
        description = "Delete every ingested document segment. Questions will get the fallback answer until new documents are ingested."
    )]
    pub async fn medrag_reset(&self) -> Result<CallToolResult, rmcp::ErrorData> {
        self.run_blocking(|p| p.reset().map_err(|e| e.to_string()))
            .await?
            .map_err(|e| mcp_error("reset failed", e))?;

        let mut result = CallToolResult::success(vec![Content::text("All stored segments deleted.")]);
        result.structured_content = Some(json!({ "success": true }));
        result.is_error = Some(false);
        Ok(result)
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for MedragMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_server_info(
                Implementation::new("medrag", env!("CARGO_PKG_VERSION")).with_title("medrag MCP"),
            )
            .with_instructions(
                "Use medrag_ingest to add documents, then medrag_answer to ask questions about them. Cite the returned doc and page.",
            )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngestParams {
    /// Path of the file to ingest (.pdf, .txt or .md).
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerParams {
    /// The question to answer.
    pub question: String,
    /// Number of segments to retrieve (default: 5).
    pub top_k: Option<usize>,
    /// Minimum cosine similarity in (0, 1] (default: 0.3).
    pub score_threshold: Option<f32>,
    /// Re-rank by question word overlap (default: true).
    pub rerank: Option<bool>,
    /// Re-rank by corpus-wide BM25 first (default: false).
    pub bm25: Option<bool>,
}

impl AnswerParams {
    fn into_query(self) -> QueryParams {
        let defaults = QueryParams::new(self.question);
        QueryParams {
            top_k: self.top_k.unwrap_or(defaults.top_k),
            score_threshold: self
                .score_threshold
                .unwrap_or(defaults.score_threshold),
            rerank: self.rerank.unwrap_or(defaults.rerank),
            bm25: self.bm25.unwrap_or(defaults.bm25),
            ..defaults
        }
    }
}

fn format_answer_summary(outcome: &QueryOutcome) -> String {
    match outcome {
        QueryOutcome::Answered(answer) => match answer.metadata {
            Some(ref meta) => format!(
                "{}\n\nSource: {} (page {}, split {})",
                answer.answer, meta.source, meta.page, meta.split
            ),
            None => answer.answer.clone(),
        },
        QueryOutcome::Failed { error } => error.clone(),
    }
}

fn mcp_error(message: &str, error: impl std::fmt::Display) -> rmcp::ErrorData {
    rmcp::ErrorData::internal_error(
        message.to_string(),
        Some(json!({ "error": error.to_string() })),
    )
}

/// Serve the pipeline over stdio until the client disconnects.
pub fn run_mcp(pipeline: Pipeline) -> error::Result<()> {
    // The pipeline may own blocking HTTP clients, which must not be dropped
    // on a runtime thread; this handle outlives the runtime.
    let pipeline = Arc::new(pipeline);
    let server = MedragMcpServer::new(Arc::clone(&pipeline));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            error::Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;

    let result = runtime.block_on(async move {
        let transport = rmcp::transport::stdio();
        let running = server.serve(transport).await.map_err(|e| {
            error::Error::Config(format!(
                "MCP server initialization failed: {e}"
            ))
        })?;
        running.waiting().await.map_err(|e| {
            error::Error::Config(format!("MCP server error: {e}"))
        })?;
        Ok(())
    });

    drop(runtime);
    drop(pipeline);
    result
}
