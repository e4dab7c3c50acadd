// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Document search used to ground AI replies.
//!
//! Queries an Azure AI Search style index (`POST
//! {endpoint}/indexes/{index}/docs/search`). Failures degrade to "no
//! documents" so that a search outage never blocks a reply.

use std::time::Duration;

use tracing::{debug, warn};

use concierge_config::model::SearchConfig;

use crate::types::{SearchDocument, SearchRequest, SearchResponse};

const API_VERSION: &str = "2023-11-01";

/// Characters of each document included in the prompt.
const DOC_EXCERPT_CHARS: usize = 500;

pub struct DocumentSearch {
    client: reqwest::Client,
    config: SearchConfig,
}

impl DocumentSearch {
    pub fn new(config: SearchConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    pub fn top(&self) -> usize {
        self.config.top
    }

    /// Top matching documents for `query`; empty on any failure.
    pub async fn search(&self, query: &str) -> Vec<SearchDocument> {
        match self.try_search(query).await {
            Ok(docs) => {
                debug!(found = docs.len(), "document search complete");
                docs
            }
            Err(e) => {
                warn!(error = %e, "document search failed, continuing without documents");
                Vec::new()
            }
        }
    }

    async fn try_search(&self, query: &str) -> Result<Vec<SearchDocument>, reqwest::Error> {
        let url = format!(
            "{}/indexes/{}/docs/search?api-version={API_VERSION}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.index
        );
        let mut request = self.client.post(&url).json(&SearchRequest {
            search: query.to_string(),
            top: self.config.top,
            select: "title,content,category".to_string(),
        });
        if let Some(key) = &self.config.api_key {
            request = request.header("api-key", key);
        }
        let response: SearchResponse = request.send().await?.error_for_status()?.json().await?;
        Ok(response.value)
    }
}

/// Render retrieved documents as a prompt section.
pub fn build_context(docs: &[SearchDocument]) -> String {
    if docs.is_empty() {
        return "\n=== NO SE ENCONTRO INFORMACION ESPECIFICA ===\n\
                No hay informacion en la base de conocimientos para esta consulta.\n\
                Responde honestamente que no tienes esa informacion y ofrece ayuda alternativa.\n"
            .to_string();
    }

    let mut context = String::from(
        "\n=== INFORMACION DE LA BASE DE CONOCIMIENTOS INTERNA ===\n\
         Esta es informacion OFICIAL de la empresa. Usala para responder.\n\n",
    );
    for (i, doc) in docs.iter().enumerate() {
        let excerpt: String = doc.content.chars().take(DOC_EXCERPT_CHARS).collect();
        context.push_str(&format!("[Documento {}]\n", i + 1));
        context.push_str(&format!("Titulo: {}\n", doc.title));
        context.push_str(&format!("Contenido: {excerpt}\n"));
        if let Some(category) = doc.category.as_deref().filter(|c| !c.is_empty()) {
            context.push_str(&format!("Categoria: {category}\n"));
        }
        context.push_str("---\n");
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(endpoint: &str) -> SearchConfig {
        SearchConfig {
            endpoint: endpoint.to_string(),
            index: "kb".into(),
            api_key: Some("search-key".into()),
            top: 2,
        }
    }

    fn doc(title: &str, content: &str) -> SearchDocument {
        SearchDocument {
            title: title.into(),
            content: content.into(),
            category: None,
            score: 1.0,
        }
    }

    #[tokio::test]
    async fn search_posts_query_and_reads_documents() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/indexes/kb/docs/search"))
            .and(query_param("api-version", API_VERSION))
            .and(header("api-key", "search-key"))
            .and(body_partial_json(serde_json::json!({"search": "servicios", "top": 2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [
                    {"@search.score": 2.0, "title": "Servicios", "content": "Nube", "category": "general"}
                ]
            })))
            .mount(&server)
            .await;

        let docs = DocumentSearch::new(config(&server.uri()))
            .search("servicios")
            .await;
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].title, "Servicios");
        assert_eq!(docs[0].category.as_deref(), Some("general"));
    }

    #[tokio::test]
    async fn search_failure_yields_no_documents() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let docs = DocumentSearch::new(config(&server.uri())).search("x").await;
        assert!(docs.is_empty());
    }

    #[test]
    fn context_lists_documents_with_excerpts() {
        let long = "a".repeat(DOC_EXCERPT_CHARS + 100);
        let context = build_context(&[doc("Uno", "contenido"), doc("Dos", &long)]);
        assert!(context.contains("[Documento 1]"));
        assert!(context.contains("Titulo: Dos"));
        assert!(!context.contains(&long));
        assert!(context.contains(&"a".repeat(DOC_EXCERPT_CHARS)));
    }

    #[test]
    fn empty_context_tells_model_to_admit_ignorance() {
        assert!(build_context(&[]).contains("NO SE ENCONTRO"));
    }
}
