//! Free-text questions in, filtered tabular results out.
//!
//! The proxy drives one conversation turn against the analyst service and
//! runs any SQL the analyst returns through the fetcher's read-only
//! warehouse path. The result has the same shape as a fetched table, so
//! callers re-enter the filter and presentation stages with it.

use std::sync::Arc;

use imint::{AnalystReply, AnalystRequest, Conversation, ImintError, QueryResult};
use serde::Serialize;

use crate::analyst::{AnalystApi, AnalystError};
use crate::fetcher::Fetcher;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error(transparent)]
    Analyst(#[from] AnalystError),

    #[error(transparent)]
    Conversation(#[from] ImintError),
}

/// Everything one question produced.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyOutcome {
    pub reply: AnalystReply,
    /// Rows of the returned SQL, when there was SQL and it ran.
    pub result: Option<QueryResult>,
    /// Why the returned SQL did not run.
    pub sql_error: Option<String>,
}

#[derive(Clone)]
pub struct QueryProxy {
    api: Arc<dyn AnalystApi>,
    semantic_model_file: String,
}

impl QueryProxy {
    pub fn new(api: Arc<dyn AnalystApi>, semantic_model_file: impl Into<String>) -> Self {
        Self {
            api,
            semantic_model_file: semantic_model_file.into(),
        }
    }

    /// Ask `question` within `conv`.
    ///
    /// On any failure the pending turn is marked failed and kept in the
    /// history. The conversation is left in `Answered` or `Failed`; the
    /// caller acknowledges it once the outcome has been shown.
    pub async fn converse(
        &self,
        conv: &mut Conversation,
        question: &str,
    ) -> Result<AnalystReply, ProxyError> {
        let messages = conv.begin(question)?;
        let request = AnalystRequest {
            messages,
            semantic_model_file: self.semantic_model_file.clone(),
        };
        match self.api.send(&request).await {
            Ok(response) => Ok(conv.complete(response)?),
            Err(e) => {
                tracing::warn!("analyst call failed: {e}");
                conv.fail(e.to_string())?;
                Err(e.into())
            }
        }
    }

    /// Ask, then execute any returned SQL.
    pub async fn ask(
        &self,
        conv: &mut Conversation,
        question: &str,
        fetcher: &Fetcher,
    ) -> Result<ProxyOutcome, ProxyError> {
        let reply = self.converse(conv, question).await?;
        let (result, sql_error) = execute_reply(fetcher, &reply);
        Ok(ProxyOutcome {
            reply,
            result,
            sql_error,
        })
    }
}

/// Run the reply's SQL, if any. A failed statement is reported, not raised.
pub fn execute_reply(
    fetcher: &Fetcher,
    reply: &AnalystReply,
) -> (Option<QueryResult>, Option<String>) {
    let Some(sql) = reply.sql.as_deref() else {
        return (None, None);
    };
    match fetcher.execute(sql) {
        Ok(result) => {
            tracing::info!("analyst sql returned {} rows", result.len());
            (Some(result), None)
        }
        Err(e) => {
            tracing::warn!("analyst sql failed: {e}");
            (None, Some(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presign::UrlSigner;
    use crate::warehouse::{schema, SqliteWarehouse};
    use async_trait::async_trait;
    use imint::{AnalystResponse, ContentBlock, ConversationState, Message, Role};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays canned responses and records requests.
    struct Scripted {
        responses: Mutex<Vec<Result<AnalystResponse, AnalystError>>>,
        seen: Mutex<Vec<AnalystRequest>>,
    }

    impl Scripted {
        fn new(mut responses: Vec<Result<AnalystResponse, AnalystError>>) -> Arc<Self> {
            responses.reverse();
            Arc::new(Self {
                responses: Mutex::new(responses),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl AnalystApi for Scripted {
        async fn send(&self, request: &AnalystRequest) -> Result<AnalystResponse, AnalystError> {
            self.seen.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(AnalystError::NotConfigured))
        }
    }

    fn answer(blocks: Vec<ContentBlock>) -> AnalystResponse {
        AnalystResponse {
            message: Message {
                role: Role::Analyst,
                content: blocks,
            },
            request_id: Some("r".into()),
            warnings: Vec::new(),
        }
    }

    fn fetcher() -> (tempfile::TempDir, Fetcher) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wh.db");
        schema::init(&path, true).unwrap();
        let signer = UrlSigner::new("k", "https://imagery.localhost").unwrap();
        let wh = SqliteWarehouse::open(&path, signer, Duration::from_secs(1)).unwrap();
        (dir, Fetcher::new(Box::new(wh), Duration::from_secs(60), "@s", 60))
    }

    #[tokio::test]
    async fn test_ask_executes_sql() {
        let api = Scripted::new(vec![Ok(answer(vec![
            ContentBlock::Text {
                text: "Images per region.".into(),
            },
            ContentBlock::Sql {
                statement: "SELECT bay_region, COUNT(*) AS n FROM silver_imagery_metadata GROUP BY bay_region ORDER BY bay_region".into(),
                confidence: None,
            },
        ]))]);
        let proxy = QueryProxy::new(api.clone(), "@stage/model.yaml");
        let (_dir, f) = fetcher();
        let mut conv = Conversation::default();

        let out = proxy.ask(&mut conv, "images per region?", &f).await.unwrap();
        let result = out.result.unwrap();
        assert_eq!(result.column_names(), vec!["bay_region", "n"]);
        assert_eq!(result.len(), 4);
        assert!(out.sql_error.is_none());
        assert_eq!(conv.state(), ConversationState::Answered);
        assert_eq!(
            api.seen.lock().unwrap()[0].semantic_model_file,
            "@stage/model.yaml"
        );
    }

    #[tokio::test]
    async fn test_write_sql_reported_not_run() {
        let api = Scripted::new(vec![Ok(answer(vec![ContentBlock::Sql {
            statement: "DELETE FROM silver_imagery_metadata".into(),
            confidence: None,
        }]))]);
        let proxy = QueryProxy::new(api, "m");
        let (_dir, f) = fetcher();
        let mut conv = Conversation::default();

        let out = proxy.ask(&mut conv, "clean up", &f).await.unwrap();
        assert!(out.result.is_none());
        assert!(out.sql_error.unwrap().contains("read-only"));
        let n = f
            .execute("SELECT COUNT(*) AS n FROM silver_imagery_metadata")
            .unwrap();
        assert_eq!(n.row(0).unwrap().int("n"), Some(5));
    }

    #[tokio::test]
    async fn test_failed_turn_kept_but_not_replayed() {
        let api = Scripted::new(vec![
            Err(AnalystError::Status {
                status: 500,
                body: "boom".into(),
            }),
            Ok(answer(vec![ContentBlock::Text { text: "ok".into() }])),
        ]);
        let proxy = QueryProxy::new(api.clone(), "m");
        let mut conv = Conversation::default();

        assert!(proxy.converse(&mut conv, "first").await.is_err());
        assert_eq!(conv.state(), ConversationState::Failed);
        conv.acknowledge().unwrap();

        proxy.converse(&mut conv, "second").await.unwrap();
        assert_eq!(conv.turns().len(), 2);
        assert!(conv.turns()[0].error().unwrap().contains("boom"));

        // the failed question is not sent again
        let seen = api.seen.lock().unwrap();
        assert_eq!(seen[1].messages, vec![Message::user_text("second")]);
    }

    #[tokio::test]
    async fn test_out_of_order_question_rejected() {
        let api = Scripted::new(vec![Ok(answer(vec![ContentBlock::Text { text: "a".into() }]))]);
        let proxy = QueryProxy::new(api, "m");
        let mut conv = Conversation::default();
        proxy.converse(&mut conv, "q1").await.unwrap();
        // not acknowledged yet
        assert!(matches!(
            proxy.converse(&mut conv, "q2").await,
            Err(ProxyError::Conversation(ImintError::ConversationState { .. }))
        ));
    }
}
