//! Demo query engine: every operation is a counter.
//!
//! The query text is not parsed. Variables control the stream:
//! `count` (default 10, `0` for endless) and `intervalMs` (default 1000,
//! at least 1).

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use gqlws_server::{OperationContext, OperationRequest, ResultStream, SubscribeError, Subscriber};
use serde_json::{Value, json};

const DEFAULT_COUNT: u64 = 10;
const DEFAULT_INTERVAL_MS: u64 = 1_000;

/// Counter engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ticker;

#[async_trait]
impl Subscriber for Ticker {
    async fn subscribe(
        &self,
        ctx: OperationContext,
        request: OperationRequest,
    ) -> Result<ResultStream, SubscribeError> {
        if request.query.trim().is_empty() {
            return Err(SubscribeError::Rejected("query must not be empty".into()));
        }
        let count = read_u64(&request, "count")?.unwrap_or(DEFAULT_COUNT);
        let interval_ms = read_u64(&request, "intervalMs")?.unwrap_or(DEFAULT_INTERVAL_MS);
        if interval_ms == 0 {
            return Err(SubscribeError::Rejected(
                "variable `intervalMs` must be at least 1".into(),
            ));
        }
        let interval = Duration::from_millis(interval_ms);
        tracing::debug!(
            operation_id = %ctx.operation_id,
            count,
            interval_ms,
            "ticker started"
        );

        let name = request.operation_name;
        let stream = async_stream::stream! {
            let mut tick: u64 = 0;
            while count == 0 || tick < count {
                tokio::time::sleep(interval).await;
                tick += 1;
                yield json!({"data": {"ticker": {"tick": tick, "operationName": name}}});
            }
        };
        Ok(stream.boxed())
    }
}

fn read_u64(request: &OperationRequest, name: &str) -> Result<Option<u64>, SubscribeError> {
    match request.variables.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| {
                SubscribeError::Rejected(format!(
                    "variable `{name}` must be a non-negative integer"
                ))
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gqlws_server::ConnectionContext;
    use tokio_util::sync::CancellationToken;

    fn request(variables: Value) -> OperationRequest {
        let Value::Object(variables) = variables else {
            panic!("variables must be an object");
        };
        OperationRequest {
            query: "subscription { ticker }".into(),
            operation_name: "Tick".into(),
            variables,
        }
    }

    fn ctx() -> OperationContext {
        OperationContext::new(ConnectionContext::new("c"), "1", CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn yields_count_ticks_then_ends() {
        let stream = Ticker
            .subscribe(ctx(), request(json!({"count": 3, "intervalMs": 10})))
            .await
            .unwrap();
        let values: Vec<Value> = stream.collect().await;
        assert_eq!(values.len(), 3);
        assert_eq!(values[0]["data"]["ticker"]["tick"], 1);
        assert_eq!(values[2]["data"]["ticker"]["tick"], 3);
        assert_eq!(values[2]["data"]["ticker"]["operationName"], "Tick");
    }

    #[tokio::test(start_paused = true)]
    async fn zero_count_is_endless() {
        let stream = Ticker
            .subscribe(ctx(), request(json!({"count": 0, "intervalMs": 1})))
            .await
            .unwrap();
        let values: Vec<Value> = stream.take(25).collect().await;
        assert_eq!(values.len(), 25);
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let mut req = request(json!({}));
        req.query = "   ".into();
        let Err(err) = Ticker.subscribe(ctx(), req).await else {
            panic!("expected rejection");
        };
        assert!(matches!(err, SubscribeError::Rejected(_)));
    }

    #[tokio::test]
    async fn non_integer_variable_is_rejected() {
        let Err(err) = Ticker
            .subscribe(ctx(), request(json!({"count": "three"})))
            .await
        else {
            panic!("expected rejection");
        };
        assert_eq!(
            err.to_string(),
            "variable `count` must be a non-negative integer"
        );
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let Err(err) = Ticker
            .subscribe(ctx(), request(json!({"count": 0, "intervalMs": 0})))
            .await
        else {
            panic!("expected rejection");
        };
        assert!(matches!(err, SubscribeError::Rejected(_)));
        assert_eq!(err.to_string(), "variable `intervalMs` must be at least 1");
    }

    #[test]
    fn null_variable_uses_default() {
        assert_eq!(read_u64(&request(json!({"count": null})), "count").unwrap(), None);
        assert_eq!(read_u64(&request(json!({"count": 7})), "count").unwrap(), Some(7));
    }
}
