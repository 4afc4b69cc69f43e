use async_trait::async_trait;
use std::future::Future;

/// Post-processes a backend response before it reaches the client.
#[async_trait]
pub trait ResponseHandler<T, D>: Send + Sync
where
    T: Send + 'static,
    D: Send + 'static,
{
    async fn handle(&self, response: T) -> anyhow::Result<D>;
}

/// Pass-through handler: the backend response is the client response.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHandler;

#[async_trait]
impl<T> ResponseHandler<T, T> for DefaultHandler
where
    T: Send + 'static,
{
    async fn handle(&self, response: T) -> anyhow::Result<T> {
        Ok(response)
    }
}

#[async_trait]
impl<T, D, F, Fut> ResponseHandler<T, D> for F
where
    T: Send + 'static,
    D: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<D>> + Send + 'static,
{
    async fn handle(&self, response: T) -> anyhow::Result<D> {
        (self)(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_default_handler_is_identity() {
        let data = json!({"id": 1, "name": "test"});
        let result: Value = DefaultHandler.handle(data.clone()).await.unwrap();
        assert_eq!(result, data);

        let result: Value = DefaultHandler.handle(Value::Null).await.unwrap();
        assert!(result.is_null());
    }

    #[tokio::test]
    async fn test_closure_handler_transforms() {
        let handler = |response: Value| async move {
            Ok::<_, anyhow::Error>(response["docs"].as_array().map(|d| d.len()).unwrap_or(0))
        };
        let count = handler
            .handle(json!({"docs": [{"id": "1"}, {"id": "2"}]}))
            .await
            .unwrap();
        assert_eq!(count, 2);
    }
}
