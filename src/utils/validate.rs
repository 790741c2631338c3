use crate::error::{AppError, AppResult};
use axum::extract::{FromRequest, FromRequestParts, Json, Query, Request};
use axum::http::request::Parts;
use serde::de::DeserializeOwned;
use validator::Validate;

/// JSON body that has passed its `validator` rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> AppResult<Self> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

/// Query string that has passed its `validator` rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> AppResult<Self> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        value.validate()?;
        Ok(ValidatedQuery(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, header};
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Validate)]
    struct ReasonBody {
        #[validate(length(min = 1, max = 20, message = "Reason must be between 1 and 20 characters"))]
        reason: String,
        #[validate(range(min = 1, max = 10, message = "Attempts must be between 1 and 10"))]
        attempts: i32,
    }

    #[derive(Debug, Deserialize, Validate)]
    struct PageQuery {
        #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
        limit: i64,
    }

    fn json_request(body: &str, content_type: &str) -> Request {
        Request::builder()
            .method(Method::POST)
            .uri("/test")
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_valid_json() {
        let request = json_request(r#"{"reason":"opted out","attempts":2}"#, "application/json");
        let ValidatedJson(body) = ValidatedJson::<ReasonBody>::from_request(request, &())
            .await
            .unwrap();
        assert_eq!(body.reason, "opted out");
        assert_eq!(body.attempts, 2);
    }

    #[tokio::test]
    async fn test_json_validation_errors_are_collected() {
        let request = json_request(r#"{"reason":"","attempts":50}"#, "application/json");
        let error = ValidatedJson::<ReasonBody>::from_request(request, &())
            .await
            .unwrap_err();
        match error {
            AppError::ValidationErrors { errors } => {
                assert_eq!(errors.len(), 2);
                assert_eq!(errors[0].field, "attempts");
                assert!(errors[1].message.contains("between 1 and 20"));
            }
            other => panic!("Expected ValidationErrors, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_json_rejection_is_bad_request() {
        let request = json_request(r#"{"reason":"x"}"#, "application/json");
        let error = ValidatedJson::<ReasonBody>::from_request(request, &())
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::BadRequest { ref message } if !message.is_empty()));

        let request = json_request(r#"{"reason":"x","attempts":1}"#, "text/plain");
        let error = ValidatedJson::<ReasonBody>::from_request(request, &())
            .await
            .unwrap_err();
        assert_eq!(error.code(), "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_query_validation() {
        let request = Request::builder().uri("/test?limit=20").body(Body::empty()).unwrap();
        let (mut parts, _) = request.into_parts();
        let ValidatedQuery(query) = ValidatedQuery::<PageQuery>::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(query.limit, 20);

        let request = Request::builder().uri("/test?limit=500").body(Body::empty()).unwrap();
        let (mut parts, _) = request.into_parts();
        let error = ValidatedQuery::<PageQuery>::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(error.code(), "VALIDATION_ERROR");

        let request = Request::builder().uri("/test?limit=abc").body(Body::empty()).unwrap();
        let (mut parts, _) = request.into_parts();
        let error = ValidatedQuery::<PageQuery>::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(error.code(), "BAD_REQUEST");
    }
}
