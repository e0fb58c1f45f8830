// Archiver Appliance client - executes built requests over HTTP
use crate::application::archive_client::{ArchiveClient, ArchiveRequest, HttpMethod, RawResponse};
use crate::domain::error::FetchError;
use async_trait::async_trait;

/// Shares one connection pool across all requests.
#[derive(Debug, Clone)]
pub struct HttpArchiveClient {
    client: reqwest::Client,
}

impl HttpArchiveClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("archive-viewer/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

fn transport(err: reqwest::Error) -> FetchError {
    FetchError::Transport {
        message: err.to_string(),
    }
}

#[async_trait]
impl ArchiveClient for HttpArchiveClient {
    async fn execute(&self, request: &ArchiveRequest) -> Result<RawResponse, FetchError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        tracing::debug!(pv = %request.label, url = %request.url, "Sending archive request");
        let response = builder.send().await.map_err(transport)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Http { status, body });
        }

        let text = response.text().await.map_err(transport)?;
        serde_json::from_str(&text).map_err(|e| {
            FetchError::malformed(format!("archive response for {} is not JSON: {}", request.label, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::request_builder::RequestBuilder;
    use crate::domain::binning::ResolvedBinning;
    use crate::domain::operator::Operator;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use chrono::{FixedOffset, TimeZone, Utc};
    use serde_json::{Value, json};
    use std::collections::HashMap;

    async fn get_data(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
        Json(json!([{
            "meta": { "name": params.get("pv"), "EGU": "mA" },
            "data": [],
            "echo": params,
        }]))
    }

    async fn get_data_at_time(
        Query(params): Query<HashMap<String, String>>,
        Json(pvs): Json<Vec<String>>,
    ) -> Json<Value> {
        let mut snapshot = serde_json::Map::new();
        for pv in pvs {
            snapshot.insert(pv, json!({ "secs": 5, "nanos": 0, "val": 1.0, "at": params.get("at") }));
        }
        Json(Value::Object(snapshot))
    }

    async fn spawn_stub() -> String {
        let router = Router::new()
            .route("/data/getData.json", get(get_data))
            .route("/data/getDataAtTime", post(get_data_at_time))
            .route(
                "/broken/getData.json",
                get(|| async { (StatusCode::NOT_FOUND, "no such PV") }),
            )
            .route("/garbage/getData.json", get(|| async { "<html>oops</html>" }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[tokio::test]
    async fn test_range_request_round_trip() {
        let base = spawn_stub().await;
        let builder = RequestBuilder::new(&format!("{}/data", base), utc(), true);
        let from = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
        let binning = ResolvedBinning::Binned {
            operator: Operator::Mean,
            bin_size_secs: 900,
        };

        let request = builder.build("SOME:PV:NAME", from, to, &binning);
        let body = HttpArchiveClient::new().unwrap().execute(&request).await.unwrap();

        let echo = &body[0]["echo"];
        assert_eq!(echo["pv"], "mean_900(SOME:PV:NAME)");
        assert_eq!(echo["from"], "2024-03-01T00:00:00.000-00:00");
        assert_eq!(echo["to"], "2024-03-02T00:00:00.000-00:00");
        assert_eq!(echo["donotchunk"], "true");
    }

    #[tokio::test]
    async fn test_point_in_time_round_trip() {
        let base = spawn_stub().await;
        let builder = RequestBuilder::new(&format!("{}/data", base), utc(), false);
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();

        let request = builder.build_at_time(&["A:B".to_string(), "C:D".to_string()], at);
        let body = HttpArchiveClient::new().unwrap().execute(&request).await.unwrap();

        assert_eq!(body["A:B"]["secs"], 5);
        assert_eq!(body["C:D"]["at"], "2024-03-01T08:00:00.000-00:00");
    }

    #[tokio::test]
    async fn test_http_error_carries_status_and_body() {
        let base = spawn_stub().await;
        let builder = RequestBuilder::new(&format!("{}/broken", base), utc(), false);
        let request = builder.build(
            "A",
            Utc.timestamp_opt(0, 0).unwrap(),
            Utc.timestamp_opt(60, 0).unwrap(),
            &ResolvedBinning::Raw,
        );

        let err = HttpArchiveClient::new().unwrap().execute(&request).await.unwrap_err();
        assert_eq!(
            err,
            FetchError::Http {
                status: 404,
                body: "no such PV".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_non_json_body_is_malformed() {
        let base = spawn_stub().await;
        let builder = RequestBuilder::new(&format!("{}/garbage", base), utc(), false);
        let request = builder.build(
            "A",
            Utc.timestamp_opt(0, 0).unwrap(),
            Utc.timestamp_opt(60, 0).unwrap(),
            &ResolvedBinning::Raw,
        );

        let err = HttpArchiveClient::new().unwrap().execute(&request).await.unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        // bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let builder = RequestBuilder::new(&format!("http://{}", addr), utc(), false);
        let request = builder.build(
            "A",
            Utc.timestamp_opt(0, 0).unwrap(),
            Utc.timestamp_opt(60, 0).unwrap(),
            &ResolvedBinning::Raw,
        );

        let err = HttpArchiveClient::new().unwrap().execute(&request).await.unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }));
    }
}
