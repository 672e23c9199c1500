//! Mocked API server for lifecycle tests

use http::{Method, Request, Response, StatusCode};
use hyper::Body;
use kube::Client;
use serde_json::{json, Value};

use super::KubeCluster;

type ApiServerHandle = tower_test::mock::Handle<Request<Body>, Response<Body>>;

/// One expected request and the canned answer to it
pub struct Exchange {
    method: Method,
    path: String,
    status: StatusCode,
    body: Value,
    any_name: bool,
}

impl Exchange {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            status: StatusCode::OK,
            body: json!({}),
            any_name: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn respond(mut self, status: u16, body: Value) -> Self {
        self.status = StatusCode::from_u16(status).expect("valid status code");
        self.body = body;
        self
    }

    pub fn ok(self, body: Value) -> Self {
        self.respond(200, body)
    }

    /// Accept any object name under the collection `path`
    pub fn any_name(mut self) -> Self {
        self.any_name = true;
        self
    }
}

/// Request as seen by the mock server
#[derive(Debug)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub body: Value,
}

/// `Status` document the API server returns on failures
pub fn status_failure(code: u16, reason: &str) -> Value {
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": format!("{reason} ({code})"),
        "reason": reason,
        "code": code
    })
}

pub fn status_success() -> Value {
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Success"
    })
}

pub struct ApiServer(ApiServerHandle);

impl ApiServer {
    /// Answer `script` in order, panicking on anything unexpected
    pub fn run(self, script: Vec<Exchange>) -> tokio::task::JoinHandle<Vec<Recorded>> {
        tokio::spawn(async move {
            let mut handle = self.0;
            let mut recorded = Vec::new();

            for exchange in script {
                let (request, send) = handle.next_request().await.expect("service not called");

                assert_eq!(request.method(), exchange.method, "{:?}", request.uri());
                if exchange.any_name {
                    let collection = format!("{}/", exchange.path.trim_end_matches('/'));
                    assert!(
                        request.uri().path().starts_with(&collection),
                        "{} is not under {}",
                        request.uri().path(),
                        collection
                    );
                } else {
                    assert_eq!(request.uri().path(), exchange.path);
                }

                let method = request.method().clone();
                let path = request.uri().path().to_string();
                let bytes = hyper::body::to_bytes(request.into_body())
                    .await
                    .expect("request body");
                let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
                recorded.push(Recorded { method, path, body });

                let response = serde_json::to_vec(&exchange.body).unwrap();
                send.send_response(
                    Response::builder()
                        .status(exchange.status)
                        .body(Body::from(response))
                        .unwrap(),
                );
            }

            recorded
        })
    }
}

/// Cluster bound to project `default` backed by a mock server
pub fn mock_cluster() -> (KubeCluster, ApiServer) {
    let (service, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
    let client = Client::new(service, "default");
    (KubeCluster::from_client(client, "default"), ApiServer(handle))
}

pub async fn finish(server: tokio::task::JoinHandle<Vec<Recorded>>) -> Vec<Recorded> {
    tokio::time::timeout(std::time::Duration::from_secs(1), server)
        .await
        .expect("timeout on mock apiserver")
        .expect("scenario succeeded")
}
