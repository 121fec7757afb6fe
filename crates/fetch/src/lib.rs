use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;
use url::Url;

use spinneret_core::{AbortReason, CrawlConfig, CrawlError, FetchResponse};

/// Content types the crawler will parse. Everything else is rejected before
/// the body is read.
pub const ACCEPTED_CONTENT_TYPES: &[&str] = &["text/html", "application/xhtml", "text/"];

/// Tuning for the HTTP layer, lifted out of the full crawl config so the
/// fetcher can be built without one.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub user_agent: String,
    pub request_timeout: Duration,
    pub body_timeout: Duration,
    pub max_body_size: usize,
}

impl FetchOptions {
    pub fn from_config(config: &CrawlConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            request_timeout: config.request_timeout(),
            body_timeout: config.body_timeout(),
            max_body_size: config.max_body_size,
        }
    }
}

/// Timeout-bounded HTTP GET with a content-type gate and streaming body
/// assembly. Follows whatever redirect policy the client defaults to; the
/// final URL after redirects is what gets parsed.
pub struct HttpFetcher {
    client: reqwest::Client,
    options: FetchOptions,
}

impl HttpFetcher {
    pub fn new(options: FetchOptions) -> Result<Self, CrawlError> {
        let client = reqwest::Client::builder()
            .user_agent(&options.user_agent)
            .connect_timeout(options.request_timeout)
            .build()
            .map_err(|e| CrawlError::Config(format!("http client: {e}")))?;
        Ok(Self { client, options })
    }

    pub async fn fetch(&self, url: &Url) -> Result<FetchResponse, CrawlError> {
        let start = Instant::now();
        debug!(url = %url, "fetching");

        let send = self.client.get(url.as_str()).send();
        let resp = match tokio::time::timeout(self.options.request_timeout, send).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => return Err(map_send_error(url, start, e)),
            Err(_) => {
                return Err(CrawlError::RequestAbort {
                    url: url.to_string(),
                    duration_ms: start.elapsed().as_millis() as u64,
                    reason: AbortReason::Timeout,
                })
            }
        };

        let status = resp.status().as_u16();
        let final_url = Url::parse(resp.url().as_str()).unwrap_or_else(|_| url.clone());

        let mut headers = HashMap::new();
        for (k, v) in resp.headers() {
            if let Ok(val) = v.to_str() {
                headers.insert(k.as_str().to_string(), val.to_string());
            }
        }
        let content_type = headers.get("content-type").cloned();

        if !content_type_accepted(content_type.as_deref()) {
            return Err(CrawlError::ContentTypeReject {
                url: url.to_string(),
                got: content_type,
                accepted: ACCEPTED_CONTENT_TYPES,
            });
        }

        let body = self.read_body(url, resp).await?;

        Ok(FetchResponse {
            url: url.clone(),
            final_url,
            status,
            headers,
            body,
            content_type,
            fetched_at: chrono::Utc::now(),
            response_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Stream the body chunk by chunk under the body timeout, bounding total
    /// size as it accumulates.
    async fn read_body(&self, url: &Url, mut resp: reqwest::Response) -> Result<Vec<u8>, CrawlError> {
        let started = Instant::now();
        let max = self.options.max_body_size;
        let read = async {
            let mut body: Vec<u8> = Vec::new();
            loop {
                match resp.chunk().await {
                    Ok(Some(chunk)) => {
                        if body.len() + chunk.len() > max {
                            return Err(CrawlError::Response {
                                url: url.to_string(),
                                cause: format!("body exceeds {max} bytes"),
                            });
                        }
                        body.extend_from_slice(&chunk);
                    }
                    Ok(None) => return Ok(body),
                    Err(e) => {
                        return Err(CrawlError::Response {
                            url: url.to_string(),
                            cause: e.to_string(),
                        })
                    }
                }
            }
        };
        match tokio::time::timeout(self.options.body_timeout, read).await {
            Ok(result) => result,
            Err(_) => Err(CrawlError::RequestAbort {
                url: url.to_string(),
                duration_ms: started.elapsed().as_millis() as u64,
                reason: AbortReason::Timeout,
            }),
        }
    }
}

/// Accept `text/html`, `application/xhtml*`, any `text/*`, or a missing or
/// empty header.
pub fn content_type_accepted(content_type: Option<&str>) -> bool {
    let Some(raw) = content_type else {
        return true;
    };
    let ct = raw.trim().to_ascii_lowercase();
    ct.is_empty()
        || ct.contains("text/html")
        || ct.contains("application/xhtml")
        || ct.starts_with("text/")
}

fn map_send_error(url: &Url, start: Instant, error: reqwest::Error) -> CrawlError {
    if error.is_timeout() {
        CrawlError::RequestAbort {
            url: url.to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
            reason: AbortReason::Timeout,
        }
    } else if error.is_body() || error.is_decode() {
        CrawlError::Response {
            url: url.to_string(),
            cause: error.to_string(),
        }
    } else {
        CrawlError::Network {
            url: url.to_string(),
            cause: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn content_type_gate() {
        assert!(content_type_accepted(None));
        assert!(content_type_accepted(Some("")));
        assert!(content_type_accepted(Some("text/html; charset=utf-8")));
        assert!(content_type_accepted(Some("application/xhtml+xml")));
        assert!(content_type_accepted(Some("text/plain")));
        assert!(!content_type_accepted(Some("image/png")));
        assert!(!content_type_accepted(Some("application/json")));
    }

    async fn serve_once(status_line: &'static str, headers: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "{status_line}\r\n{headers}Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}/")
    }

    fn fetcher(request_timeout: Duration) -> HttpFetcher {
        HttpFetcher::new(FetchOptions {
            user_agent: "spinneret-test/0.1".into(),
            request_timeout,
            body_timeout: Duration::from_secs(2),
            max_body_size: 1024 * 1024,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn fetches_html_page() {
        let base = serve_once(
            "HTTP/1.1 200 OK",
            "Content-Type: text/html\r\n",
            "<html><title>hi</title></html>",
        )
        .await;
        let url = Url::parse(&base).unwrap();
        let resp = fetcher(Duration::from_secs(2)).fetch(&url).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.content_type.as_deref(), Some("text/html"));
        assert!(String::from_utf8_lossy(&resp.body).contains("hi"));
    }

    #[tokio::test]
    async fn rejects_non_html_content_type() {
        let base = serve_once("HTTP/1.1 200 OK", "Content-Type: image/png\r\n", "PNG").await;
        let url = Url::parse(&base).unwrap();
        let err = fetcher(Duration::from_secs(2)).fetch(&url).await.unwrap_err();
        assert!(matches!(err, CrawlError::ContentTypeReject { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn silent_server_times_out_the_request() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and hold the connection without ever responding.
        tokio::spawn(async move {
            let _held = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(10)).await;
        });
        let url = Url::parse(&format!("http://{addr}/")).unwrap();
        let err = fetcher(Duration::from_millis(200)).fetch(&url).await.unwrap_err();
        assert!(err.is_timeout());
    }
}
