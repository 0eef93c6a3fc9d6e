use pdf_markup_core::{
    ArtifactReference, PersistenceError, PersistenceGateway, PersistenceResult, SaveRequest, SaveResponse,
};
use std::time::Duration;

/// Posts save requests to `<base_url>/save-annotations`
#[derive(Debug, Clone)]
pub struct HttpGateway {
    agent: ureq::Agent,
    endpoint: String,
}

impl HttpGateway {
    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        let endpoint = format!("{}/save-annotations", base_url.trim_end_matches('/'));
        Self { agent, endpoint }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl PersistenceGateway for HttpGateway {
    fn save(&self, request: &SaveRequest) -> PersistenceResult<ArtifactReference> {
        tracing::debug!(endpoint = %self.endpoint, count = request.annotations.len(), "posting annotations");

        match self.agent.post(&self.endpoint).send_json(request) {
            Ok(response) => {
                let body: SaveResponse = response
                    .into_json()
                    .map_err(|err| PersistenceError::InvalidResponse(err.to_string()))?;
                body.into_result()
            }
            Err(ureq::Error::Status(status, response)) => {
                // Error bodies carry a reason when the server produced them.
                match response.into_json::<SaveResponse>() {
                    Ok(SaveResponse { error: Some(reason), .. }) => Err(PersistenceError::Rejected(reason)),
                    _ => Err(PersistenceError::Status(status)),
                }
            }
            Err(ureq::Error::Transport(transport)) => Err(PersistenceError::Transport(transport.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::JoinHandle;

    /// Serve one canned response and hand back the request body
    fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        let base_url = format!("http://{}", listener.local_addr().expect("local addr"));

        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().expect("connection should arrive");
            let mut reader = BufReader::new(stream);

            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("header line");
                let trimmed = line.trim_end();
                if trimmed.is_empty() {
                    break;
                }
                if let Some((name, value)) = trimmed.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().expect("content length");
                    }
                }
            }

            let mut request_body = vec![0u8; content_length];
            reader.read_exact(&mut request_body).expect("request body");

            let response = format!(
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            reader.get_mut().write_all(response.as_bytes()).expect("response should be written");

            String::from_utf8(request_body).expect("utf-8 body")
        });

        (base_url, handle)
    }

    #[test]
    fn success_returns_download_url() {
        let (base_url, server) =
            serve_once("HTTP/1.1 200 OK", r#"{"success": true, "download_url": "/download/annotated_a.pdf"}"#);
        let gateway = HttpGateway::new(&base_url);

        let artifact = gateway.save(&SaveRequest::new("a.pdf", Vec::new())).expect("save should succeed");
        assert_eq!(artifact.as_str(), "/download/annotated_a.pdf");

        let sent: serde_json::Value = serde_json::from_str(&server.join().expect("server thread")).expect("json body");
        assert_eq!(sent["filename"], "a.pdf");
        assert!(sent["annotations"].as_array().is_some_and(Vec::is_empty));
    }

    #[test]
    fn failure_body_maps_to_rejected() {
        let (base_url, server) =
            serve_once("HTTP/1.1 400 Bad Request", r#"{"success": false, "error": "invalid filename"}"#);
        let gateway = HttpGateway::new(&base_url);

        let err = gateway.save(&SaveRequest::new("a.pdf", Vec::new())).expect_err("save should fail");
        assert_eq!(err, PersistenceError::Rejected("invalid filename".to_owned()));
        server.join().expect("server thread");
    }

    #[test]
    fn bare_error_status_maps_to_status() {
        let (base_url, server) = serve_once("HTTP/1.1 500 Internal Server Error", "oops");
        let gateway = HttpGateway::new(&base_url);

        let err = gateway.save(&SaveRequest::new("a.pdf", Vec::new())).expect_err("save should fail");
        assert_eq!(err, PersistenceError::Status(500));
        server.join().expect("server thread");
    }

    #[test]
    fn unsuccessful_ok_body_is_rejected() {
        let (base_url, server) = serve_once("HTTP/1.1 200 OK", r#"{"success": false, "error": "disk full"}"#);
        let gateway = HttpGateway::new(&base_url);

        let err = gateway.save(&SaveRequest::new("a.pdf", Vec::new())).expect_err("save should fail");
        assert_eq!(err, PersistenceError::Rejected("disk full".to_owned()));
        server.join().expect("server thread");
    }

    #[test]
    fn unreachable_server_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);

        let gateway = HttpGateway::with_timeout(&format!("http://{addr}"), Duration::from_secs(2));
        let err = gateway.save(&SaveRequest::new("a.pdf", Vec::new())).expect_err("save should fail");
        assert!(matches!(err, PersistenceError::Transport(_)));
    }
}
